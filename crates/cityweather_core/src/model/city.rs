//! City geography record.
//!
//! # Responsibility
//! - Define the composite `(latitude, longitude)` key and `cities_data` row.
//! - Enforce bounded text lengths before SQLite sees the values.
//!
//! # Invariants
//! - Latitude and longitude are non-empty and at most 40 characters.
//! - Timezone, when present, is non-empty and at most 10 characters.
//! - Elevation is finite.

use serde::{Deserialize, Serialize};
use std::error::Error;
use std::fmt::{Display, Formatter};

/// Maximum characters for each coordinate column.
pub const COORDINATE_MAX_CHARS: usize = 40;
/// Maximum characters for the `timezone` column.
pub const TIMEZONE_MAX_CHARS: usize = 10;

/// Field-level validation failure for city and weather records.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ValidationError {
    EmptyField(&'static str),
    TooLong {
        field: &'static str,
        max_chars: usize,
        actual_chars: usize,
    },
    NonFinite(&'static str),
}

impl Display for ValidationError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::EmptyField(field) => write!(f, "`{field}` cannot be empty"),
            Self::TooLong {
                field,
                max_chars,
                actual_chars,
            } => write!(
                f,
                "`{field}` allows at most {max_chars} characters, got {actual_chars}"
            ),
            Self::NonFinite(field) => write!(f, "`{field}` must be a finite number"),
        }
    }
}

impl Error for ValidationError {}

/// Composite key shared by `cities_data` and `weather_aggregated`.
///
/// Values are kept as the text the upstream API coordinates were rendered to.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Coordinates {
    pub latitude: String,
    pub longitude: String,
}

impl Coordinates {
    pub fn new(latitude: impl Into<String>, longitude: impl Into<String>) -> Self {
        Self {
            latitude: latitude.into(),
            longitude: longitude.into(),
        }
    }

    /// Renders degrees as shortest round-trip decimals.
    ///
    /// Integral values keep a trailing `.0`, so `30.0` becomes `"30.0"`
    /// rather than `"30"`.
    pub fn from_degrees(latitude: f64, longitude: f64) -> Self {
        Self::new(format_degrees(latitude), format_degrees(longitude))
    }

    pub fn validate(&self) -> Result<(), ValidationError> {
        validate_bounded_text("latitude", &self.latitude, COORDINATE_MAX_CHARS)?;
        validate_bounded_text("longitude", &self.longitude, COORDINATE_MAX_CHARS)
    }
}

impl Display for Coordinates {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "({}, {})", self.latitude, self.longitude)
    }
}

/// One `cities_data` row.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CityData {
    #[serde(flatten)]
    pub coordinates: Coordinates,
    /// Meters above sea level.
    pub elevation: f32,
    /// Short timezone code such as `EET` or `GMT+8`.
    pub timezone: Option<String>,
}

impl CityData {
    pub fn new(coordinates: Coordinates, elevation: f32) -> Self {
        Self {
            coordinates,
            elevation,
            timezone: None,
        }
    }

    pub fn with_timezone(mut self, timezone: impl Into<String>) -> Self {
        self.timezone = Some(timezone.into());
        self
    }

    /// Validates key, bounded text and numeric fields.
    pub fn validate(&self) -> Result<(), ValidationError> {
        self.coordinates.validate()?;
        if !self.elevation.is_finite() {
            return Err(ValidationError::NonFinite("elevation"));
        }
        if let Some(timezone) = self.timezone.as_deref() {
            validate_bounded_text("timezone", timezone, TIMEZONE_MAX_CHARS)?;
        }
        Ok(())
    }
}

pub(crate) fn validate_bounded_text(
    field: &'static str,
    value: &str,
    max_chars: usize,
) -> Result<(), ValidationError> {
    if value.trim().is_empty() {
        return Err(ValidationError::EmptyField(field));
    }
    let actual_chars = value.chars().count();
    if actual_chars > max_chars {
        return Err(ValidationError::TooLong {
            field,
            max_chars,
            actual_chars,
        });
    }
    Ok(())
}

fn format_degrees(value: f64) -> String {
    let mut rendered = value.to_string();
    if value.is_finite() && !rendered.contains('.') {
        rendered.push_str(".0");
    }
    rendered
}

#[cfg(test)]
mod tests {
    use super::{CityData, Coordinates, ValidationError};

    #[test]
    fn from_degrees_keeps_fraction_for_integral_values() {
        let coords = Coordinates::from_degrees(30.0, -0.5);
        assert_eq!(coords.latitude, "30.0");
        assert_eq!(coords.longitude, "-0.5");
    }

    #[test]
    fn from_degrees_uses_shortest_round_trip_text() {
        let coords = Coordinates::from_degrees(50.4375, 30.5);
        assert_eq!(coords, Coordinates::new("50.4375", "30.5"));
    }

    #[test]
    fn coordinate_longer_than_forty_chars_is_rejected() {
        let coords = Coordinates::new("1".repeat(41), "2.0");
        assert_eq!(
            coords.validate(),
            Err(ValidationError::TooLong {
                field: "latitude",
                max_chars: 40,
                actual_chars: 41,
            })
        );
    }

    #[test]
    fn city_validation_checks_timezone_and_elevation() {
        let coords = Coordinates::new("1.0", "2.0");
        let long_tz = CityData::new(coords.clone(), 10.0).with_timezone("America/Sao_Paulo");
        assert!(matches!(
            long_tz.validate(),
            Err(ValidationError::TooLong { field: "timezone", .. })
        ));

        let nan = CityData::new(coords.clone(), f32::NAN);
        assert_eq!(nan.validate(), Err(ValidationError::NonFinite("elevation")));

        let empty = CityData::new(Coordinates::new(" ", "2.0"), 1.0);
        assert_eq!(empty.validate(), Err(ValidationError::EmptyField("latitude")));

        assert!(CityData::new(coords, 125.5).with_timezone("EET").validate().is_ok());
    }
}
