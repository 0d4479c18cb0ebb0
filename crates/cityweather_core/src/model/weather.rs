//! Aggregated weather record.
//!
//! # Invariants
//! - `coordinates` must reference an existing `cities_data` row.
//! - `avg_temp_last_week` is required; the remaining measurements are optional.
//! - Every present floating-point measurement is finite.

use super::city::{CityData, Coordinates, ValidationError};
use serde::{Deserialize, Serialize};

/// One `weather_aggregated` row.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WeatherAggregated {
    #[serde(flatten)]
    pub coordinates: Coordinates,
    /// Mean hourly temperature (°C) over the days before today.
    pub avg_temp_last_week: f64,
    /// Mean hourly temperature (°C) from today onwards.
    pub avg_temp_next_week: Option<f64>,
    /// Temperature (°C) at the start of the snapshot year.
    pub year_start_temp: Option<f32>,
    /// Relative humidity (%) at the start of the snapshot year.
    pub year_start_humidity: Option<i32>,
    /// Wind speed (km/h) at the start of the snapshot year.
    pub year_start_wind_speed: Option<f32>,
}

impl WeatherAggregated {
    /// Creates a row with only the required measurement set.
    pub fn new(coordinates: Coordinates, avg_temp_last_week: f64) -> Self {
        Self {
            coordinates,
            avg_temp_last_week,
            avg_temp_next_week: None,
            year_start_temp: None,
            year_start_humidity: None,
            year_start_wind_speed: None,
        }
    }

    pub fn validate(&self) -> Result<(), ValidationError> {
        self.coordinates.validate()?;
        if !self.avg_temp_last_week.is_finite() {
            return Err(ValidationError::NonFinite("avg_temp_last_week"));
        }
        if self.avg_temp_next_week.is_some_and(|value| !value.is_finite()) {
            return Err(ValidationError::NonFinite("avg_temp_next_week"));
        }
        if self.year_start_temp.is_some_and(|value| !value.is_finite()) {
            return Err(ValidationError::NonFinite("year_start_temp"));
        }
        if self
            .year_start_wind_speed
            .is_some_and(|value| !value.is_finite())
        {
            return Err(ValidationError::NonFinite("year_start_wind_speed"));
        }
        Ok(())
    }
}

/// Read model joining a city with its aggregated weather row, if any.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CityWeather {
    pub city: CityData,
    pub weather: Option<WeatherAggregated>,
}

#[cfg(test)]
mod tests {
    use super::WeatherAggregated;
    use crate::model::city::{Coordinates, ValidationError};

    #[test]
    fn new_leaves_optional_measurements_empty() {
        let row = WeatherAggregated::new(Coordinates::new("1.0", "2.0"), 4.25);
        assert_eq!(row.avg_temp_next_week, None);
        assert_eq!(row.year_start_humidity, None);
        assert!(row.validate().is_ok());
    }

    #[test]
    fn non_finite_optional_measurement_is_rejected() {
        let mut row = WeatherAggregated::new(Coordinates::new("1.0", "2.0"), 4.25);
        row.year_start_wind_speed = Some(f32::INFINITY);
        assert_eq!(
            row.validate(),
            Err(ValidationError::NonFinite("year_start_wind_speed"))
        );
    }
}
