//! Ingestion configuration.
//!
//! # Responsibility
//! - Hold target cities, selection thresholds and upstream endpoints.
//! - Load overrides from a TOML file; every absent key keeps its default.
//!
//! # Invariants
//! - A validated config has at least one city, a non-zero day window and timeout.

use crate::service::aggregate::Thresholds;
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::error::Error;
use std::fmt::{Display, Formatter};
use std::path::{Path, PathBuf};
use std::time::Duration;

pub const DEFAULT_FORECAST_URL: &str = "https://api.open-meteo.com/v1/forecast";
pub const DEFAULT_HISTORICAL_URL: &str = "https://historical-forecast-api.open-meteo.com/v1/forecast";
pub const DEFAULT_GEOCODING_URL: &str = "https://nominatim.openstreetmap.org/search";
pub const DEFAULT_USER_AGENT: &str = "CoordinatesForCities";

const DEFAULT_TARGET_CITIES: [&str; 10] = [
    "Kyiv",
    "Tel Aviv-Yafo",
    "Lhasa",
    "Ulaanbaatar",
    "Reykjavík",
    "Johannesburg",
    "Dublin",
    "Bern",
    "Brasília",
    "Kingston",
];

#[derive(Debug)]
pub enum ConfigError {
    Read { path: PathBuf, source: std::io::Error },
    Parse { path: PathBuf, source: toml::de::Error },
    Invalid(String),
}

impl Display for ConfigError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Read { path, source } => {
                write!(f, "failed to read config `{}`: {source}", path.display())
            }
            Self::Parse { path, source } => {
                write!(f, "failed to parse config `{}`: {source}", path.display())
            }
            Self::Invalid(message) => write!(f, "invalid config: {message}"),
        }
    }
}

impl Error for ConfigError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::Read { source, .. } => Some(source),
            Self::Parse { source, .. } => Some(source),
            Self::Invalid(_) => None,
        }
    }
}

/// Settings for one ingestion run.
///
/// `historical_date` must be a quoted `"YYYY-MM-DD"` string in TOML.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EtlConfig {
    pub target_cities: Vec<String>,
    /// Days fetched on each side of today.
    pub days_lookup: u32,
    pub min_elevation: f64,
    pub max_avg_temp: f64,
    /// Date whose first hour provides the `year_start_*` snapshot.
    pub historical_date: NaiveDate,
    pub forecast_url: String,
    pub historical_url: String,
    pub geocoding_url: String,
    pub user_agent: String,
    pub http_timeout_secs: u64,
}

impl Default for EtlConfig {
    fn default() -> Self {
        Self {
            target_cities: DEFAULT_TARGET_CITIES.iter().map(|c| c.to_string()).collect(),
            days_lookup: 8,
            min_elevation: 50.0,
            max_avg_temp: 20.0,
            historical_date: NaiveDate::from_ymd_opt(2024, 1, 1).unwrap_or(NaiveDate::MIN),
            forecast_url: DEFAULT_FORECAST_URL.to_string(),
            historical_url: DEFAULT_HISTORICAL_URL.to_string(),
            geocoding_url: DEFAULT_GEOCODING_URL.to_string(),
            user_agent: DEFAULT_USER_AGENT.to_string(),
            http_timeout_secs: 30,
        }
    }
}

impl EtlConfig {
    /// Reads and validates a TOML config file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        let config: Self = toml::from_str(&text).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.target_cities.iter().all(|city| city.trim().is_empty()) {
            return Err(ConfigError::Invalid(
                "target_cities must name at least one city".to_string(),
            ));
        }
        if self.days_lookup == 0 {
            return Err(ConfigError::Invalid(
                "days_lookup must be greater than zero".to_string(),
            ));
        }
        if self.http_timeout_secs == 0 {
            return Err(ConfigError::Invalid(
                "http_timeout_secs must be greater than zero".to_string(),
            ));
        }
        if !self.min_elevation.is_finite() || !self.max_avg_temp.is_finite() {
            return Err(ConfigError::Invalid(
                "thresholds must be finite numbers".to_string(),
            ));
        }
        Ok(())
    }

    pub fn thresholds(&self) -> Thresholds {
        Thresholds {
            min_elevation: self.min_elevation,
            max_avg_temp: self.max_avg_temp,
        }
    }

    pub fn http_timeout(&self) -> Duration {
        Duration::from_secs(self.http_timeout_secs)
    }
}

#[cfg(test)]
mod tests {
    use super::{ConfigError, EtlConfig};
    use chrono::NaiveDate;
    use std::io::Write;

    #[test]
    fn defaults_are_valid() {
        let config = EtlConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.target_cities.len(), 10);
        assert_eq!(config.days_lookup, 8);
        assert_eq!(config.thresholds().min_elevation, 50.0);
        assert_eq!(config.thresholds().max_avg_temp, 20.0);
    }

    #[test]
    fn load_overrides_only_present_keys() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(
            file,
            "target_cities = [\"Bern\"]\nmax_avg_temp = 15.5\nhistorical_date = \"2023-01-01\""
        )
        .unwrap();

        let config = EtlConfig::load(file.path()).unwrap();
        assert_eq!(config.target_cities, vec!["Bern".to_string()]);
        assert_eq!(config.max_avg_temp, 15.5);
        assert_eq!(
            config.historical_date,
            NaiveDate::from_ymd_opt(2023, 1, 1).unwrap()
        );
        assert_eq!(config.days_lookup, 8);
    }

    #[test]
    fn load_rejects_empty_city_list() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "target_cities = []").unwrap();

        let err = EtlConfig::load(file.path()).unwrap_err();
        assert!(matches!(err, ConfigError::Invalid(_)));
    }

    #[test]
    fn load_reports_missing_file() {
        let dir = tempfile::tempdir().unwrap();
        let err = EtlConfig::load(dir.path().join("absent.toml")).unwrap_err();
        assert!(matches!(err, ConfigError::Read { .. }));
    }
}
