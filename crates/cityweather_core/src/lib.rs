//! Core domain logic for the city weather aggregate store.
//! This crate owns the schema, its invariants and the ingestion pipeline.

pub mod config;
pub mod db;
pub mod logging;
pub mod model;
pub mod repo;
pub mod service;
pub mod source;

pub use config::{ConfigError, EtlConfig};
pub use logging::{default_log_level, init_logging, logging_status, LoggingError};
pub use model::{CityData, CityWeather, Coordinates, ValidationError, WeatherAggregated};
pub use repo::city_repo::{CityRepository, SqliteCityRepository};
pub use repo::weather_repo::{SqliteWeatherRepository, WeatherRepository};
pub use repo::{RepoError, RepoResult};
pub use service::aggregate::Thresholds;
pub use service::ingest_service::{IngestError, IngestReport, IngestResult, IngestService};
pub use source::{
    ForecastSeries, GeoPoint, Geocoder, HistoricalSnapshot, HourlySample, NominatimGeocoder,
    OpenMeteoClient, SourceError, SourceResult, WeatherSource,
};

/// Returns the core crate version.
pub fn core_version() -> &'static str {
    env!("CARGO_PKG_VERSION")
}

#[cfg(test)]
mod tests {
    use super::core_version;

    #[test]
    fn version_is_not_empty() {
        assert!(!core_version().is_empty());
    }
}
