//! Domain model for city geography and aggregated weather records.
//!
//! # Responsibility
//! - Define the row shapes persisted in `cities_data` and `weather_aggregated`.
//! - Own field-level validation shared by every write and read path.
//!
//! # Invariants
//! - Both records are identified by the same `Coordinates` pair.
//! - Coordinates are formatted text, never re-parsed into degrees for storage.

pub mod city;
pub mod weather;

pub use city::{CityData, Coordinates, ValidationError, COORDINATE_MAX_CHARS, TIMEZONE_MAX_CHARS};
pub use weather::{CityWeather, WeatherAggregated};
