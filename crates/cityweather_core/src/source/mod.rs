//! Upstream data sources for the ingestion pipeline.
//!
//! # Responsibility
//! - Define the geocoding and weather contracts the pipeline depends on.
//! - Provide HTTP implementations backed by Nominatim and Open-Meteo.
//!
//! # Invariants
//! - Source results preserve request order.
//! - Non-success HTTP responses surface as `SourceError::Status` with the body.

pub mod geocoding;
pub mod open_meteo;

use crate::model::Coordinates;
use chrono::{NaiveDate, NaiveDateTime};
use reqwest::blocking::Client;
use std::error::Error;
use std::fmt::{Display, Formatter};
use std::time::Duration;

pub use geocoding::NominatimGeocoder;
pub use open_meteo::OpenMeteoClient;

pub type SourceResult<T> = Result<T, SourceError>;

#[derive(Debug)]
pub enum SourceError {
    /// Transport-level failure (connect, timeout, TLS).
    Http(reqwest::Error),
    /// Upstream answered with a non-success status.
    Status { status: u16, body: String },
    /// Body was not the expected JSON shape.
    Decode(serde_json::Error),
    /// Geocoder returned no match for the city name.
    NotFound(String),
    /// Body decoded but carried values the pipeline cannot use.
    InvalidPayload(String),
}

impl Display for SourceError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Http(err) => write!(f, "request failed: {err}"),
            Self::Status { status, body } => {
                write!(f, "request failed with status code {status}: {body}")
            }
            Self::Decode(err) => write!(f, "unexpected response body: {err}"),
            Self::NotFound(city) => write!(f, "no coordinates found for `{city}`"),
            Self::InvalidPayload(message) => write!(f, "invalid response payload: {message}"),
        }
    }
}

impl Error for SourceError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::Http(err) => Some(err),
            Self::Decode(err) => Some(err),
            Self::Status { .. } | Self::NotFound(_) | Self::InvalidPayload(_) => None,
        }
    }
}

impl From<reqwest::Error> for SourceError {
    fn from(value: reqwest::Error) -> Self {
        Self::Http(value)
    }
}

impl From<serde_json::Error> for SourceError {
    fn from(value: serde_json::Error) -> Self {
        Self::Decode(value)
    }
}

/// Geocoded city location in decimal degrees.
#[derive(Debug, Clone, PartialEq)]
pub struct GeoPoint {
    pub name: String,
    pub latitude: f64,
    pub longitude: f64,
}

/// One hourly reading; `temperature` is `None` when upstream reported null.
#[derive(Debug, Clone, PartialEq)]
pub struct HourlySample {
    pub time: NaiveDateTime,
    pub temperature: Option<f64>,
}

/// Hourly temperature series for one location, timestamps in location-local time.
#[derive(Debug, Clone, PartialEq)]
pub struct ForecastSeries {
    /// Grid coordinates reported back by the forecast API.
    pub coordinates: Coordinates,
    pub elevation: f64,
    pub timezone_abbreviation: Option<String>,
    pub samples: Vec<HourlySample>,
}

/// Conditions at the first hour of the historical snapshot date.
#[derive(Debug, Clone, PartialEq)]
pub struct HistoricalSnapshot {
    /// Coordinates the snapshot was requested for.
    pub coordinates: Coordinates,
    pub temperature: Option<f64>,
    pub relative_humidity: Option<f64>,
    pub wind_speed: Option<f64>,
}

/// Resolves city names to coordinates.
pub trait Geocoder {
    fn geocode(&self, city: &str) -> SourceResult<GeoPoint>;
}

/// Supplies hourly forecast series and historical snapshots.
pub trait WeatherSource {
    /// Fetches `past_days` of history plus `forecast_days` ahead for every point.
    fn forecast(
        &self,
        points: &[GeoPoint],
        past_days: u32,
        forecast_days: u32,
    ) -> SourceResult<Vec<ForecastSeries>>;

    /// Fetches the midnight snapshot of `date` for every coordinate pair.
    fn historical(
        &self,
        coordinates: &[Coordinates],
        date: NaiveDate,
    ) -> SourceResult<Vec<HistoricalSnapshot>>;
}

pub(crate) fn build_http_client(user_agent: &str, timeout: Duration) -> SourceResult<Client> {
    let client = Client::builder()
        .user_agent(user_agent)
        .timeout(timeout)
        .build()?;
    Ok(client)
}

/// Sends a GET request and returns the body of a successful response.
pub(crate) fn get_text(
    client: &Client,
    url: &str,
    query: &[(&str, String)],
) -> SourceResult<String> {
    let response = client.get(url).query(query).send()?;
    let status = response.status();
    if !status.is_success() {
        let body = response.text().unwrap_or_default();
        return Err(SourceError::Status {
            status: status.as_u16(),
            body,
        });
    }
    Ok(response.text()?)
}
