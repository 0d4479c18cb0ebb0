//! Open-Meteo forecast and historical-forecast client.
//!
//! # Responsibility
//! - Issue one multi-location request per dataset (comma-joined coordinates).
//! - Decode single-object and array response shapes into typed series.
//!
//! # Invariants
//! - Forecast series keep the grid coordinates reported by the API.
//! - Historical snapshots are keyed by the coordinates they were requested for.

use super::{
    build_http_client, get_text, ForecastSeries, GeoPoint, HistoricalSnapshot, HourlySample,
    SourceError, SourceResult, WeatherSource,
};
use crate::model::Coordinates;
use chrono::{NaiveDate, NaiveDateTime};
use log::info;
use reqwest::blocking::Client;
use serde::de::DeserializeOwned;
use serde::Deserialize;
use std::time::Duration;

const HOURLY_TIME_FORMAT: &str = "%Y-%m-%dT%H:%M";
const FORECAST_HOURLY_FIELDS: &str = "temperature_2m";
const HISTORICAL_HOURLY_FIELDS: &str = "temperature_2m,relative_humidity_2m,wind_speed_10m";

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum OneOrMany<T> {
    Many(Vec<T>),
    One(T),
}

impl<T> OneOrMany<T> {
    fn into_vec(self) -> Vec<T> {
        match self {
            Self::Many(items) => items,
            Self::One(item) => vec![item],
        }
    }
}

#[derive(Debug, Deserialize)]
struct ForecastPayload {
    latitude: f64,
    longitude: f64,
    elevation: f64,
    timezone_abbreviation: Option<String>,
    hourly: ForecastHourly,
}

#[derive(Debug, Deserialize)]
struct ForecastHourly {
    time: Vec<String>,
    temperature_2m: Vec<Option<f64>>,
}

#[derive(Debug, Deserialize)]
struct HistoricalPayload {
    hourly: HistoricalHourly,
}

#[derive(Debug, Deserialize)]
struct HistoricalHourly {
    #[serde(default)]
    temperature_2m: Vec<Option<f64>>,
    #[serde(default)]
    relative_humidity_2m: Vec<Option<f64>>,
    #[serde(default)]
    wind_speed_10m: Vec<Option<f64>>,
}

/// Blocking client for the Open-Meteo forecast APIs.
pub struct OpenMeteoClient {
    client: Client,
    forecast_url: String,
    historical_url: String,
}

impl OpenMeteoClient {
    pub fn new(
        forecast_url: impl Into<String>,
        historical_url: impl Into<String>,
        user_agent: &str,
        timeout: Duration,
    ) -> SourceResult<Self> {
        Ok(Self {
            client: build_http_client(user_agent, timeout)?,
            forecast_url: forecast_url.into(),
            historical_url: historical_url.into(),
        })
    }
}

impl WeatherSource for OpenMeteoClient {
    fn forecast(
        &self,
        points: &[GeoPoint],
        past_days: u32,
        forecast_days: u32,
    ) -> SourceResult<Vec<ForecastSeries>> {
        if points.is_empty() {
            return Ok(Vec::new());
        }

        let query = [
            ("latitude", join_values(points.iter().map(|p| p.latitude))),
            ("longitude", join_values(points.iter().map(|p| p.longitude))),
            ("past_days", past_days.to_string()),
            ("forecast_days", forecast_days.to_string()),
            ("hourly", FORECAST_HOURLY_FIELDS.to_string()),
            ("timezone", "auto".to_string()),
        ];
        let body = get_text(&self.client, &self.forecast_url, &query)?;
        let series = parse_forecast_body(&body)?;
        info!(
            "event=fetch_forecast module=source status=ok locations={} past_days={} forecast_days={}",
            series.len(),
            past_days,
            forecast_days
        );
        Ok(series)
    }

    fn historical(
        &self,
        coordinates: &[Coordinates],
        date: NaiveDate,
    ) -> SourceResult<Vec<HistoricalSnapshot>> {
        if coordinates.is_empty() {
            return Ok(Vec::new());
        }

        let day = date.format("%Y-%m-%d").to_string();
        let hour = format!("{day}T00:00");
        let query = [
            (
                "latitude",
                join_values(coordinates.iter().map(|c| c.latitude.as_str())),
            ),
            (
                "longitude",
                join_values(coordinates.iter().map(|c| c.longitude.as_str())),
            ),
            ("start_date", day.clone()),
            ("end_date", day),
            ("start_hour", hour.clone()),
            ("end_hour", hour),
            ("hourly", HISTORICAL_HOURLY_FIELDS.to_string()),
        ];
        let body = get_text(&self.client, &self.historical_url, &query)?;
        let snapshots = parse_historical_body(&body, coordinates)?;
        info!(
            "event=fetch_historical module=source status=ok locations={} date={}",
            snapshots.len(),
            date
        );
        Ok(snapshots)
    }
}

/// Decodes a forecast response into one series per location.
pub fn parse_forecast_body(body: &str) -> SourceResult<Vec<ForecastSeries>> {
    decode_payloads::<ForecastPayload>(body)?
        .into_iter()
        .map(into_forecast_series)
        .collect()
}

/// Decodes a historical response, pairing locations with `requested` by position.
pub fn parse_historical_body(
    body: &str,
    requested: &[Coordinates],
) -> SourceResult<Vec<HistoricalSnapshot>> {
    let payloads = decode_payloads::<HistoricalPayload>(body)?;
    if payloads.len() != requested.len() {
        return Err(SourceError::InvalidPayload(format!(
            "historical response has {} locations, requested {}",
            payloads.len(),
            requested.len()
        )));
    }

    Ok(payloads
        .into_iter()
        .zip(requested)
        .map(|(payload, coordinates)| HistoricalSnapshot {
            coordinates: coordinates.clone(),
            temperature: first_value(&payload.hourly.temperature_2m),
            relative_humidity: first_value(&payload.hourly.relative_humidity_2m),
            wind_speed: first_value(&payload.hourly.wind_speed_10m),
        })
        .collect())
}

fn decode_payloads<T: DeserializeOwned>(body: &str) -> SourceResult<Vec<T>> {
    let payloads: OneOrMany<T> = serde_json::from_str(body)?;
    Ok(payloads.into_vec())
}

fn into_forecast_series(payload: ForecastPayload) -> SourceResult<ForecastSeries> {
    let coordinates = Coordinates::from_degrees(payload.latitude, payload.longitude);
    let ForecastHourly {
        time,
        temperature_2m,
    } = payload.hourly;

    if time.len() != temperature_2m.len() {
        return Err(SourceError::InvalidPayload(format!(
            "hourly series for {coordinates} has {} timestamps and {} temperatures",
            time.len(),
            temperature_2m.len()
        )));
    }

    let samples = time
        .iter()
        .zip(temperature_2m)
        .map(|(stamp, temperature)| {
            let time = NaiveDateTime::parse_from_str(stamp, HOURLY_TIME_FORMAT).map_err(|err| {
                SourceError::InvalidPayload(format!("invalid hourly timestamp `{stamp}`: {err}"))
            })?;
            Ok(HourlySample { time, temperature })
        })
        .collect::<SourceResult<Vec<_>>>()?;

    Ok(ForecastSeries {
        coordinates,
        elevation: payload.elevation,
        timezone_abbreviation: payload.timezone_abbreviation,
        samples,
    })
}

fn first_value(values: &[Option<f64>]) -> Option<f64> {
    values.first().copied().flatten()
}

fn join_values<T: ToString>(values: impl Iterator<Item = T>) -> String {
    values
        .map(|value| value.to_string())
        .collect::<Vec<_>>()
        .join(",")
}

#[cfg(test)]
mod tests {
    use super::{parse_forecast_body, parse_historical_body};
    use crate::model::Coordinates;
    use crate::source::SourceError;
    use chrono::NaiveDate;

    const SINGLE_FORECAST: &str = r#"{
        "latitude": 50.4375,
        "longitude": 30.5,
        "generationtime_ms": 0.05,
        "utc_offset_seconds": 10800,
        "timezone": "Europe/Kiev",
        "timezone_abbreviation": "EEST",
        "elevation": 188.0,
        "hourly_units": {"time": "iso8601", "temperature_2m": "°C"},
        "hourly": {
            "time": ["2024-06-01T00:00", "2024-06-01T01:00"],
            "temperature_2m": [15.5, null]
        }
    }"#;

    #[test]
    fn single_object_forecast_decodes_to_one_series() {
        let series = parse_forecast_body(SINGLE_FORECAST).unwrap();
        assert_eq!(series.len(), 1);

        let kyiv = &series[0];
        assert_eq!(kyiv.coordinates, Coordinates::new("50.4375", "30.5"));
        assert_eq!(kyiv.elevation, 188.0);
        assert_eq!(kyiv.timezone_abbreviation.as_deref(), Some("EEST"));
        assert_eq!(kyiv.samples.len(), 2);
        assert_eq!(
            kyiv.samples[1].time,
            NaiveDate::from_ymd_opt(2024, 6, 1)
                .unwrap()
                .and_hms_opt(1, 0, 0)
                .unwrap()
        );
        assert_eq!(kyiv.samples[0].temperature, Some(15.5));
        assert_eq!(kyiv.samples[1].temperature, None);
    }

    #[test]
    fn array_forecast_decodes_in_response_order() {
        let body = format!("[{SINGLE_FORECAST}, {}]", SINGLE_FORECAST.replace("50.4375", "-26.25"));
        let series = parse_forecast_body(&body).unwrap();
        assert_eq!(series.len(), 2);
        assert_eq!(series[1].coordinates.latitude, "-26.25");
    }

    #[test]
    fn mismatched_hourly_lengths_are_rejected() {
        let body = SINGLE_FORECAST.replace("[15.5, null]", "[15.5]");
        let err = parse_forecast_body(&body).unwrap_err();
        assert!(matches!(err, SourceError::InvalidPayload(_)));
    }

    #[test]
    fn historical_snapshot_takes_first_hour_and_requested_coordinates() {
        let body = r#"[
            {"latitude": 1.0, "longitude": 2.0, "elevation": 10.0,
             "hourly": {"time": ["2024-01-01T00:00"], "temperature_2m": [-3.5],
                        "relative_humidity_2m": [87], "wind_speed_10m": [12.25]}},
            {"latitude": 3.0, "longitude": 4.0, "elevation": 10.0,
             "hourly": {"time": ["2024-01-01T00:00"], "temperature_2m": [null],
                        "relative_humidity_2m": [], "wind_speed_10m": [4.0]}}
        ]"#;
        let requested = vec![
            Coordinates::new("1.01", "2.01"),
            Coordinates::new("3.01", "4.01"),
        ];

        let snapshots = parse_historical_body(body, &requested).unwrap();
        assert_eq!(snapshots[0].coordinates, requested[0]);
        assert_eq!(snapshots[0].temperature, Some(-3.5));
        assert_eq!(snapshots[0].relative_humidity, Some(87.0));
        assert_eq!(snapshots[0].wind_speed, Some(12.25));
        assert_eq!(snapshots[1].temperature, None);
        assert_eq!(snapshots[1].relative_humidity, None);
    }

    #[test]
    fn historical_location_count_must_match_request() {
        let body = r#"{"hourly": {"temperature_2m": [1.0]}}"#;
        let requested = vec![Coordinates::new("1.0", "2.0"), Coordinates::new("3.0", "4.0")];
        let err = parse_historical_body(body, &requested).unwrap_err();
        assert!(matches!(err, SourceError::InvalidPayload(_)));
    }

    #[test]
    fn error_body_is_not_valid_forecast() {
        let err = parse_forecast_body(r#"{"error": true, "reason": "bad"}"#).unwrap_err();
        assert!(matches!(err, SourceError::Decode(_)));
    }
}
