//! Nominatim-backed city geocoding.

use super::{build_http_client, get_text, GeoPoint, Geocoder, SourceError, SourceResult};
use log::{debug, info};
use reqwest::blocking::Client;
use serde::Deserialize;
use std::time::Duration;

#[derive(Debug, Deserialize)]
struct NominatimPlace {
    lat: String,
    lon: String,
}

/// Geocoder for the Nominatim `/search` endpoint.
pub struct NominatimGeocoder {
    client: Client,
    search_url: String,
}

impl NominatimGeocoder {
    /// Nominatim's usage policy requires an identifying `user_agent`.
    pub fn new(
        search_url: impl Into<String>,
        user_agent: &str,
        timeout: Duration,
    ) -> SourceResult<Self> {
        Ok(Self {
            client: build_http_client(user_agent, timeout)?,
            search_url: search_url.into(),
        })
    }
}

impl Geocoder for NominatimGeocoder {
    fn geocode(&self, city: &str) -> SourceResult<GeoPoint> {
        debug!("event=geocode module=source status=start city={city}");
        let query = [
            ("q", city.to_string()),
            ("format", "json".to_string()),
            ("limit", "1".to_string()),
        ];
        let body = get_text(&self.client, &self.search_url, &query)?;
        let point = parse_search_body(city, &body)?;
        info!(
            "event=geocode module=source status=ok city={} latitude={} longitude={}",
            city, point.latitude, point.longitude
        );
        Ok(point)
    }
}

/// Takes the first place of a Nominatim search result array.
pub fn parse_search_body(city: &str, body: &str) -> SourceResult<GeoPoint> {
    let places: Vec<NominatimPlace> = serde_json::from_str(body)?;
    let place = places
        .into_iter()
        .next()
        .ok_or_else(|| SourceError::NotFound(city.to_string()))?;

    Ok(GeoPoint {
        name: city.to_string(),
        latitude: parse_degrees(city, "lat", &place.lat)?,
        longitude: parse_degrees(city, "lon", &place.lon)?,
    })
}

fn parse_degrees(city: &str, field: &str, value: &str) -> SourceResult<f64> {
    value
        .trim()
        .parse::<f64>()
        .ok()
        .filter(|degrees| degrees.is_finite())
        .ok_or_else(|| {
            SourceError::InvalidPayload(format!("invalid {field} `{value}` for `{city}`"))
        })
}
