//! Pure aggregation steps between fetched series and persisted rows.
//!
//! # Responsibility
//! - Reduce hourly series to last-week/next-week mean temperatures.
//! - Apply the temperature/elevation selection thresholds.
//! - Join historical snapshots and split results into table rows.
//!
//! # Invariants
//! - The week boundary is local midnight of `today` in each series' own clock.
//! - Null samples never contribute to a mean.
//! - The join is inner: summaries without a snapshot are dropped.

use crate::model::{CityData, Coordinates, WeatherAggregated, TIMEZONE_MAX_CHARS};
use crate::source::{ForecastSeries, HistoricalSnapshot};
use chrono::NaiveDate;
use log::warn;
use std::collections::{HashMap, HashSet};

/// Selection thresholds applied after the last-week mean is known.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Thresholds {
    /// Cities must sit strictly higher than this (meters).
    pub min_elevation: f64,
    /// Cities must average strictly colder than this over the last week (°C).
    pub max_avg_temp: f64,
}

/// Weekly temperature means for one location.
#[derive(Debug, Clone, PartialEq)]
pub struct ForecastSummary {
    pub coordinates: Coordinates,
    pub elevation: f64,
    pub timezone: Option<String>,
    pub avg_temp_last_week: f64,
    pub avg_temp_next_week: Option<f64>,
}

/// Matching rows for both tables, ready to load.
#[derive(Debug, Clone, PartialEq)]
pub struct IngestRow {
    pub city: CityData,
    pub weather: WeatherAggregated,
}

/// Splits `series` at midnight of `today` and averages each side.
///
/// Returns `None` when no non-null sample precedes the boundary, since
/// `avg_temp_last_week` is required.
pub fn summarize_forecast(series: &ForecastSeries, today: NaiveDate) -> Option<ForecastSummary> {
    let midnight = today.and_hms_opt(0, 0, 0)?;
    let (past, upcoming): (Vec<_>, Vec<_>) = series
        .samples
        .iter()
        .partition(|sample| sample.time < midnight);

    let avg_temp_last_week = mean(past.iter().filter_map(|sample| sample.temperature))?;
    let avg_temp_next_week = mean(upcoming.iter().filter_map(|sample| sample.temperature));

    Some(ForecastSummary {
        coordinates: series.coordinates.clone(),
        elevation: series.elevation,
        timezone: series.timezone_abbreviation.clone(),
        avg_temp_last_week,
        avg_temp_next_week,
    })
}

pub fn passes_thresholds(summary: &ForecastSummary, thresholds: &Thresholds) -> bool {
    summary.avg_temp_last_week < thresholds.max_avg_temp
        && summary.elevation > thresholds.min_elevation
}

/// Inner-joins summaries with snapshots on coordinates.
///
/// Repeated coordinates (two cities snapping to one grid cell) keep the
/// first summary only.
pub fn join_historical(
    summaries: Vec<ForecastSummary>,
    snapshots: &[HistoricalSnapshot],
) -> Vec<IngestRow> {
    let by_coordinates: HashMap<&Coordinates, &HistoricalSnapshot> = snapshots
        .iter()
        .map(|snapshot| (&snapshot.coordinates, snapshot))
        .collect();
    let mut seen = HashSet::new();
    let mut rows = Vec::with_capacity(summaries.len());

    for summary in summaries {
        if !seen.insert(summary.coordinates.clone()) {
            warn!(
                "event=aggregate_join module=service status=skip reason=duplicate_coordinates coordinates={}",
                summary.coordinates
            );
            continue;
        }
        let Some(snapshot) = by_coordinates.get(&summary.coordinates) else {
            warn!(
                "event=aggregate_join module=service status=skip reason=missing_snapshot coordinates={}",
                summary.coordinates
            );
            continue;
        };
        rows.push(build_row(summary, snapshot));
    }

    rows
}

fn build_row(summary: ForecastSummary, snapshot: &HistoricalSnapshot) -> IngestRow {
    let timezone = summary.timezone.filter(|timezone| {
        let fits = !timezone.trim().is_empty() && timezone.chars().count() <= TIMEZONE_MAX_CHARS;
        if !fits {
            warn!(
                "event=aggregate_join module=service status=warn reason=timezone_dropped coordinates={} timezone={}",
                summary.coordinates, timezone
            );
        }
        fits
    });

    let city = CityData {
        coordinates: summary.coordinates.clone(),
        elevation: summary.elevation as f32,
        timezone,
    };
    let weather = WeatherAggregated {
        coordinates: summary.coordinates,
        avg_temp_last_week: summary.avg_temp_last_week,
        avg_temp_next_week: summary.avg_temp_next_week,
        year_start_temp: snapshot.temperature.map(|value| value as f32),
        year_start_humidity: snapshot
            .relative_humidity
            .filter(|value| value.is_finite())
            .map(|value| value.round() as i32),
        year_start_wind_speed: snapshot.wind_speed.map(|value| value as f32),
    };

    IngestRow { city, weather }
}

fn mean(values: impl Iterator<Item = f64>) -> Option<f64> {
    let (sum, count) = values
        .filter(|value| value.is_finite())
        .fold((0.0, 0_u32), |(sum, count), value| (sum + value, count + 1));
    (count > 0).then(|| sum / f64::from(count))
}
