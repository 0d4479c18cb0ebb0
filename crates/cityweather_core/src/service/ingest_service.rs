//! Ingestion use-case service.
//!
//! # Responsibility
//! - Orchestrate geocode → forecast → aggregate → historical → load.
//! - Report what each stage produced and which table batches were skipped.
//!
//! # Invariants
//! - `cities_data` is loaded before `weather_aggregated`.
//! - Each table batch is all-or-nothing. A batch failing on a duplicate key or
//!   a missing city row is skipped; any other storage failure aborts the run.
//! - Cities the geocoder cannot resolve are skipped, transport failures are not.

use crate::config::EtlConfig;
use crate::model::{CityData, WeatherAggregated};
use crate::repo::city_repo::{CityRepository, SqliteCityRepository};
use crate::repo::weather_repo::{SqliteWeatherRepository, WeatherRepository};
use crate::repo::{RepoError, RepoResult};
use crate::service::aggregate::{join_historical, passes_thresholds, summarize_forecast, IngestRow};
use crate::source::{Geocoder, SourceError, WeatherSource};
use chrono::NaiveDate;
use log::{error, info, warn};
use rusqlite::Connection;
use std::error::Error;
use std::fmt::{Display, Formatter};
use std::time::Instant;
use uuid::Uuid;

pub type IngestResult<T> = Result<T, IngestError>;

#[derive(Debug)]
pub enum IngestError {
    Source(SourceError),
    Repo(RepoError),
}

impl Display for IngestError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Source(err) => write!(f, "{err}"),
            Self::Repo(err) => write!(f, "{err}"),
        }
    }
}

impl Error for IngestError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::Source(err) => Some(err),
            Self::Repo(err) => Some(err),
        }
    }
}

impl From<SourceError> for IngestError {
    fn from(value: SourceError) -> Self {
        Self::Source(value)
    }
}

impl From<RepoError> for IngestError {
    fn from(value: RepoError) -> Self {
        Self::Repo(value)
    }
}

/// Outcome counters for one ingestion run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IngestReport {
    /// Correlates all log events of the run.
    pub run_id: Uuid,
    pub cities_requested: usize,
    pub cities_geocoded: usize,
    pub series_fetched: usize,
    /// Locations passing the temperature/elevation thresholds.
    pub cities_selected: usize,
    pub cities_loaded: usize,
    pub weather_loaded: usize,
    /// Tables whose batch was rolled back on a duplicate key or missing city.
    pub skipped_tables: Vec<&'static str>,
}

impl IngestReport {
    fn new(run_id: Uuid, cities_requested: usize) -> Self {
        Self {
            run_id,
            cities_requested,
            cities_geocoded: 0,
            series_fetched: 0,
            cities_selected: 0,
            cities_loaded: 0,
            weather_loaded: 0,
            skipped_tables: Vec::new(),
        }
    }
}

/// Runs the ingestion pipeline against pluggable sources.
pub struct IngestService<G: Geocoder, W: WeatherSource> {
    geocoder: G,
    source: W,
    config: EtlConfig,
}

impl<G: Geocoder, W: WeatherSource> IngestService<G, W> {
    pub fn new(geocoder: G, source: W, config: EtlConfig) -> Self {
        Self {
            geocoder,
            source,
            config,
        }
    }

    /// Runs one ingestion with `today` as the last-week/next-week boundary.
    pub fn run(&self, conn: &Connection, today: NaiveDate) -> IngestResult<IngestReport> {
        let started_at = Instant::now();
        let run_id = Uuid::new_v4();
        info!(
            "event=ingest_run module=service status=start run_id={} today={} cities={}",
            run_id,
            today,
            self.config.target_cities.len()
        );

        match self.run_stages(conn, today, run_id) {
            Ok(report) => {
                info!(
                    "event=ingest_run module=service status=ok run_id={} duration_ms={} selected={} cities_loaded={} weather_loaded={} skipped={}",
                    run_id,
                    started_at.elapsed().as_millis(),
                    report.cities_selected,
                    report.cities_loaded,
                    report.weather_loaded,
                    report.skipped_tables.join(",")
                );
                Ok(report)
            }
            Err(err) => {
                error!(
                    "event=ingest_run module=service status=error run_id={} duration_ms={} error={}",
                    run_id,
                    started_at.elapsed().as_millis(),
                    err
                );
                Err(err)
            }
        }
    }

    fn run_stages(
        &self,
        conn: &Connection,
        today: NaiveDate,
        run_id: Uuid,
    ) -> IngestResult<IngestReport> {
        let city_repo = SqliteCityRepository::try_new(conn)?;
        let weather_repo = SqliteWeatherRepository::try_new(conn)?;
        let mut report = IngestReport::new(run_id, self.config.target_cities.len());

        let mut points = Vec::new();
        for city in self.config.target_cities.iter().map(|c| c.trim()) {
            if city.is_empty() {
                continue;
            }
            match self.geocoder.geocode(city) {
                Ok(point) => points.push(point),
                Err(SourceError::NotFound(name)) => {
                    warn!(
                        "event=geocode module=service status=skip run_id={run_id} city={name} reason=not_found"
                    );
                }
                Err(err) => return Err(err.into()),
            }
        }
        report.cities_geocoded = points.len();
        if points.is_empty() {
            return Ok(report);
        }

        let days = self.config.days_lookup;
        let series = self.source.forecast(&points, days, days)?;
        report.series_fetched = series.len();

        let thresholds = self.config.thresholds();
        let summaries: Vec<_> = series
            .iter()
            .filter_map(|item| summarize_forecast(item, today))
            .filter(|summary| passes_thresholds(summary, &thresholds))
            .collect();
        report.cities_selected = summaries.len();
        if summaries.is_empty() {
            return Ok(report);
        }

        let coordinates: Vec<_> = summaries
            .iter()
            .map(|summary| summary.coordinates.clone())
            .collect();
        let snapshots = self
            .source
            .historical(&coordinates, self.config.historical_date)?;

        let rows = join_historical(summaries, &snapshots);
        let (cities, weather): (Vec<CityData>, Vec<WeatherAggregated>) = rows
            .into_iter()
            .map(|IngestRow { city, weather }| (city, weather))
            .unzip();

        if let Some(loaded) = append_or_skip(
            "cities_data",
            run_id,
            city_repo.insert_cities(&cities),
        )? {
            report.cities_loaded = loaded;
        } else {
            report.skipped_tables.push("cities_data");
        }

        if let Some(loaded) = append_or_skip(
            "weather_aggregated",
            run_id,
            weather_repo.insert_weather_batch(&weather),
        )? {
            report.weather_loaded = loaded;
        } else {
            report.skipped_tables.push("weather_aggregated");
        }

        Ok(report)
    }
}

/// Returns `Ok(None)` when the batch hit an integrity violation and was rolled back.
fn append_or_skip(
    table: &'static str,
    run_id: Uuid,
    result: RepoResult<usize>,
) -> IngestResult<Option<usize>> {
    match result {
        Ok(loaded) => {
            info!(
                "event=ingest_load module=service status=ok run_id={run_id} table={table} records={loaded}"
            );
            Ok(Some(loaded))
        }
        Err(err) if err.is_integrity_violation() => {
            let error_code = if err.is_duplicate_key() {
                "duplicate_key"
            } else {
                "missing_city"
            };
            error!(
                "event=ingest_load module=service status=skip run_id={run_id} table={table} error_code={error_code} error={err}"
            );
            Ok(None)
        }
        Err(err) => Err(err.into()),
    }
}
