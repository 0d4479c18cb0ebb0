//! Command-line entry point for the city weather store.
//!
//! # Responsibility
//! - Initialize logging and the SQLite database.
//! - Run the ingestion pipeline against the live upstream APIs.
//! - Print stored rows for inspection.

use anyhow::{anyhow, Context, Result};
use chrono::{Local, NaiveDate};
use cityweather_core::db::migrations::latest_version;
use cityweather_core::db::open_db;
use cityweather_core::{
    default_log_level, init_logging, EtlConfig, IngestService, NominatimGeocoder,
    OpenMeteoClient, SqliteWeatherRepository, WeatherRepository,
};
use clap::{Parser, Subcommand};
use std::path::{Path, PathBuf};

const ABOUT: &str = "Aggregate Open-Meteo weather for target cities into SQLite";

#[derive(Parser, Debug)]
#[command(version, about = ABOUT)]
struct Args {
    /// Directory for rolling log files (defaults to the system temp dir).
    #[arg(long, global = true)]
    log_dir: Option<PathBuf>,

    /// trace|debug|info|warn|error
    #[arg(long, global = true)]
    log_level: Option<String>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Create or migrate the database.
    Init {
        #[arg(long)]
        db: PathBuf,
    },
    /// Geocode, fetch, aggregate and load weather rows.
    Run {
        #[arg(long)]
        db: PathBuf,
        /// TOML file overriding the default cities, thresholds and endpoints.
        #[arg(long)]
        config: Option<PathBuf>,
        /// Week boundary date (YYYY-MM-DD); defaults to the local date.
        #[arg(long)]
        today: Option<NaiveDate>,
    },
    /// Print stored cities with their aggregated weather.
    List {
        #[arg(long)]
        db: PathBuf,
        /// Emit JSON instead of a plain table.
        #[arg(long)]
        json: bool,
    },
}

fn main() -> Result<()> {
    let args = Args::parse();

    let log_dir = absolute_log_dir(args.log_dir.as_deref())?;
    let level = args.log_level.as_deref().unwrap_or(default_log_level());
    init_logging(level, &log_dir.to_string_lossy(), true)
        .map_err(|err| anyhow!("failed to initialize logging: {err}"))?;

    match args.command {
        Command::Init { db } => init(&db),
        Command::Run { db, config, today } => run(&db, config.as_deref(), today),
        Command::List { db, json } => list(&db, json),
    }
}

fn init(db: &Path) -> Result<()> {
    open_db(db).with_context(|| format!("failed to open database `{}`", db.display()))?;
    println!(
        "database `{}` ready at schema version {}",
        db.display(),
        latest_version()
    );
    Ok(())
}

fn run(db: &Path, config_path: Option<&Path>, today: Option<NaiveDate>) -> Result<()> {
    let config = match config_path {
        Some(path) => EtlConfig::load(path)?,
        None => EtlConfig::default(),
    };
    let timeout = config.http_timeout();
    let geocoder = NominatimGeocoder::new(&config.geocoding_url, &config.user_agent, timeout)?;
    let weather = OpenMeteoClient::new(
        &config.forecast_url,
        &config.historical_url,
        &config.user_agent,
        timeout,
    )?;

    let conn = open_db(db).with_context(|| format!("failed to open database `{}`", db.display()))?;
    let today = today.unwrap_or_else(|| Local::now().date_naive());
    let report = IngestService::new(geocoder, weather, config).run(&conn, today)?;

    println!("run {}", report.run_id);
    println!(
        "cities: requested={} geocoded={} fetched={} selected={}",
        report.cities_requested,
        report.cities_geocoded,
        report.series_fetched,
        report.cities_selected
    );
    println!(
        "loaded: cities_data={} weather_aggregated={}",
        report.cities_loaded, report.weather_loaded
    );
    for table in &report.skipped_tables {
        println!("skipped {table}: records violate table integrity constraints");
    }
    Ok(())
}

fn list(db: &Path, json: bool) -> Result<()> {
    let conn = open_db(db).with_context(|| format!("failed to open database `{}`", db.display()))?;
    let rows = SqliteWeatherRepository::try_new(&conn)?.list_city_weather()?;

    if json {
        println!("{}", serde_json::to_string_pretty(&rows)?);
        return Ok(());
    }

    println!(
        "{:<12} {:<12} {:>9} {:<8} {:>10} {:>10} {:>8} {:>6} {:>8}",
        "latitude", "longitude", "elevation", "tz", "last_week", "next_week", "jan_temp", "hum", "wind"
    );
    for row in rows {
        let weather = row.weather.as_ref();
        println!(
            "{:<12} {:<12} {:>9.1} {:<8} {:>10} {:>10} {:>8} {:>6} {:>8}",
            row.city.coordinates.latitude,
            row.city.coordinates.longitude,
            row.city.elevation,
            row.city.timezone.as_deref().unwrap_or("-"),
            cell(weather.map(|w| w.avg_temp_last_week)),
            cell(weather.and_then(|w| w.avg_temp_next_week)),
            cell(weather.and_then(|w| w.year_start_temp).map(f64::from)),
            weather
                .and_then(|w| w.year_start_humidity)
                .map_or_else(|| "-".to_string(), |value| value.to_string()),
            cell(weather.and_then(|w| w.year_start_wind_speed).map(f64::from)),
        );
    }
    Ok(())
}

fn cell(value: Option<f64>) -> String {
    value.map_or_else(|| "-".to_string(), |value| format!("{value:.2}"))
}

fn absolute_log_dir(requested: Option<&Path>) -> Result<PathBuf> {
    let dir = match requested {
        Some(path) if path.is_absolute() => path.to_path_buf(),
        Some(path) => std::env::current_dir()
            .context("failed to resolve current directory")?
            .join(path),
        None => std::env::temp_dir().join("cityweather"),
    };
    Ok(dir)
}
