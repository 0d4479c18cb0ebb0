//! Aggregated weather repository contracts and SQLite implementation.
//!
//! # Responsibility
//! - Provide append/read APIs over `weather_aggregated`.
//! - Expose the city/weather join used by listing consumers.
//!
//! # Invariants
//! - Every inserted row must reference an existing `cities_data` key.
//! - Batch inserts are all-or-nothing and take the write lock before the first row.
//! - Listing order is deterministic: `latitude ASC, longitude ASC`.

use super::city_repo::into_valid_city;
use super::{classify_insert_error, ensure_connection_ready, RepoError, RepoResult};
use crate::model::{CityData, CityWeather, Coordinates, WeatherAggregated};
use rusqlite::{params, Connection, OptionalExtension, Row, Transaction, TransactionBehavior};

const WEATHER_SELECT_SQL: &str = "SELECT
    latitude,
    longitude,
    avg_temp_last_week,
    avg_temp_next_week,
    year_start_temp,
    year_start_humidity,
    year_start_wind_speed
FROM weather_aggregated";

const WEATHER_INSERT_SQL: &str = "INSERT INTO weather_aggregated (
    latitude,
    longitude,
    avg_temp_last_week,
    avg_temp_next_week,
    year_start_temp,
    year_start_humidity,
    year_start_wind_speed
) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7);";

const CITY_WEATHER_SELECT_SQL: &str = "SELECT
    c.latitude,
    c.longitude,
    c.elevation,
    c.timezone,
    w.latitude IS NOT NULL,
    w.avg_temp_last_week,
    w.avg_temp_next_week,
    w.year_start_temp,
    w.year_start_humidity,
    w.year_start_wind_speed
FROM cities_data c
LEFT JOIN weather_aggregated w
    ON w.latitude = c.latitude AND w.longitude = c.longitude
ORDER BY c.latitude ASC, c.longitude ASC;";

/// Repository interface for `weather_aggregated`.
pub trait WeatherRepository {
    /// Inserts one aggregated weather row.
    fn insert_weather(&self, weather: &WeatherAggregated) -> RepoResult<()>;
    /// Inserts every row in one transaction; nothing is written on error.
    fn insert_weather_batch(&self, rows: &[WeatherAggregated]) -> RepoResult<usize>;
    fn get_weather(&self, coords: &Coordinates) -> RepoResult<Option<WeatherAggregated>>;
    fn list_weather(&self) -> RepoResult<Vec<WeatherAggregated>>;
    /// Lists every city with its weather row, when one exists.
    fn list_city_weather(&self) -> RepoResult<Vec<CityWeather>>;
    fn count_weather(&self) -> RepoResult<u64>;
}

/// SQLite-backed aggregated weather repository.
pub struct SqliteWeatherRepository<'conn> {
    conn: &'conn Connection,
}

impl<'conn> SqliteWeatherRepository<'conn> {
    /// Constructs a repository from a migrated/ready connection.
    pub fn try_new(conn: &'conn Connection) -> RepoResult<Self> {
        ensure_connection_ready(
            conn,
            "weather_aggregated",
            &[
                "latitude",
                "longitude",
                "avg_temp_last_week",
                "avg_temp_next_week",
                "year_start_temp",
                "year_start_humidity",
                "year_start_wind_speed",
            ],
        )?;
        Ok(Self { conn })
    }
}

impl WeatherRepository for SqliteWeatherRepository<'_> {
    fn insert_weather(&self, weather: &WeatherAggregated) -> RepoResult<()> {
        insert_weather_row(self.conn, weather)
    }

    fn insert_weather_batch(&self, rows: &[WeatherAggregated]) -> RepoResult<usize> {
        let tx = Transaction::new_unchecked(self.conn, TransactionBehavior::Immediate)?;
        for weather in rows {
            insert_weather_row(&tx, weather)?;
        }
        tx.commit()?;
        Ok(rows.len())
    }

    fn get_weather(&self, coords: &Coordinates) -> RepoResult<Option<WeatherAggregated>> {
        let mut stmt = self.conn.prepare(&format!(
            "{WEATHER_SELECT_SQL}
             WHERE latitude = ?1 AND longitude = ?2;"
        ))?;
        let row = stmt
            .query_row(
                params![coords.latitude.as_str(), coords.longitude.as_str()],
                read_weather_columns,
            )
            .optional()?;
        row.map(into_valid_weather).transpose()
    }

    fn list_weather(&self) -> RepoResult<Vec<WeatherAggregated>> {
        let mut stmt = self.conn.prepare(&format!(
            "{WEATHER_SELECT_SQL} ORDER BY latitude ASC, longitude ASC;"
        ))?;
        let mut rows = stmt.query([])?;
        let mut items = Vec::new();
        while let Some(row) = rows.next()? {
            items.push(into_valid_weather(read_weather_columns(row)?)?);
        }
        Ok(items)
    }

    fn list_city_weather(&self) -> RepoResult<Vec<CityWeather>> {
        let mut stmt = self.conn.prepare(CITY_WEATHER_SELECT_SQL)?;
        let mut rows = stmt.query([])?;
        let mut items = Vec::new();
        while let Some(row) = rows.next()? {
            items.push(parse_city_weather_row(row)?);
        }
        Ok(items)
    }

    fn count_weather(&self) -> RepoResult<u64> {
        let count: i64 =
            self.conn
                .query_row("SELECT COUNT(*) FROM weather_aggregated;", [], |row| {
                    row.get(0)
                })?;
        u64::try_from(count)
            .map_err(|_| RepoError::InvalidData(format!("negative row count `{count}`")))
    }
}

fn insert_weather_row(conn: &Connection, weather: &WeatherAggregated) -> RepoResult<()> {
    weather.validate()?;
    conn.execute(
        WEATHER_INSERT_SQL,
        params![
            weather.coordinates.latitude.as_str(),
            weather.coordinates.longitude.as_str(),
            weather.avg_temp_last_week,
            weather.avg_temp_next_week,
            weather.year_start_temp,
            weather.year_start_humidity,
            weather.year_start_wind_speed,
        ],
    )
    .map_err(|err| classify_insert_error(err, &weather.coordinates))?;
    Ok(())
}

fn read_weather_columns(row: &Row<'_>) -> rusqlite::Result<WeatherAggregated> {
    Ok(WeatherAggregated {
        coordinates: Coordinates::new(
            row.get::<_, String>("latitude")?,
            row.get::<_, String>("longitude")?,
        ),
        avg_temp_last_week: row.get("avg_temp_last_week")?,
        avg_temp_next_week: row.get("avg_temp_next_week")?,
        year_start_temp: row.get("year_start_temp")?,
        year_start_humidity: row.get("year_start_humidity")?,
        year_start_wind_speed: row.get("year_start_wind_speed")?,
    })
}

fn into_valid_weather(weather: WeatherAggregated) -> RepoResult<WeatherAggregated> {
    weather.validate().map_err(|err| {
        RepoError::InvalidData(format!(
            "weather_aggregated row {} failed validation: {err}",
            weather.coordinates
        ))
    })?;
    Ok(weather)
}

fn parse_city_weather_row(row: &Row<'_>) -> RepoResult<CityWeather> {
    let coordinates = Coordinates::new(row.get::<_, String>(0)?, row.get::<_, String>(1)?);
    let city = into_valid_city(CityData {
        coordinates: coordinates.clone(),
        elevation: row.get(2)?,
        timezone: row.get(3)?,
    })?;

    let has_weather: bool = row.get(4)?;
    let weather = if has_weather {
        Some(into_valid_weather(WeatherAggregated {
            coordinates,
            avg_temp_last_week: row.get(5)?,
            avg_temp_next_week: row.get(6)?,
            year_start_temp: row.get(7)?,
            year_start_humidity: row.get(8)?,
            year_start_wind_speed: row.get(9)?,
        })?)
    } else {
        None
    };

    Ok(CityWeather { city, weather })
}
