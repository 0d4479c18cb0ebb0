//! City repository contracts and SQLite implementation.
//!
//! # Responsibility
//! - Provide append/read APIs over `cities_data`.
//! - Keep SQL details inside the persistence boundary.
//!
//! # Invariants
//! - Write paths call `CityData::validate()` before SQL mutations.
//! - Batch inserts are all-or-nothing and take the write lock before the first row.
//! - Listing order is deterministic: `latitude ASC, longitude ASC`.

use super::{classify_insert_error, ensure_connection_ready, RepoError, RepoResult};
use crate::model::{CityData, Coordinates};
use rusqlite::{params, Connection, OptionalExtension, Row, Transaction, TransactionBehavior};

const CITY_SELECT_SQL: &str = "SELECT
    latitude,
    longitude,
    elevation,
    timezone
FROM cities_data";

const CITY_INSERT_SQL: &str = "INSERT INTO cities_data (
    latitude,
    longitude,
    elevation,
    timezone
) VALUES (?1, ?2, ?3, ?4);";

/// Repository interface for `cities_data`.
pub trait CityRepository {
    /// Inserts one city row.
    fn insert_city(&self, city: &CityData) -> RepoResult<()>;
    /// Inserts every row in one transaction; nothing is written on error.
    fn insert_cities(&self, cities: &[CityData]) -> RepoResult<usize>;
    fn get_city(&self, coords: &Coordinates) -> RepoResult<Option<CityData>>;
    fn list_cities(&self) -> RepoResult<Vec<CityData>>;
    fn count_cities(&self) -> RepoResult<u64>;
}

/// SQLite-backed city repository.
pub struct SqliteCityRepository<'conn> {
    conn: &'conn Connection,
}

impl<'conn> SqliteCityRepository<'conn> {
    /// Constructs a repository from a migrated/ready connection.
    pub fn try_new(conn: &'conn Connection) -> RepoResult<Self> {
        ensure_connection_ready(
            conn,
            "cities_data",
            &["latitude", "longitude", "elevation", "timezone"],
        )?;
        Ok(Self { conn })
    }
}

impl CityRepository for SqliteCityRepository<'_> {
    fn insert_city(&self, city: &CityData) -> RepoResult<()> {
        insert_city_row(self.conn, city)
    }

    fn insert_cities(&self, cities: &[CityData]) -> RepoResult<usize> {
        let tx = Transaction::new_unchecked(self.conn, TransactionBehavior::Immediate)?;
        for city in cities {
            insert_city_row(&tx, city)?;
        }
        tx.commit()?;
        Ok(cities.len())
    }

    fn get_city(&self, coords: &Coordinates) -> RepoResult<Option<CityData>> {
        let mut stmt = self.conn.prepare(&format!(
            "{CITY_SELECT_SQL}
             WHERE latitude = ?1 AND longitude = ?2;"
        ))?;
        let row = stmt
            .query_row(
                params![coords.latitude.as_str(), coords.longitude.as_str()],
                read_city_columns,
            )
            .optional()?;
        row.map(into_valid_city).transpose()
    }

    fn list_cities(&self) -> RepoResult<Vec<CityData>> {
        let mut stmt = self.conn.prepare(&format!(
            "{CITY_SELECT_SQL} ORDER BY latitude ASC, longitude ASC;"
        ))?;
        let mut rows = stmt.query([])?;
        let mut cities = Vec::new();
        while let Some(row) = rows.next()? {
            cities.push(into_valid_city(read_city_columns(row)?)?);
        }
        Ok(cities)
    }

    fn count_cities(&self) -> RepoResult<u64> {
        let count: i64 = self
            .conn
            .query_row("SELECT COUNT(*) FROM cities_data;", [], |row| row.get(0))?;
        u64::try_from(count)
            .map_err(|_| RepoError::InvalidData(format!("negative row count `{count}`")))
    }
}

fn insert_city_row(conn: &Connection, city: &CityData) -> RepoResult<()> {
    city.validate()?;
    conn.execute(
        CITY_INSERT_SQL,
        params![
            city.coordinates.latitude.as_str(),
            city.coordinates.longitude.as_str(),
            city.elevation,
            city.timezone.as_deref(),
        ],
    )
    .map_err(|err| classify_insert_error(err, &city.coordinates))?;
    Ok(())
}

fn read_city_columns(row: &Row<'_>) -> rusqlite::Result<CityData> {
    Ok(CityData {
        coordinates: Coordinates::new(
            row.get::<_, String>("latitude")?,
            row.get::<_, String>("longitude")?,
        ),
        elevation: row.get("elevation")?,
        timezone: row.get("timezone")?,
    })
}

pub(crate) fn into_valid_city(city: CityData) -> RepoResult<CityData> {
    city.validate().map_err(|err| {
        RepoError::InvalidData(format!(
            "cities_data row {} failed validation: {err}",
            city.coordinates
        ))
    })?;
    Ok(city)
}
