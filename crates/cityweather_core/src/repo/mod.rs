//! Repository layer abstractions and persistence implementations.
//!
//! # Responsibility
//! - Define use-case oriented data access contracts for both tables.
//! - Isolate SQLite query details from ingestion orchestration.
//! - Translate SQLite constraint failures into semantic errors.
//!
//! # Invariants
//! - Repository writes must call `validate()` on the record before SQL mutations.
//! - Repositories only accept connections migrated to `latest_version()`.

pub mod city_repo;
pub mod weather_repo;

use crate::db::migrations::{current_user_version, latest_version};
use crate::db::DbError;
use crate::model::{Coordinates, ValidationError};
use rusqlite::{ffi, Connection};
use std::error::Error;
use std::fmt::{Display, Formatter};

pub type RepoResult<T> = Result<T, RepoError>;

/// Repository error for city/weather persistence and query operations.
#[derive(Debug)]
pub enum RepoError {
    /// Record failed field-level validation before reaching SQLite.
    Validation(ValidationError),
    /// Composite primary key already exists in the target table.
    DuplicateKey(Coordinates),
    /// `weather_aggregated` row references coordinates with no city row.
    MissingCity(Coordinates),
    /// A required column was written as NULL.
    NotNullViolation(String),
    /// Any other CHECK/constraint failure reported by SQLite.
    ConstraintViolation(String),
    Db(DbError),
    /// Connection schema is not at the expected migrated version.
    UninitializedConnection {
        expected_version: u32,
        actual_version: u32,
    },
    MissingRequiredTable(&'static str),
    MissingRequiredColumn {
        table: &'static str,
        column: &'static str,
    },
    /// Persisted data cannot be converted to a valid record.
    InvalidData(String),
}

impl Display for RepoError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Validation(err) => write!(f, "{err}"),
            Self::DuplicateKey(coords) => write!(f, "primary key already exists: {coords}"),
            Self::MissingCity(coords) => {
                write!(f, "no cities_data row for coordinates {coords}")
            }
            Self::NotNullViolation(message) => write!(f, "required value missing: {message}"),
            Self::ConstraintViolation(message) => write!(f, "constraint violated: {message}"),
            Self::Db(err) => write!(f, "{err}"),
            Self::UninitializedConnection {
                expected_version,
                actual_version,
            } => write!(
                f,
                "repository requires schema version {expected_version}, got {actual_version}"
            ),
            Self::MissingRequiredTable(table) => {
                write!(f, "repository requires table `{table}`")
            }
            Self::MissingRequiredColumn { table, column } => write!(
                f,
                "repository requires column `{column}` in table `{table}`"
            ),
            Self::InvalidData(message) => write!(f, "invalid persisted data: {message}"),
        }
    }
}

impl Error for RepoError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::Validation(err) => Some(err),
            Self::Db(err) => Some(err),
            Self::DuplicateKey(_)
            | Self::MissingCity(_)
            | Self::NotNullViolation(_)
            | Self::ConstraintViolation(_)
            | Self::UninitializedConnection { .. }
            | Self::MissingRequiredTable(_)
            | Self::MissingRequiredColumn { .. }
            | Self::InvalidData(_) => None,
        }
    }
}

impl From<ValidationError> for RepoError {
    fn from(value: ValidationError) -> Self {
        Self::Validation(value)
    }
}

impl From<DbError> for RepoError {
    fn from(value: DbError) -> Self {
        Self::Db(value)
    }
}

impl From<rusqlite::Error> for RepoError {
    fn from(value: rusqlite::Error) -> Self {
        Self::Db(DbError::Sqlite(value))
    }
}

impl RepoError {
    /// Whether this error is a primary-key collision on insert.
    pub fn is_duplicate_key(&self) -> bool {
        matches!(self, Self::DuplicateKey(_))
    }

    /// Whether a row collided with existing keys or referenced a missing city.
    ///
    /// In a mixed batch SQLite reports whichever row fails first, so the two
    /// classes are not distinguishable per batch.
    pub fn is_integrity_violation(&self) -> bool {
        matches!(self, Self::DuplicateKey(_) | Self::MissingCity(_))
    }
}

/// Maps a failed insert for `coords` to a semantic constraint error.
///
/// Non-constraint failures are passed through as `RepoError::Db`.
pub(crate) fn classify_insert_error(err: rusqlite::Error, coords: &Coordinates) -> RepoError {
    if let rusqlite::Error::SqliteFailure(failure, message) = &err {
        let message = message.clone().unwrap_or_else(|| failure.to_string());
        match failure.extended_code {
            ffi::SQLITE_CONSTRAINT_PRIMARYKEY | ffi::SQLITE_CONSTRAINT_UNIQUE => {
                return RepoError::DuplicateKey(coords.clone());
            }
            ffi::SQLITE_CONSTRAINT_FOREIGNKEY => return RepoError::MissingCity(coords.clone()),
            ffi::SQLITE_CONSTRAINT_NOTNULL => return RepoError::NotNullViolation(message),
            code if code & 0xff == ffi::SQLITE_CONSTRAINT => {
                return RepoError::ConstraintViolation(message);
            }
            _ => {}
        }
    }
    err.into()
}

/// Verifies schema version, table presence and column presence.
pub(crate) fn ensure_connection_ready(
    conn: &Connection,
    table: &'static str,
    columns: &[&'static str],
) -> RepoResult<()> {
    let expected_version = latest_version();
    let actual_version = current_user_version(conn)?;
    if actual_version != expected_version {
        return Err(RepoError::UninitializedConnection {
            expected_version,
            actual_version,
        });
    }

    if !table_exists(conn, table)? {
        return Err(RepoError::MissingRequiredTable(table));
    }

    for &column in columns {
        if !table_has_column(conn, table, column)? {
            return Err(RepoError::MissingRequiredColumn { table, column });
        }
    }

    Ok(())
}

fn table_exists(conn: &Connection, table: &str) -> RepoResult<bool> {
    let exists: i64 = conn.query_row(
        "SELECT EXISTS(
            SELECT 1
            FROM sqlite_master
            WHERE type = 'table' AND name = ?1
        );",
        [table],
        |row| row.get(0),
    )?;
    Ok(exists == 1)
}

fn table_has_column(conn: &Connection, table: &str, column: &str) -> RepoResult<bool> {
    let mut stmt = conn.prepare(&format!("PRAGMA table_info({table});"))?;
    let mut rows = stmt.query([])?;
    while let Some(row) = rows.next()? {
        let current: String = row.get(1)?;
        if current == column {
            return Ok(true);
        }
    }
    Ok(false)
}
