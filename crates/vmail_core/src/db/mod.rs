//! SQLite storage bootstrap for the `vmail` schema.
//!
//! # Responsibility
//! - Open connections to an existing `vmail` database and verify its shape.
//! - Bootstrap the schema into empty databases for development and tests.
//!
//! # Invariants
//! - `open_db` never creates files or tables.
//! - Bootstrap version is tracked via `PRAGMA user_version`.

use std::error::Error;
use std::fmt::{Display, Formatter};
use std::path::PathBuf;
use std::time::Duration;

pub mod migrations;
mod open;

pub use open::{create_db, open_db, open_db_in_memory};

pub type DbResult<T> = Result<T, DbError>;

/// Connection settings for one run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConnectionConfig {
    /// Path of an existing `vmail` database file.
    pub login_db: PathBuf,
    /// How long to wait on a locked database.
    pub connect_timeout: Duration,
}

impl ConnectionConfig {
    pub fn new(login_db: impl Into<PathBuf>, connect_timeout: Duration) -> Self {
        Self {
            login_db: login_db.into(),
            connect_timeout,
        }
    }
}

#[derive(Debug)]
pub enum DbError {
    Sqlite(rusqlite::Error),
    UnsupportedSchemaVersion {
        db_version: u32,
        latest_supported: u32,
    },
    MissingRequiredTable(&'static str),
    MissingRequiredColumn {
        table: &'static str,
        column: &'static str,
    },
}

impl Display for DbError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Sqlite(err) => write!(f, "{err}"),
            Self::UnsupportedSchemaVersion {
                db_version,
                latest_supported,
            } => write!(
                f,
                "database schema version {db_version} is newer than supported {latest_supported}"
            ),
            Self::MissingRequiredTable(table) => write!(f, "missing required table `{table}`"),
            Self::MissingRequiredColumn { table, column } => {
                write!(f, "missing required column `{table}.{column}`")
            }
        }
    }
}

impl Error for DbError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::Sqlite(err) => Some(err),
            _ => None,
        }
    }
}

impl From<rusqlite::Error> for DbError {
    fn from(value: rusqlite::Error) -> Self {
        Self::Sqlite(value)
    }
}
