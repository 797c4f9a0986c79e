//! Repository layer over the `vmail` tables.
//!
//! # Responsibility
//! - Define use-case oriented data access contracts for aliases and
//!   forwardings.
//! - Keep SQL details out of the reconcile service.
//!
//! # Invariants
//! - Repositories never open, commit, or roll back transactions; callers
//!   hand them a connection or transaction and own its lifecycle.
//! - Read paths reject invalid persisted state instead of masking it.

use crate::db::DbError;
use std::error::Error;
use std::fmt::{Display, Formatter};

pub mod alias_repo;
pub mod forwarding_repo;

pub type RepoResult<T> = Result<T, RepoError>;

/// Repository error for alias and forwarding persistence.
#[derive(Debug)]
pub enum RepoError {
    Db(DbError),
    InvalidData(String),
}

impl Display for RepoError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Db(err) => write!(f, "{err}"),
            Self::InvalidData(message) => write!(f, "invalid persisted data: {message}"),
        }
    }
}

impl Error for RepoError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::Db(err) => Some(err),
            Self::InvalidData(_) => None,
        }
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

fn bool_to_int(value: bool) -> i64 {
    if value {
        1
    } else {
        0
    }
}

fn parse_bool_column(value: i64, column: &str) -> RepoResult<bool> {
    match value {
        0 => Ok(false),
        1 => Ok(true),
        other => Err(RepoError::InvalidData(format!(
            "invalid boolean value `{other}` in {column}"
        ))),
    }
}
