//! Alias row model.
//!
//! # Responsibility
//! - Mirror one row of the `alias` table.
//! - Normalize `expired` input to the stored datetime text form.
//!
//! # Invariants
//! - `address` is the unique key of the row.
//! - `expired` is always `YYYY-MM-DD HH:MM:SS`; `NEVER_EXPIRES` means the
//!   alias has no expiry.

use chrono::{NaiveDate, NaiveDateTime};
use serde::{Deserialize, Serialize};

/// Sentinel `expired` value for aliases that never expire.
pub const NEVER_EXPIRES: &str = "9999-12-31 00:00:00";

const EXPIRED_FORMAT: &str = "%Y-%m-%d %H:%M:%S";
const EXPIRED_INPUT_FORMATS: &[&str] = &["%Y-%m-%d %H:%M:%S", "%Y-%m-%dT%H:%M:%S"];

/// One row of the `alias` table.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AliasRow {
    pub address: String,
    pub name: String,
    /// Managed by other tooling; read back but never written here.
    pub accesspolicy: String,
    pub domain: String,
    /// Database-computed creation time.
    pub created: String,
    /// Database-computed time of the last write through this crate.
    pub modified: String,
    pub expired: String,
    pub active: bool,
}

impl AliasRow {
    /// Returns whether the alias carries the "never expires" sentinel.
    pub fn never_expires(&self) -> bool {
        self.expired == NEVER_EXPIRES
    }
}

/// Normalizes an `expired` input to `YYYY-MM-DD HH:MM:SS`.
///
/// Accepts a bare date (midnight is assumed) or a datetime separated by a
/// space or `T`. Returns `None` for anything else, including calendar dates
/// or clock times that do not exist.
pub fn normalize_expired(value: &str) -> Option<String> {
    let value = value.trim();
    // chrono accepts unpadded fields; the length pins the zero-padded shape.
    let parsed = match value.len() {
        10 => NaiveDate::parse_from_str(value, "%Y-%m-%d")
            .ok()?
            .and_hms_opt(0, 0, 0)?,
        19 => EXPIRED_INPUT_FORMATS
            .iter()
            .find_map(|format| NaiveDateTime::parse_from_str(value, format).ok())?,
        _ => return None,
    };
    Some(parsed.format(EXPIRED_FORMAT).to_string())
}
