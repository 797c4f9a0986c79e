//! Bundled `vmail` schema steps and their executor.
//!
//! # Responsibility
//! - Create the `alias` and `forwardings` tables in empty databases.
//!
//! # Invariants
//! - Step versions are strictly increasing.
//! - The applied version is mirrored to `PRAGMA user_version`.
//! - Steps use `IF NOT EXISTS`, so pre-existing iRedMail tables survive.

use crate::db::{DbError, DbResult};
use log::info;
use rusqlite::Connection;

#[derive(Debug, Clone, Copy)]
struct SchemaStep {
    version: u32,
    name: &'static str,
    sql: &'static str,
}

const SCHEMA_STEPS: &[SchemaStep] = &[SchemaStep {
    version: 1,
    name: "vmail_alias_forwardings",
    sql: include_str!("0001_vmail.sql"),
}];

/// Returns the latest schema version known by this binary.
pub fn latest_version() -> u32 {
    SCHEMA_STEPS.last().map_or(0, |step| step.version)
}

/// Applies pending schema steps in one transaction.
///
/// Returns how many steps ran; `0` when the database is current.
pub fn apply_migrations(conn: &mut Connection) -> DbResult<usize> {
    let current = conn.query_row("PRAGMA user_version;", [], |row| row.get::<_, u32>(0))?;
    let latest = latest_version();
    if current > latest {
        return Err(DbError::UnsupportedSchemaVersion {
            db_version: current,
            latest_supported: latest,
        });
    }

    let pending: Vec<&SchemaStep> = SCHEMA_STEPS
        .iter()
        .filter(|step| step.version > current)
        .collect();
    if pending.is_empty() {
        return Ok(0);
    }

    let tx = conn.transaction()?;
    for step in &pending {
        tx.execute_batch(step.sql)?;
        tx.pragma_update(None, "user_version", step.version)?;
        info!(
            "event=schema_step module=db status=ok version={} name={}",
            step.version, step.name
        );
    }
    tx.commit()?;

    Ok(pending.len())
}
