//! Connection bootstrap utilities for SQLite.
//!
//! # Responsibility
//! - Open existing `vmail` databases and check the managed tables exist.
//! - Create or open databases with the bundled schema applied.
//!
//! # Invariants
//! - Returned connections have a busy timeout set.
//! - Returned connections expose every column the repositories touch.

use super::migrations::apply_migrations;
use super::{ConnectionConfig, DbError, DbResult};
use log::{error, info};
use rusqlite::{Connection, OpenFlags};
use std::path::Path;
use std::time::{Duration, Instant};

const BOOTSTRAP_BUSY_TIMEOUT: Duration = Duration::from_secs(5);
/// SQLite takes the busy timeout as `i32` milliseconds.
const MAX_BUSY_TIMEOUT: Duration = Duration::from_millis(i32::MAX as u64);

const REQUIRED_COLUMNS: &[(&str, &[&str])] = &[
    (
        "alias",
        &[
            "address",
            "name",
            "accesspolicy",
            "domain",
            "created",
            "modified",
            "expired",
            "active",
        ],
    ),
    (
        "forwardings",
        &[
            "id",
            "address",
            "forwarding",
            "domain",
            "dest_domain",
            "is_alias",
            "is_forwarding",
            "is_list",
            "is_maillist",
            "active",
        ],
    ),
];

/// Opens an existing `vmail` database for reconciliation.
///
/// # Side effects
/// - Emits `db_open` logging events with duration and status.
///
/// # Errors
/// - The file does not exist or cannot be opened read-write.
/// - A managed table or column is missing.
pub fn open_db(config: &ConnectionConfig) -> DbResult<Connection> {
    let started_at = Instant::now();
    info!("event=db_open module=db status=start mode=existing");

    let result = Connection::open_with_flags(
        &config.login_db,
        OpenFlags::SQLITE_OPEN_READ_WRITE
            | OpenFlags::SQLITE_OPEN_URI
            | OpenFlags::SQLITE_OPEN_NO_MUTEX,
    )
    .map_err(DbError::from)
    .and_then(|conn| {
        conn.busy_timeout(config.connect_timeout.min(MAX_BUSY_TIMEOUT))?;
        ensure_schema_ready(&conn)?;
        Ok(conn)
    });

    match result {
        Ok(conn) => {
            info!(
                "event=db_open module=db status=ok mode=existing duration_ms={}",
                started_at.elapsed().as_millis()
            );
            Ok(conn)
        }
        Err(err) => {
            error!(
                "event=db_open module=db status=error mode=existing duration_ms={} error_code=db_open_failed error={}",
                started_at.elapsed().as_millis(),
                err
            );
            Err(err)
        }
    }
}

/// Opens or creates a database file and applies the bundled schema.
///
/// # Side effects
/// - May create the file and the `alias`/`forwardings` tables.
/// - Emits `schema_bootstrap` logging events.
pub fn create_db(path: impl AsRef<Path>) -> DbResult<Connection> {
    let mut conn = Connection::open(path)?;
    bootstrap_connection(&mut conn, "file")?;
    Ok(conn)
}

/// Opens an in-memory database with the bundled schema applied.
pub fn open_db_in_memory() -> DbResult<Connection> {
    let mut conn = Connection::open_in_memory()?;
    bootstrap_connection(&mut conn, "memory")?;
    Ok(conn)
}

fn bootstrap_connection(conn: &mut Connection, mode: &str) -> DbResult<()> {
    let started_at = Instant::now();
    let result = bootstrap_schema(conn);

    match &result {
        Ok(()) => info!(
            "event=schema_bootstrap module=db status=ok mode={mode} duration_ms={}",
            started_at.elapsed().as_millis()
        ),
        Err(err) => error!(
            "event=schema_bootstrap module=db status=error mode={mode} duration_ms={} error_code=db_bootstrap_failed error={}",
            started_at.elapsed().as_millis(),
            err
        ),
    }
    result
}

fn bootstrap_schema(conn: &mut Connection) -> DbResult<()> {
    conn.busy_timeout(BOOTSTRAP_BUSY_TIMEOUT)?;
    apply_migrations(conn)?;
    ensure_schema_ready(conn)
}

fn ensure_schema_ready(conn: &Connection) -> DbResult<()> {
    for &(table, columns) in REQUIRED_COLUMNS {
        if !table_exists(conn, table)? {
            return Err(DbError::MissingRequiredTable(table));
        }
        for &column in columns {
            if !table_has_column(conn, table, column)? {
                return Err(DbError::MissingRequiredColumn { table, column });
            }
        }
    }
    Ok(())
}

fn table_exists(conn: &Connection, table: &str) -> DbResult<bool> {
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

fn table_has_column(conn: &Connection, table: &str, column: &str) -> DbResult<bool> {
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
