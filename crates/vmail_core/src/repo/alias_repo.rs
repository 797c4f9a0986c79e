//! Alias repository contract and SQLite implementation.
//!
//! # Responsibility
//! - Provide fetch/insert/update/delete over the `alias` table.
//!
//! # Invariants
//! - `created` and `modified` are always computed by the database.
//! - Writes return affected-row counts; callers decide what "changed" means.

use super::{bool_to_int, parse_bool_column, RepoResult};
use crate::model::alias::AliasRow;
use rusqlite::{params, Connection, Row};

const ALIAS_SELECT_SQL: &str = "SELECT
    address,
    name,
    accesspolicy,
    domain,
    created,
    modified,
    expired,
    active
FROM alias";

/// Field values written by alias insert/update.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AliasDraft {
    pub address: String,
    pub name: String,
    pub domain: String,
    pub expired: String,
    pub active: bool,
}

/// Repository interface for the `alias` table.
pub trait AliasRepository {
    /// Looks up the alias row keyed by `address`.
    fn get_alias(&self, address: &str) -> RepoResult<Option<AliasRow>>;
    /// Inserts one alias; `created` and `modified` are set to now.
    fn create_alias(&self, draft: &AliasDraft) -> RepoResult<()>;
    /// Rewrites `name`, `expired`, `active` and bumps `modified`.
    fn update_alias(&self, draft: &AliasDraft) -> RepoResult<usize>;
    /// Deletes the alias keyed by `address`.
    fn delete_alias(&self, address: &str) -> RepoResult<usize>;
}

/// SQLite-backed alias repository.
///
/// Accepts a plain connection or an open `rusqlite::Transaction` (through
/// deref).
pub struct SqliteAliasRepository<'conn> {
    conn: &'conn Connection,
}

impl<'conn> SqliteAliasRepository<'conn> {
    pub fn new(conn: &'conn Connection) -> Self {
        Self { conn }
    }
}

impl AliasRepository for SqliteAliasRepository<'_> {
    fn get_alias(&self, address: &str) -> RepoResult<Option<AliasRow>> {
        let mut stmt = self
            .conn
            .prepare(&format!("{ALIAS_SELECT_SQL} WHERE address = ?1;"))?;

        let mut rows = stmt.query([address])?;
        if let Some(row) = rows.next()? {
            return Ok(Some(parse_alias_row(row)?));
        }

        Ok(None)
    }

    fn create_alias(&self, draft: &AliasDraft) -> RepoResult<()> {
        self.conn.execute(
            "INSERT INTO alias (
                address,
                name,
                domain,
                created,
                modified,
                expired,
                active
            ) VALUES (?1, ?2, ?3, datetime('now'), datetime('now'), ?4, ?5);",
            params![
                draft.address.as_str(),
                draft.name.as_str(),
                draft.domain.as_str(),
                draft.expired.as_str(),
                bool_to_int(draft.active),
            ],
        )?;

        Ok(())
    }

    fn update_alias(&self, draft: &AliasDraft) -> RepoResult<usize> {
        let changed = self.conn.execute(
            "UPDATE alias
             SET
                name = ?1,
                modified = datetime('now'),
                expired = ?2,
                active = ?3
             WHERE address = ?4;",
            params![
                draft.name.as_str(),
                draft.expired.as_str(),
                bool_to_int(draft.active),
                draft.address.as_str(),
            ],
        )?;

        Ok(changed)
    }

    fn delete_alias(&self, address: &str) -> RepoResult<usize> {
        let changed = self
            .conn
            .execute("DELETE FROM alias WHERE address = ?1;", [address])?;
        Ok(changed)
    }
}

fn parse_alias_row(row: &Row<'_>) -> RepoResult<AliasRow> {
    Ok(AliasRow {
        address: row.get("address")?,
        name: row.get("name")?,
        accesspolicy: row.get("accesspolicy")?,
        domain: row.get("domain")?,
        created: row.get("created")?,
        modified: row.get("modified")?,
        expired: row.get("expired")?,
        active: parse_bool_column(row.get("active")?, "alias.active")?,
    })
}
