//! Forwarding repository contract and SQLite implementation.
//!
//! # Responsibility
//! - Provide fetch/insert/update/delete over the `forwardings` table.
//!
//! # Invariants
//! - Rows are addressed by the `(address, forwarding)` pair, never by `id`.
//! - Writes always store `is_forwarding = !is_alias`.
//! - `is_list` and `is_maillist` are never written.

use super::{bool_to_int, parse_bool_column, RepoResult};
use crate::model::forwarding::ForwardingRow;
use rusqlite::{params, Connection, Row};

const FORWARDING_SELECT_SQL: &str = "SELECT
    id,
    address,
    forwarding,
    domain,
    dest_domain,
    is_alias,
    is_forwarding,
    is_list,
    is_maillist,
    active
FROM forwardings";

/// Field values written by forwarding insert/update.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ForwardingDraft {
    pub address: String,
    pub forwarding: String,
    pub domain: String,
    pub dest_domain: String,
    pub is_alias: bool,
    pub active: bool,
}

impl ForwardingDraft {
    pub fn is_forwarding(&self) -> bool {
        !self.is_alias
    }
}

/// Repository interface for the `forwardings` table.
pub trait ForwardingRepository {
    /// Looks up the row for one source/destination pair.
    fn get_forwarding(&self, address: &str, forwarding: &str)
        -> RepoResult<Option<ForwardingRow>>;
    fn create_forwarding(&self, draft: &ForwardingDraft) -> RepoResult<()>;
    /// Rewrites domains, flags, and `active` for the draft's pair.
    fn update_forwarding(&self, draft: &ForwardingDraft) -> RepoResult<usize>;
    /// Deletes the row for one source/destination pair.
    fn delete_forwarding(&self, address: &str, forwarding: &str) -> RepoResult<usize>;
    /// Deletes every row whose source is `address`.
    fn delete_forwardings_from(&self, address: &str) -> RepoResult<usize>;
}

/// SQLite-backed forwarding repository.
pub struct SqliteForwardingRepository<'conn> {
    conn: &'conn Connection,
}

impl<'conn> SqliteForwardingRepository<'conn> {
    pub fn new(conn: &'conn Connection) -> Self {
        Self { conn }
    }
}

impl ForwardingRepository for SqliteForwardingRepository<'_> {
    fn get_forwarding(
        &self,
        address: &str,
        forwarding: &str,
    ) -> RepoResult<Option<ForwardingRow>> {
        let mut stmt = self.conn.prepare(&format!(
            "{FORWARDING_SELECT_SQL}
             WHERE address = ?1
               AND forwarding = ?2
             ORDER BY id ASC
             LIMIT 1;"
        ))?;

        let mut rows = stmt.query([address, forwarding])?;
        if let Some(row) = rows.next()? {
            return Ok(Some(parse_forwarding_row(row)?));
        }

        Ok(None)
    }

    fn create_forwarding(&self, draft: &ForwardingDraft) -> RepoResult<()> {
        self.conn.execute(
            "INSERT INTO forwardings (
                address,
                forwarding,
                domain,
                dest_domain,
                is_alias,
                is_forwarding,
                active
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7);",
            params![
                draft.address.as_str(),
                draft.forwarding.as_str(),
                draft.domain.as_str(),
                draft.dest_domain.as_str(),
                bool_to_int(draft.is_alias),
                bool_to_int(draft.is_forwarding()),
                bool_to_int(draft.active),
            ],
        )?;

        Ok(())
    }

    fn update_forwarding(&self, draft: &ForwardingDraft) -> RepoResult<usize> {
        let changed = self.conn.execute(
            "UPDATE forwardings
             SET
                domain = ?1,
                dest_domain = ?2,
                active = ?3,
                is_alias = ?4,
                is_forwarding = ?5
             WHERE address = ?6
               AND forwarding = ?7;",
            params![
                draft.domain.as_str(),
                draft.dest_domain.as_str(),
                bool_to_int(draft.active),
                bool_to_int(draft.is_alias),
                bool_to_int(draft.is_forwarding()),
                draft.address.as_str(),
                draft.forwarding.as_str(),
            ],
        )?;

        Ok(changed)
    }

    fn delete_forwarding(&self, address: &str, forwarding: &str) -> RepoResult<usize> {
        let changed = self.conn.execute(
            "DELETE FROM forwardings WHERE address = ?1 AND forwarding = ?2;",
            [address, forwarding],
        )?;
        Ok(changed)
    }

    fn delete_forwardings_from(&self, address: &str) -> RepoResult<usize> {
        let changed = self
            .conn
            .execute("DELETE FROM forwardings WHERE address = ?1;", [address])?;
        Ok(changed)
    }
}

fn parse_forwarding_row(row: &Row<'_>) -> RepoResult<ForwardingRow> {
    Ok(ForwardingRow {
        id: row.get("id")?,
        address: row.get("address")?,
        forwarding: row.get("forwarding")?,
        domain: row.get("domain")?,
        dest_domain: row.get("dest_domain")?,
        is_alias: parse_bool_column(row.get("is_alias")?, "forwardings.is_alias")?,
        is_forwarding: parse_bool_column(row.get("is_forwarding")?, "forwardings.is_forwarding")?,
        is_list: parse_bool_column(row.get("is_list")?, "forwardings.is_list")?,
        is_maillist: parse_bool_column(row.get("is_maillist")?, "forwardings.is_maillist")?,
        active: parse_bool_column(row.get("active")?, "forwardings.active")?,
    })
}
