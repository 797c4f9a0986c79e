//! Forwarding row model.
//!
//! # Invariants
//! - One row per `(address, forwarding)` pair.
//! - Rows written here keep `is_alias != is_forwarding`.

use serde::{Deserialize, Serialize};

/// One row of the `forwardings` table.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ForwardingRow {
    pub id: i64,
    /// Source address.
    pub address: String,
    /// Destination address.
    pub forwarding: String,
    pub domain: String,
    pub dest_domain: String,
    /// Alias-style fan-out of the source alias.
    pub is_alias: bool,
    /// Pure forwarding rule.
    pub is_forwarding: bool,
    pub is_list: bool,
    pub is_maillist: bool,
    pub active: bool,
}
