//! Reconcile request and outcome models.
//!
//! # Responsibility
//! - Describe the raw argument document accepted by callers (`AddressArgs`).
//! - Describe the validated request the reconciler works on (`AddressRequest`).
//! - Describe what one reconcile run reports back (`ReconcileOutcome`).
//!
//! # Invariants
//! - `AddressRequest` only exists for inputs whose addresses and `expired`
//!   value parsed successfully.

use crate::model::address::Address;
use crate::model::alias::AliasRow;
use crate::model::forwarding::ForwardingRow;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

const DEFAULT_LOGIN_DB: &str = "vmail.db";
const DEFAULT_CONNECT_TIMEOUT_SECS: u64 = 30;

/// Desired state for one source address.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AddressState {
    /// Alias row exists; an optional destination is an alias-style forwarding.
    #[default]
    Alias,
    /// Only a pure forwarding row for the destination exists.
    Forwarding,
    /// Rows are removed.
    Absent,
}

impl AddressState {
    /// Stable lowercase name used in logs.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Alias => "alias",
            Self::Forwarding => "forwarding",
            Self::Absent => "absent",
        }
    }
}

/// Raw argument document, as deserialized from JSON.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AddressArgs {
    pub src_address: String,
    #[serde(default)]
    pub dest_address: Option<String>,
    #[serde(default)]
    pub state: AddressState,
    /// Alias name override; defaults to the local part on create.
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub expired: Option<String>,
    #[serde(default = "default_active")]
    pub active: bool,
    /// Path of the `vmail` SQLite database.
    #[serde(default = "default_login_db")]
    pub login_db: PathBuf,
    /// Seconds to wait on a locked database.
    #[serde(default = "default_connect_timeout")]
    pub connect_timeout: u64,
    #[serde(default, alias = "_ansible_check_mode")]
    pub check_mode: bool,
}

impl AddressArgs {
    /// Creates arguments for `src_address` with every other field defaulted.
    pub fn new(src_address: impl Into<String>) -> Self {
        Self {
            src_address: src_address.into(),
            dest_address: None,
            state: AddressState::default(),
            name: None,
            expired: None,
            active: default_active(),
            login_db: default_login_db(),
            connect_timeout: default_connect_timeout(),
            check_mode: false,
        }
    }
}

fn default_active() -> bool {
    true
}

fn default_login_db() -> PathBuf {
    PathBuf::from(DEFAULT_LOGIN_DB)
}

fn default_connect_timeout() -> u64 {
    DEFAULT_CONNECT_TIMEOUT_SECS
}

/// Validated reconcile request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AddressRequest {
    pub src: Address,
    pub dest: Option<Address>,
    pub state: AddressState,
    pub name: Option<String>,
    /// Normalized to `YYYY-MM-DD HH:MM:SS` when present.
    pub expired: Option<String>,
    pub active: bool,
}

/// Whether the reconcile transaction is committed or always rolled back.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum RunMode {
    #[default]
    Apply,
    /// Dry run: same statements, rolled back at the end.
    Check,
}

impl RunMode {
    pub fn from_check_mode(check_mode: bool) -> Self {
        if check_mode {
            Self::Check
        } else {
            Self::Apply
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Apply => "apply",
            Self::Check => "check",
        }
    }
}

/// Result of one reconcile run.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ReconcileOutcome {
    /// True when any row was created, updated, or deleted.
    pub changed: bool,
    /// Final alias row; `None` when the run did not touch the alias.
    pub alias: Option<AliasRow>,
    /// Final forwarding row; `None` when no destination was handled.
    pub forwarding: Option<ForwardingRow>,
}
