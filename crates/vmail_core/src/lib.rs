//! Reconciles iRedMail-style `vmail` alias and forwarding rows.
//! This crate is the single source of truth for reconcile semantics.

pub mod db;
pub mod logging;
pub mod model;
pub mod repo;
pub mod service;

pub use logging::{default_log_level, init_logging, LogLevel, LoggingError};
pub use model::address::{parse_address, parse_optional_address, Address, AddressError};
pub use model::alias::{normalize_expired, AliasRow, NEVER_EXPIRES};
pub use model::forwarding::ForwardingRow;
pub use model::request::{AddressArgs, AddressRequest, AddressState, ReconcileOutcome, RunMode};
pub use repo::alias_repo::{AliasDraft, AliasRepository, SqliteAliasRepository};
pub use repo::forwarding_repo::{ForwardingDraft, ForwardingRepository, SqliteForwardingRepository};
pub use repo::{RepoError, RepoResult};
pub use service::address_service::{
    reconcile, run, validate_args, AddressService, AddressServiceError, ReconcilePhase,
    ServiceResult, MAX_CONNECT_TIMEOUT_SECS,
};

/// Returns the core crate version.
pub fn core_version() -> &'static str {
    env!("CARGO_PKG_VERSION")
}

#[cfg(test)]
mod tests {
    use super::core_version;

    #[test]
    fn version_is_not_empty() {
        assert!(!core_version().is_empty());
    }
}
