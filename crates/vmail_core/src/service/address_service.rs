//! Alias/forwarding reconcile service.
//!
//! # Responsibility
//! - Validate raw arguments before any database access.
//! - Converge the `alias` and `forwardings` rows of one source address to the
//!   requested state inside a single transaction.
//! - Commit, or roll back in check mode and on any failure.
//!
//! # Invariants
//! - Exactly one transaction per run; it is released exactly once.
//! - Writes happen only when the stored row differs from the desired one.
//! - Failed runs leave nothing committed.

use crate::db::{open_db, ConnectionConfig, DbError};
use crate::model::address::{parse_address, parse_optional_address, Address, AddressError};
use crate::model::alias::{normalize_expired, AliasRow, NEVER_EXPIRES};
use crate::model::forwarding::ForwardingRow;
use crate::model::request::{AddressArgs, AddressRequest, AddressState, ReconcileOutcome, RunMode};
use crate::repo::alias_repo::{AliasDraft, AliasRepository, SqliteAliasRepository};
use crate::repo::forwarding_repo::{
    ForwardingDraft, ForwardingRepository, SqliteForwardingRepository,
};
use crate::repo::{RepoError, RepoResult};
use log::{debug, error, info, warn};
use rusqlite::{Connection, Transaction};
use std::error::Error;
use std::fmt::{Display, Formatter};
use std::path::PathBuf;
use std::time::{Duration, Instant};

pub type ServiceResult<T> = Result<T, AddressServiceError>;

/// Largest `connect_timeout` SQLite can take as a busy timeout (milliseconds in an `i32`).
pub const MAX_CONNECT_TIMEOUT_SECS: u64 = i32::MAX as u64 / 1000;

/// Step of a run that hit a database failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReconcilePhase {
    Alias,
    Forwarding,
    Delete,
    /// Opening, committing, or rolling back the transaction.
    Transaction,
}

impl ReconcilePhase {
    fn failure_message(self) -> &'static str {
        match self {
            Self::Alias => "unable to update or create alias",
            Self::Forwarding => "unable to update or create forwarding",
            Self::Delete => "unable to delete alias or forwardings",
            Self::Transaction => "unable to finalize transaction",
        }
    }
}

/// Errors from one reconcile run. All of them are fatal for the run.
#[derive(Debug)]
pub enum AddressServiceError {
    /// Source or destination is not a mail address.
    InvalidAddress(AddressError),
    /// `expired` is not a date or datetime.
    InvalidExpired(String),
    /// `connect_timeout` is above `MAX_CONNECT_TIMEOUT_SECS`.
    InvalidConnectTimeout(u64),
    /// No usable database session.
    Connection { login_db: PathBuf, source: DbError },
    /// Read/write failure; the transaction was rolled back.
    Database {
        phase: ReconcilePhase,
        source: RepoError,
    },
}

impl AddressServiceError {
    fn database(phase: ReconcilePhase, source: impl Into<RepoError>) -> Self {
        Self::Database {
            phase,
            source: source.into(),
        }
    }
}

impl Display for AddressServiceError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::InvalidAddress(err) => write!(f, "{err}"),
            Self::InvalidExpired(value) => write!(
                f,
                "invalid expired value `{value}`; expected YYYY-MM-DD or YYYY-MM-DD HH:MM:SS"
            ),
            Self::InvalidConnectTimeout(secs) => write!(
                f,
                "invalid connect_timeout {secs}; expected at most {MAX_CONNECT_TIMEOUT_SECS} seconds"
            ),
            Self::Connection { login_db, source } => write!(
                f,
                "unable to connect to database, check that login_db `{}` points to an existing vmail database. Exception message: {source}",
                login_db.display()
            ),
            Self::Database { phase, source } => {
                write!(f, "{}: {source}", phase.failure_message())
            }
        }
    }
}

impl Error for AddressServiceError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::InvalidAddress(err) => Some(err),
            Self::InvalidExpired(_) | Self::InvalidConnectTimeout(_) => None,
            Self::Connection { source, .. } => Some(source),
            Self::Database { source, .. } => Some(source),
        }
    }
}

impl From<AddressError> for AddressServiceError {
    fn from(value: AddressError) -> Self {
        Self::InvalidAddress(value)
    }
}

/// Reconcile service over alias and forwarding repositories.
pub struct AddressService<A: AliasRepository, F: ForwardingRepository> {
    aliases: A,
    forwardings: F,
}

impl<A: AliasRepository, F: ForwardingRepository> AddressService<A, F> {
    pub fn new(aliases: A, forwardings: F) -> Self {
        Self {
            aliases,
            forwardings,
        }
    }

    /// Converges rows to `request` without touching transaction state.
    ///
    /// # Contract
    /// - `absent`: delete, rows in the outcome are `None`.
    /// - `alias`: upsert alias, then the forwarding when a destination is set.
    /// - `forwarding`: upsert the forwarding only; no-op without destination.
    pub fn apply(&self, request: &AddressRequest) -> ServiceResult<ReconcileOutcome> {
        if request.state == AddressState::Absent {
            let changed = self
                .delete(&request.src, request.dest.as_ref())
                .map_err(|err| AddressServiceError::database(ReconcilePhase::Delete, err))?;
            return Ok(ReconcileOutcome {
                changed,
                alias: None,
                forwarding: None,
            });
        }

        let mut outcome = ReconcileOutcome::default();

        if request.state == AddressState::Alias {
            let (changed, row) = self
                .upsert_alias(request)
                .map_err(|err| AddressServiceError::database(ReconcilePhase::Alias, err))?;
            outcome.changed = changed;
            outcome.alias = Some(row);
        }

        if let Some(dest) = request.dest.as_ref() {
            let (changed, row) = self
                .upsert_forwarding(request, dest)
                .map_err(|err| AddressServiceError::database(ReconcilePhase::Forwarding, err))?;
            outcome.changed = outcome.changed || changed;
            outcome.forwarding = Some(row);
        }

        Ok(outcome)
    }

    /// Creates the alias when missing, otherwise updates it when it differs.
    pub fn upsert_alias(&self, request: &AddressRequest) -> RepoResult<(bool, AliasRow)> {
        let address = request.src.address.as_str();
        match self.aliases.get_alias(address)? {
            None => {
                let draft = AliasDraft {
                    address: address.to_string(),
                    name: request
                        .name
                        .clone()
                        .unwrap_or_else(|| request.src.name.clone()),
                    domain: request.src.domain.clone(),
                    expired: request
                        .expired
                        .clone()
                        .unwrap_or_else(|| NEVER_EXPIRES.to_string()),
                    active: request.active,
                };
                self.aliases.create_alias(&draft)?;
                let created = self.read_back_alias(address)?;
                info!(
                    "event=alias_upsert module=service status=ok action=create domain={} never_expires={}",
                    created.domain,
                    created.never_expires()
                );
                Ok((true, created))
            }
            Some(existing) => self.update_alias_if_needed(existing, request),
        }
    }

    fn update_alias_if_needed(
        &self,
        existing: AliasRow,
        request: &AddressRequest,
    ) -> RepoResult<(bool, AliasRow)> {
        if !alias_needs_update(&existing, request) {
            debug!(
                "event=alias_upsert module=service status=ok action=noop domain={}",
                existing.domain
            );
            return Ok((false, existing));
        }

        let draft = AliasDraft {
            address: request.src.address.clone(),
            name: request.name.clone().unwrap_or(existing.name),
            domain: existing.domain,
            expired: request.expired.clone().unwrap_or(existing.expired),
            active: request.active,
        };
        self.aliases.update_alias(&draft)?;
        info!(
            "event=alias_upsert module=service status=ok action=update domain={}",
            draft.domain
        );
        Ok((true, self.read_back_alias(&draft.address)?))
    }

    /// Creates the forwarding pair when missing, otherwise rewrites it when
    /// domains, `active`, or the flag pair are stale.
    pub fn upsert_forwarding(
        &self,
        request: &AddressRequest,
        dest: &Address,
    ) -> RepoResult<(bool, ForwardingRow)> {
        let draft = ForwardingDraft {
            address: request.src.address.clone(),
            forwarding: dest.address.clone(),
            domain: request.src.domain.clone(),
            dest_domain: dest.domain.clone(),
            is_alias: request.state == AddressState::Alias,
            active: request.active,
        };

        match self
            .forwardings
            .get_forwarding(&draft.address, &draft.forwarding)?
        {
            None => {
                self.forwardings.create_forwarding(&draft)?;
                info!(
                    "event=forwarding_upsert module=service status=ok action=create is_alias={} dest_domain={}",
                    draft.is_alias, draft.dest_domain
                );
                Ok((true, self.read_back_forwarding(&draft)?))
            }
            Some(existing) if forwarding_needs_update(&existing, &draft) => {
                self.forwardings.update_forwarding(&draft)?;
                info!(
                    "event=forwarding_upsert module=service status=ok action=update is_alias={} dest_domain={}",
                    draft.is_alias, draft.dest_domain
                );
                Ok((true, self.read_back_forwarding(&draft)?))
            }
            Some(existing) => {
                debug!(
                    "event=forwarding_upsert module=service status=ok action=noop dest_domain={}",
                    existing.dest_domain
                );
                Ok((false, existing))
            }
        }
    }

    /// Deletes rows for `src`.
    ///
    /// Without destination both the alias and every forwarding from `src`
    /// are deleted; both statements always run. With destination only that
    /// one pair is deleted.
    pub fn delete(&self, src: &Address, dest: Option<&Address>) -> RepoResult<bool> {
        let changed = match dest {
            Some(dest) => {
                self.forwardings
                    .delete_forwarding(&src.address, &dest.address)?
                    > 0
            }
            None => {
                let aliases_deleted = self.aliases.delete_alias(&src.address)?;
                let forwardings_deleted = self.forwardings.delete_forwardings_from(&src.address)?;
                aliases_deleted > 0 || forwardings_deleted > 0
            }
        };

        info!(
            "event=address_delete module=service status=ok scope={} changed={} domain={}",
            if dest.is_some() { "pair" } else { "all" },
            changed,
            src.domain
        );
        Ok(changed)
    }

    fn read_back_alias(&self, address: &str) -> RepoResult<AliasRow> {
        self.aliases.get_alias(address)?.ok_or_else(|| {
            RepoError::InvalidData("alias row missing in read-back after write".to_string())
        })
    }

    fn read_back_forwarding(&self, draft: &ForwardingDraft) -> RepoResult<ForwardingRow> {
        self.forwardings
            .get_forwarding(&draft.address, &draft.forwarding)?
            .ok_or_else(|| {
                RepoError::InvalidData(
                    "forwarding row missing in read-back after write".to_string(),
                )
            })
    }
}

/// Returns whether any supplied alias field differs from the stored row.
///
/// `name` and `expired` only count when supplied; `active` always counts.
pub fn alias_needs_update(existing: &AliasRow, request: &AddressRequest) -> bool {
    let name_differs = request
        .name
        .as_ref()
        .is_some_and(|name| *name != existing.name);
    let expired_differs = request
        .expired
        .as_ref()
        .is_some_and(|expired| *expired != existing.expired);

    name_differs || expired_differs || existing.active != request.active
}

/// Returns whether the stored forwarding must be rewritten to `draft`.
///
/// The forwarding flag is stale when it equals the desired alias flag, which
/// also catches rows where both flags are set or both are cleared.
pub fn forwarding_needs_update(existing: &ForwardingRow, draft: &ForwardingDraft) -> bool {
    existing.active != draft.active
        || existing.domain != draft.domain
        || existing.dest_domain != draft.dest_domain
        || existing.is_alias != draft.is_alias
        || existing.is_forwarding == draft.is_alias
}

/// Parses addresses and `expired` and bounds `connect_timeout`. Performs no I/O.
pub fn validate_args(args: &AddressArgs) -> ServiceResult<AddressRequest> {
    if args.connect_timeout > MAX_CONNECT_TIMEOUT_SECS {
        return Err(AddressServiceError::InvalidConnectTimeout(
            args.connect_timeout,
        ));
    }
    let src = parse_address(&args.src_address)?;
    let dest = parse_optional_address(args.dest_address.as_deref())?;
    let expired = args
        .expired
        .as_deref()
        .map(|value| {
            normalize_expired(value)
                .ok_or_else(|| AddressServiceError::InvalidExpired(value.to_string()))
        })
        .transpose()?;

    Ok(AddressRequest {
        src,
        dest,
        state: args.state,
        name: args.name.clone(),
        expired,
        active: args.active,
    })
}

/// Runs one reconcile inside a fresh transaction on `conn`.
///
/// # Contract
/// - `RunMode::Apply` commits; `RunMode::Check` always rolls back but still
///   reports the outcome a real run would produce.
/// - Any failure rolls back before the error is returned.
pub fn reconcile(
    conn: &mut Connection,
    request: &AddressRequest,
    mode: RunMode,
) -> ServiceResult<ReconcileOutcome> {
    let started_at = Instant::now();
    info!(
        "event=reconcile module=service status=start state={} mode={} has_dest={}",
        request.state.as_str(),
        mode.as_str(),
        request.dest.is_some()
    );

    let result = reconcile_in_transaction(conn, request, mode);

    match &result {
        Ok(outcome) => info!(
            "event=reconcile module=service status=ok state={} mode={} changed={} duration_ms={}",
            request.state.as_str(),
            mode.as_str(),
            outcome.changed,
            started_at.elapsed().as_millis()
        ),
        Err(err) => error!(
            "event=reconcile module=service status=error state={} mode={} duration_ms={} error={}",
            request.state.as_str(),
            mode.as_str(),
            started_at.elapsed().as_millis(),
            err
        ),
    }
    result
}

fn reconcile_in_transaction(
    conn: &mut Connection,
    request: &AddressRequest,
    mode: RunMode,
) -> ServiceResult<ReconcileOutcome> {
    let tx = conn
        .transaction()
        .map_err(|err| AddressServiceError::database(ReconcilePhase::Transaction, err))?;

    let applied = {
        let service = AddressService::new(
            SqliteAliasRepository::new(&tx),
            SqliteForwardingRepository::new(&tx),
        );
        service.apply(request)
    };

    match applied {
        Ok(outcome) => {
            finalize_transaction(tx, mode)?;
            Ok(outcome)
        }
        Err(err) => {
            if let Err(rollback_err) = tx.rollback() {
                warn!(
                    "event=transaction_finalize module=service status=error action=rollback error={}",
                    rollback_err
                );
            }
            Err(err)
        }
    }
}

fn finalize_transaction(tx: Transaction<'_>, mode: RunMode) -> ServiceResult<()> {
    let (action, result) = match mode {
        RunMode::Check => ("rollback", tx.rollback()),
        RunMode::Apply => ("commit", tx.commit()),
    };
    result.map_err(|err| AddressServiceError::database(ReconcilePhase::Transaction, err))?;

    info!(
        "event=transaction_finalize module=service status=ok mode={} action={}",
        mode.as_str(),
        action
    );
    Ok(())
}

/// Validates `args`, opens `args.login_db`, and reconciles.
///
/// Argument errors are returned before the database is opened.
pub fn run(args: &AddressArgs) -> ServiceResult<ReconcileOutcome> {
    let request = validate_args(args)?;

    let config = ConnectionConfig::new(
        args.login_db.clone(),
        Duration::from_secs(args.connect_timeout),
    );
    let mut conn = open_db(&config).map_err(|source| AddressServiceError::Connection {
        login_db: args.login_db.clone(),
        source,
    })?;

    reconcile(&mut conn, &request, RunMode::from_check_mode(args.check_mode))
}

#[cfg(test)]
mod tests {
    use super::{
        alias_needs_update, forwarding_needs_update, validate_args, AddressServiceError,
        MAX_CONNECT_TIMEOUT_SECS,
    };
    use crate::model::address::parse_address;
    use crate::model::alias::{AliasRow, NEVER_EXPIRES};
    use crate::model::forwarding::ForwardingRow;
    use crate::model::request::{AddressArgs, AddressRequest, AddressState};
    use crate::repo::forwarding_repo::ForwardingDraft;

    fn stored_alias() -> AliasRow {
        AliasRow {
            address: "foo@bar.baz".to_string(),
            name: "foo".to_string(),
            accesspolicy: String::new(),
            domain: "bar.baz".to_string(),
            created: "2024-01-21 02:07:52".to_string(),
            modified: "2024-01-21 02:07:52".to_string(),
            expired: NEVER_EXPIRES.to_string(),
            active: true,
        }
    }

    fn request() -> AddressRequest {
        AddressRequest {
            src: parse_address("foo@bar.baz").unwrap(),
            dest: None,
            state: AddressState::Alias,
            name: None,
            expired: None,
            active: true,
        }
    }

    fn stored_forwarding(is_alias: bool, is_forwarding: bool) -> ForwardingRow {
        ForwardingRow {
            id: 42,
            address: "foo@bar.baz".to_string(),
            forwarding: "boo@bar.baz".to_string(),
            domain: "bar.baz".to_string(),
            dest_domain: "bar.baz".to_string(),
            is_alias,
            is_forwarding,
            is_list: false,
            is_maillist: false,
            active: true,
        }
    }

    fn alias_draft() -> ForwardingDraft {
        ForwardingDraft {
            address: "foo@bar.baz".to_string(),
            forwarding: "boo@bar.baz".to_string(),
            domain: "bar.baz".to_string(),
            dest_domain: "bar.baz".to_string(),
            is_alias: true,
            active: true,
        }
    }

    #[test]
    fn alias_unspecified_fields_do_not_trigger_update() {
        assert!(!alias_needs_update(&stored_alias(), &request()));
    }

    #[test]
    fn alias_each_supplied_field_can_trigger_update() {
        let mut named = request();
        named.name = Some("Foo Bar".to_string());
        assert!(alias_needs_update(&stored_alias(), &named));

        let mut expiring = request();
        expiring.expired = Some("2030-01-01 00:00:00".to_string());
        assert!(alias_needs_update(&stored_alias(), &expiring));

        let mut inactive = request();
        inactive.active = false;
        assert!(alias_needs_update(&stored_alias(), &inactive));

        let mut same = request();
        same.name = Some("foo".to_string());
        same.expired = Some(NEVER_EXPIRES.to_string());
        assert!(!alias_needs_update(&stored_alias(), &same));
    }

    #[test]
    fn forwarding_consistent_row_is_not_stale() {
        assert!(!forwarding_needs_update(
            &stored_forwarding(true, false),
            &alias_draft()
        ));
    }

    #[test]
    fn forwarding_flag_drift_is_stale() {
        // Both set: alias flag matches but forwarding flag equals is_alias.
        assert!(forwarding_needs_update(
            &stored_forwarding(true, true),
            &alias_draft()
        ));
        assert!(forwarding_needs_update(
            &stored_forwarding(false, false),
            &alias_draft()
        ));
        assert!(forwarding_needs_update(
            &stored_forwarding(false, true),
            &alias_draft()
        ));
    }

    #[test]
    fn forwarding_domain_and_active_changes_are_stale() {
        let mut moved = stored_forwarding(true, false);
        moved.dest_domain = "old.example".to_string();
        assert!(forwarding_needs_update(&moved, &alias_draft()));

        let mut inactive = alias_draft();
        inactive.active = false;
        assert!(forwarding_needs_update(
            &stored_forwarding(true, false),
            &inactive
        ));
    }

    #[test]
    fn validate_rejects_bad_destination_and_expired() {
        let mut args = AddressArgs::new("foo@bar.baz");
        args.dest_address = Some("nobody".to_string());
        let err = validate_args(&args).unwrap_err();
        assert!(matches!(err, AddressServiceError::InvalidAddress(_)));

        let mut args = AddressArgs::new("foo@bar.baz");
        args.expired = Some("next week".to_string());
        let err = validate_args(&args).unwrap_err();
        assert!(matches!(err, AddressServiceError::InvalidExpired(value) if value == "next week"));

        let mut args = AddressArgs::new("foo@bar.baz");
        args.expired = Some("2030-02-30".to_string());
        let err = validate_args(&args).unwrap_err();
        assert!(matches!(err, AddressServiceError::InvalidExpired(value) if value == "2030-02-30"));
    }

    #[test]
    fn validate_bounds_connect_timeout() {
        let mut args = AddressArgs::new("foo@bar.baz");
        args.connect_timeout = MAX_CONNECT_TIMEOUT_SECS;
        assert!(validate_args(&args).is_ok());

        args.connect_timeout = MAX_CONNECT_TIMEOUT_SECS + 1;
        let err = validate_args(&args).unwrap_err();
        assert!(matches!(
            err,
            AddressServiceError::InvalidConnectTimeout(secs) if secs == MAX_CONNECT_TIMEOUT_SECS + 1
        ));

        args.connect_timeout = u64::MAX;
        assert!(matches!(
            validate_args(&args),
            Err(AddressServiceError::InvalidConnectTimeout(_))
        ));
    }

    #[test]
    fn validate_normalizes_expired() {
        let mut args = AddressArgs::new("foo@bar.baz");
        args.expired = Some("2030-06-01".to_string());
        let request = validate_args(&args).unwrap();
        assert_eq!(request.expired.as_deref(), Some("2030-06-01 00:00:00"));
        assert_eq!(request.src.domain, "bar.baz");
        assert!(request.dest.is_none());
    }
}
