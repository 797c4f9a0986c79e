//! Binary module entry point.
//!
//! # Responsibility
//! - Read the JSON argument document named by the first CLI argument.
//! - Run one reconcile and print the JSON result document on stdout.
//!
//! # Invariants
//! - stdout carries exactly one JSON document per run.
//! - Failures print `{"failed": true, "msg": ...}` and exit with status 1.

use serde_json::{json, Value};
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use vmail_core::{AddressArgs, LogLevel, ReconcileOutcome};

const LOG_DIR_ENV: &str = "VMAIL_LOG_DIR";
const LOG_LEVEL_ENV: &str = "VMAIL_LOG_LEVEL";

fn main() -> ExitCode {
    let Some(arg) = std::env::args().nth(1) else {
        return fail("usage: vmail_cli <args.json> | --version");
    };
    if arg == "--version" {
        println!("vmail_cli {}", vmail_core::core_version());
        return ExitCode::SUCCESS;
    }

    // Logging problems never block the run; the document on stdout matters more.
    if let Err(err) = init_logging_from_env() {
        eprintln!("logging disabled: {err}");
    }

    let args = match read_args(Path::new(&arg)) {
        Ok(args) => args,
        Err(msg) => return fail(&msg),
    };

    match vmail_core::run(&args) {
        Ok(outcome) => match outcome_document(&outcome) {
            Ok(document) => {
                println!("{document}");
                ExitCode::SUCCESS
            }
            Err(err) => fail(&format!("unable to serialize result: {err}")),
        },
        Err(err) => fail(&err.to_string()),
    }
}

fn init_logging_from_env() -> Result<(), String> {
    let Some(log_dir) = std::env::var_os(LOG_DIR_ENV) else {
        return Ok(());
    };
    let level = match std::env::var(LOG_LEVEL_ENV) {
        Ok(value) => LogLevel::parse(&value).map_err(|err| err.to_string())?,
        Err(_) => vmail_core::default_log_level(),
    };
    vmail_core::init_logging(level, &PathBuf::from(log_dir)).map_err(|err| err.to_string())
}

fn read_args(path: &Path) -> Result<AddressArgs, String> {
    let raw = std::fs::read_to_string(path)
        .map_err(|err| format!("unable to read arguments file `{}`: {err}", path.display()))?;
    serde_json::from_str(&raw).map_err(|err| format!("invalid arguments document: {err}"))
}

fn outcome_document(outcome: &ReconcileOutcome) -> serde_json::Result<Value> {
    Ok(json!({
        "changed": outcome.changed,
        "alias": row_or_empty(outcome.alias.as_ref())?,
        "forwarding": row_or_empty(outcome.forwarding.as_ref())?,
    }))
}

fn row_or_empty<T: serde::Serialize>(row: Option<&T>) -> serde_json::Result<Value> {
    match row {
        Some(row) => serde_json::to_value(row),
        None => Ok(json!({})),
    }
}

fn fail(msg: &str) -> ExitCode {
    log::error!("event=module_exit module=cli status=error");
    println!("{}", json!({ "failed": true, "msg": msg }));
    ExitCode::FAILURE
}
