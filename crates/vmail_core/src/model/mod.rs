//! Domain model for `vmail` alias and forwarding rows.
//!
//! # Responsibility
//! - Define typed records for the two managed tables.
//! - Define address parsing and the request/outcome shapes of one run.
//!
//! # Invariants
//! - Rows are plain data; all SQL lives in `repo`.

pub mod address;
pub mod alias;
pub mod forwarding;
pub mod request;
