//! Core use-case services.
//!
//! # Responsibility
//! - Orchestrate repository calls into the reconcile use case.
//! - Own transaction lifecycle; repositories never do.

pub mod address_service;
