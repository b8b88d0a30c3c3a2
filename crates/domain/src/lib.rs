//! # FiscalSync Domain
//!
//! Data model for the offline-first fiscalization core.
//!
//! This crate contains:
//! - Receipt lifecycle types (Receipt, DeadLetterEntry, AuditEvent, ...)
//! - The hybrid logical timestamp and its causal ordering
//! - The `FiscalError` taxonomy and Result alias
//! - Configuration structures and their defaults
//!
//! ## Architecture
//! - Depends only on `fiscalsync-common` for error classification
//! - No I/O, no async, no storage

pub mod config;
pub mod constants;
pub mod errors;
pub mod macros;
pub mod types;

// Re-export commonly used items
pub use config::*;
pub use errors::*;
pub use types::*;
