//! # FiscalSync Infrastructure
//!
//! Adapters for the ports defined in `fiscalsync-core`, plus the runtime
//! that wires them together.
//!
//! This crate contains:
//! - The SQLite durable receipt buffer
//! - Lock stores (SQLite, PostgreSQL, in-process)
//! - The drain cycle and the background sync worker
//! - Configuration loading, tracing setup and sync metrics
//!
//! ## Architecture
//! - Implements traits defined in `fiscalsync-core`
//! - Contains all "impure" code (disk, network, timers)

pub mod config;
pub mod database;
pub mod errors;
pub mod lock;
pub mod observability;
pub mod runtime;
pub mod sync;

pub use database::{DbManager, SqliteReceiptBuffer};
pub use errors::InfraError;
pub use lock::{build_lock_store, InProcessLockStore, PostgresLockStore, SqliteLockStore};
pub use observability::{init_tracing, SyncMetrics};
pub use runtime::{FiscalRuntime, RuntimeHealth};
pub use sync::{DrainCycle, DrainReport, SyncWorker, SyncWorkerConfig, WorkerHealth};
