//! Storage primitives for durable local databases
//!
//! This module provides generic SQLite infrastructure: an r2d2 connection
//! pool whose every connection is configured for crash durability, a thin
//! connection wrapper, and shared storage error/metric types.

pub mod config;
pub mod connection;
pub mod error;
pub mod metrics;
pub mod pool;
pub mod pragmas;
pub mod types;

// Re-export commonly used types
pub use config::{SqlitePoolConfig, SynchronousMode};
pub use connection::{SqliteConnection, SqliteStatement};
pub use error::{StorageError, StorageResult};
pub use metrics::StorageMetrics;
pub use pool::SqlitePool;
pub use pragmas::apply_connection_pragmas;
pub use types::{HealthStatus, PoolMetrics};
