//! Configuration structures
//!
//! Every section carries `#[serde(default)]`, so a config file only needs
//! the keys it overrides.

use std::path::PathBuf;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::constants::{
    DEFAULT_BACKOFF_INITIAL_MS, DEFAULT_BACKOFF_MAX_MS, DEFAULT_BUFFER_CAPACITY,
    DEFAULT_CALL_TIMEOUT_SECS, DEFAULT_FAILURE_THRESHOLD, DEFAULT_HALF_OPEN_SUCCESS_THRESHOLD,
    DEFAULT_LOCK_RESOURCE, DEFAULT_LOCK_TTL_SECS, DEFAULT_MAX_RETRIES,
    DEFAULT_RECOVERY_TIMEOUT_SECS, DEFAULT_STOP_TIMEOUT_SECS, DEFAULT_SYNC_BATCH_SIZE,
    DEFAULT_SYNC_INTERVAL_SECS,
};
use crate::impl_domain_status_conversions;
use crate::{FiscalError, Result};

/// Top-level configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Identity of this adapter instance, used as the lock owner
    pub instance_id: String,
    pub database: DatabaseConfig,
    pub buffer: BufferConfig,
    pub sync: SyncConfig,
    pub circuit_breaker: BreakerConfig,
    pub lock: LockConfig,
    pub logging: LoggingConfig,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            instance_id: format!("fiscalsync-{}", uuid::Uuid::new_v4().simple()),
            database: DatabaseConfig::default(),
            buffer: BufferConfig::default(),
            sync: SyncConfig::default(),
            circuit_breaker: BreakerConfig::default(),
            lock: LockConfig::default(),
            logging: LoggingConfig::default(),
        }
    }
}

impl Config {
    /// Reject settings the core cannot run with
    pub fn validate(&self) -> Result<()> {
        fn invalid(field: &str, reason: &str) -> FiscalError {
            FiscalError::Config(format!("{field} {reason}"))
        }

        if self.instance_id.trim().is_empty() {
            return Err(invalid("instance_id", "must not be empty"));
        }
        if self.database.path.as_os_str().is_empty() {
            return Err(invalid("database.path", "must not be empty"));
        }
        if self.database.pool_size == 0 {
            return Err(invalid("database.pool_size", "must be greater than 0"));
        }
        if self.buffer.capacity == 0 {
            return Err(invalid("buffer.capacity", "must be greater than 0"));
        }
        if self.sync.batch_size == 0 {
            return Err(invalid("sync.batch_size", "must be greater than 0"));
        }
        if self.sync.max_retries == 0 {
            return Err(invalid("sync.max_retries", "must be greater than 0"));
        }
        if self.sync.interval_secs == 0 {
            return Err(invalid("sync.interval_secs", "must be greater than 0"));
        }
        if self.sync.call_timeout_secs == 0 {
            return Err(invalid("sync.call_timeout_secs", "must be greater than 0"));
        }
        if self.sync.backoff_max_ms < self.sync.backoff_initial_ms {
            return Err(invalid("sync.backoff_max_ms", "must be >= sync.backoff_initial_ms"));
        }
        if self.circuit_breaker.failure_threshold == 0 {
            return Err(invalid("circuit_breaker.failure_threshold", "must be greater than 0"));
        }
        if self.circuit_breaker.half_open_success_threshold == 0 {
            return Err(invalid(
                "circuit_breaker.half_open_success_threshold",
                "must be greater than 0",
            ));
        }
        if self.lock.ttl_secs == 0 {
            return Err(invalid("lock.ttl_secs", "must be greater than 0"));
        }
        if self.lock.resource.trim().is_empty() {
            return Err(invalid("lock.resource", "must not be empty"));
        }
        if self.lock.backend == LockBackend::Postgres
            && self.lock.postgres_url.as_deref().map_or(true, |url| url.trim().is_empty())
        {
            return Err(invalid("lock.postgres_url", "is required for the postgres backend"));
        }

        Ok(())
    }
}

/// SQLite database settings
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct DatabaseConfig {
    pub path: PathBuf,
    pub pool_size: u32,
    pub busy_timeout_ms: u64,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self { path: PathBuf::from("fiscalsync.db"), pool_size: 8, busy_timeout_ms: 5_000 }
    }
}

impl DatabaseConfig {
    pub fn busy_timeout(&self) -> Duration {
        Duration::from_millis(self.busy_timeout_ms)
    }
}

/// Durable buffer settings
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct BufferConfig {
    /// Maximum number of unsynced (pending + syncing) receipts
    pub capacity: u32,
}

impl Default for BufferConfig {
    fn default() -> Self {
        Self { capacity: DEFAULT_BUFFER_CAPACITY }
    }
}

/// Sync worker settings
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SyncConfig {
    pub enabled: bool,
    pub interval_secs: u64,
    pub batch_size: u32,
    pub max_retries: u32,
    pub call_timeout_secs: u64,
    pub backoff_initial_ms: u64,
    pub backoff_max_ms: u64,
    pub stop_timeout_secs: u64,
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            interval_secs: DEFAULT_SYNC_INTERVAL_SECS,
            batch_size: DEFAULT_SYNC_BATCH_SIZE,
            max_retries: DEFAULT_MAX_RETRIES,
            call_timeout_secs: DEFAULT_CALL_TIMEOUT_SECS,
            backoff_initial_ms: DEFAULT_BACKOFF_INITIAL_MS,
            backoff_max_ms: DEFAULT_BACKOFF_MAX_MS,
            stop_timeout_secs: DEFAULT_STOP_TIMEOUT_SECS,
        }
    }
}

impl SyncConfig {
    pub fn interval(&self) -> Duration {
        Duration::from_secs(self.interval_secs)
    }

    pub fn call_timeout(&self) -> Duration {
        Duration::from_secs(self.call_timeout_secs)
    }

    pub fn backoff_initial(&self) -> Duration {
        Duration::from_millis(self.backoff_initial_ms)
    }

    pub fn backoff_max(&self) -> Duration {
        Duration::from_millis(self.backoff_max_ms)
    }

    pub fn stop_timeout(&self) -> Duration {
        Duration::from_secs(self.stop_timeout_secs)
    }
}

/// Circuit breaker settings for the fiscal operator
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct BreakerConfig {
    pub failure_threshold: u64,
    pub recovery_timeout_secs: u64,
    pub half_open_success_threshold: u64,
}

impl Default for BreakerConfig {
    fn default() -> Self {
        Self {
            failure_threshold: DEFAULT_FAILURE_THRESHOLD,
            recovery_timeout_secs: DEFAULT_RECOVERY_TIMEOUT_SECS,
            half_open_success_threshold: DEFAULT_HALF_OPEN_SUCCESS_THRESHOLD,
        }
    }
}

impl BreakerConfig {
    pub fn recovery_timeout(&self) -> Duration {
        Duration::from_secs(self.recovery_timeout_secs)
    }
}

/// Where the cross-instance drain lock lives
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LockBackend {
    /// Row in the shared SQLite database (instances on one host)
    #[default]
    Sqlite,
    /// Row in a PostgreSQL database reachable by every instance
    Postgres,
    /// Single-process only; no cross-instance protection
    InProcess,
}

impl_domain_status_conversions!(LockBackend {
    Sqlite => "sqlite",
    Postgres => "postgres",
    InProcess => "in_process",
});

/// What a drain does when the lock store cannot be reached
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LockUnavailablePolicy {
    /// Skip the drain; receipts stay pending and durable
    #[default]
    BlockSync,
    /// Drain without coordination, accepting duplicate-submission risk
    ProceedUncoordinated,
}

impl_domain_status_conversions!(LockUnavailablePolicy {
    BlockSync => "block_sync",
    ProceedUncoordinated => "proceed_uncoordinated",
});

/// Distributed lock settings
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LockConfig {
    pub backend: LockBackend,
    pub resource: String,
    pub ttl_secs: u64,
    pub postgres_url: Option<String>,
    pub on_unavailable: LockUnavailablePolicy,
}

impl Default for LockConfig {
    fn default() -> Self {
        Self {
            backend: LockBackend::default(),
            resource: DEFAULT_LOCK_RESOURCE.to_string(),
            ttl_secs: DEFAULT_LOCK_TTL_SECS,
            postgres_url: None,
            on_unavailable: LockUnavailablePolicy::default(),
        }
    }
}

impl LockConfig {
    pub fn ttl(&self) -> Duration {
        Duration::from_secs(self.ttl_secs)
    }
}

/// Logging settings
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Default filter directive when `RUST_LOG` is unset
    pub level: String,
    /// Emit JSON lines instead of human-readable output
    pub json: bool,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self { level: "info".to_string(), json: false }
    }
}
