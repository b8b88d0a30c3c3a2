//! Domain constants
//!
//! Defaults shared by configuration, storage and the sync worker.

// Buffer
pub const DEFAULT_BUFFER_CAPACITY: u32 = 200;

// Sync worker
pub const DEFAULT_SYNC_INTERVAL_SECS: u64 = 10;
pub const DEFAULT_SYNC_BATCH_SIZE: u32 = 50;
pub const DEFAULT_MAX_RETRIES: u32 = 20;
pub const DEFAULT_CALL_TIMEOUT_SECS: u64 = 10;
pub const DEFAULT_BACKOFF_INITIAL_MS: u64 = 1_000;
pub const DEFAULT_BACKOFF_MAX_MS: u64 = 60_000;
pub const DEFAULT_STOP_TIMEOUT_SECS: u64 = 15;

// Circuit breaker
pub const DEFAULT_FAILURE_THRESHOLD: u64 = 5;
pub const DEFAULT_RECOVERY_TIMEOUT_SECS: u64 = 60;
pub const DEFAULT_HALF_OPEN_SUCCESS_THRESHOLD: u64 = 2;

// Distributed lock
pub const DEFAULT_LOCK_RESOURCE: &str = "fiscal-drain";
pub const DEFAULT_LOCK_TTL_SECS: u64 = 30;

// Dead-letter reasons
pub const REASON_MAX_RETRIES_EXCEEDED: &str = "max_retries_exceeded";

// Breaker name used in logs and health output
pub const OPERATOR_BREAKER_NAME: &str = "fiscal-operator";
