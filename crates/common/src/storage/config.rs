//! SQLite connection pool configuration

use std::fmt;
use std::time::Duration;

/// SQLite `synchronous` pragma levels
///
/// `Full` forces an fsync at every commit, so a committed transaction
/// survives power loss. `Normal` is only crash-safe for the application,
/// not for the operating system.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SynchronousMode {
    /// fsync only at critical moments
    Normal,
    /// fsync every commit before returning
    #[default]
    Full,
    /// FULL plus a directory sync in rollback-journal mode
    Extra,
}

impl SynchronousMode {
    /// Numeric value reported by `PRAGMA synchronous`
    pub fn pragma_value(self) -> i32 {
        match self {
            Self::Normal => 1,
            Self::Full => 2,
            Self::Extra => 3,
        }
    }
}

impl fmt::Display for SynchronousMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Normal => write!(f, "NORMAL"),
            Self::Full => write!(f, "FULL"),
            Self::Extra => write!(f, "EXTRA"),
        }
    }
}

/// SQLite pool configuration
///
/// Durable defaults: WAL journal, `synchronous=FULL`, foreign keys on.
#[derive(Debug, Clone)]
pub struct SqlitePoolConfig {
    /// Maximum number of connections in the pool
    pub max_size: u32,

    /// How long to wait for a free connection
    pub connection_timeout: Duration,

    /// Busy timeout for SQLite operations
    pub busy_timeout: Duration,

    /// Enable WAL journal mode
    pub enable_wal: bool,

    /// Enable foreign key constraints
    pub enable_foreign_keys: bool,

    /// Commit durability level
    pub synchronous: SynchronousMode,
}

impl Default for SqlitePoolConfig {
    fn default() -> Self {
        Self {
            max_size: 8,
            connection_timeout: Duration::from_secs(5),
            busy_timeout: Duration::from_millis(5000),
            enable_wal: true,
            enable_foreign_keys: true,
            synchronous: SynchronousMode::Full,
        }
    }
}

impl SqlitePoolConfig {
    /// Override the pool size, keeping at least one connection
    pub fn with_max_size(mut self, max_size: u32) -> Self {
        self.max_size = max_size.max(1);
        self
    }

    /// Override the busy timeout
    pub fn with_busy_timeout(mut self, busy_timeout: Duration) -> Self {
        self.busy_timeout = busy_timeout;
        self
    }
}
