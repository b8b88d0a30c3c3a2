//! Port interface for the coordination store behind the drain lock

use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Proof of a held lease
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LockToken {
    pub resource: String,
    pub owner: String,
    /// Increases every time the lease changes hands
    pub fencing_token: u64,
    pub expires_at: DateTime<Utc>,
}

impl LockToken {
    pub fn is_expired_at(&self, now: DateTime<Utc>) -> bool {
        now >= self.expires_at
    }

    /// Time left on the lease, zero once expired
    pub fn remaining(&self, now: DateTime<Utc>) -> Duration {
        (self.expires_at - now).to_std().unwrap_or(Duration::ZERO)
    }
}

/// Failures talking to the lock store
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum LockStoreError {
    /// The store could not be reached or did not answer
    #[error("lock store unreachable: {0}")]
    Unreachable(String),
}

/// Atomic set-if-absent with expiry
///
/// `try_acquire` succeeds when the resource is free, its lease has expired,
/// or it is already held by `owner` (which extends the lease and keeps the
/// fencing token).
#[async_trait]
pub trait LockStore: Send + Sync {
    async fn try_acquire(
        &self,
        resource: &str,
        owner: &str,
        ttl: Duration,
    ) -> Result<Option<LockToken>, LockStoreError>;

    /// Release if still held by the token's owner; `false` if it was not
    async fn release(&self, token: &LockToken) -> Result<bool, LockStoreError>;

    /// Short backend name for logs and health output
    fn backend(&self) -> &'static str;
}
