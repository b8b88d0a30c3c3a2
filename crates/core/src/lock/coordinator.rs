//! Drain lock with an explicit degraded-mode policy

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use fiscalsync_domain::{FiscalError, LockUnavailablePolicy, Result};
use tracing::{debug, warn};

use super::ports::{LockStore, LockStoreError, LockToken};

const DEFAULT_ACQUIRE_TIMEOUT: Duration = Duration::from_secs(5);

/// Result of one acquisition attempt
#[derive(Debug)]
pub enum LockAcquisition {
    /// This instance holds the lease
    Acquired(LockGuard),
    /// Another instance holds an unexpired lease
    Held,
    /// Store unreachable and policy allows running without the lock
    Uncoordinated,
}

impl LockAcquisition {
    /// Whether the caller may proceed with the drain
    pub fn may_proceed(&self) -> bool {
        !matches!(self, Self::Held)
    }
}

/// Cross-instance mutual exclusion for one named resource
///
/// When the store cannot be reached the configured
/// [`LockUnavailablePolicy`] decides: `BlockSync` surfaces
/// `FiscalError::LockUnavailable`, `ProceedUncoordinated` returns
/// [`LockAcquisition::Uncoordinated`]. Both are logged at `warn`.
pub struct DistributedLock {
    store: Arc<dyn LockStore>,
    resource: String,
    owner: String,
    ttl: Duration,
    policy: LockUnavailablePolicy,
    acquire_timeout: Duration,
}

impl std::fmt::Debug for DistributedLock {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DistributedLock")
            .field("backend", &self.store.backend())
            .field("resource", &self.resource)
            .field("owner", &self.owner)
            .field("ttl", &self.ttl)
            .field("policy", &self.policy)
            .finish()
    }
}

impl DistributedLock {
    pub fn new(
        store: Arc<dyn LockStore>,
        resource: impl Into<String>,
        owner: impl Into<String>,
        ttl: Duration,
        policy: LockUnavailablePolicy,
    ) -> Self {
        Self {
            store,
            resource: resource.into(),
            owner: owner.into(),
            ttl,
            policy,
            acquire_timeout: DEFAULT_ACQUIRE_TIMEOUT,
        }
    }

    /// Bound on a single store round-trip; expiry counts as unreachable
    pub fn with_acquire_timeout(mut self, timeout: Duration) -> Self {
        self.acquire_timeout = timeout;
        self
    }

    pub fn resource(&self) -> &str {
        &self.resource
    }

    pub fn owner(&self) -> &str {
        &self.owner
    }

    pub fn policy(&self) -> LockUnavailablePolicy {
        self.policy
    }

    pub fn backend(&self) -> &'static str {
        self.store.backend()
    }

    /// Try once, without waiting for a held lease
    pub async fn acquire(&self) -> Result<LockAcquisition> {
        let attempt = bounded(
            self.acquire_timeout,
            self.store.try_acquire(&self.resource, &self.owner, self.ttl),
        )
        .await;

        match attempt {
            Ok(Some(token)) => {
                debug!(
                    backend = self.store.backend(),
                    resource = %self.resource,
                    owner = %self.owner,
                    fencing_token = token.fencing_token,
                    "lock.acquired"
                );
                Ok(LockAcquisition::Acquired(LockGuard {
                    store: Arc::clone(&self.store),
                    token,
                    ttl: self.ttl,
                    call_timeout: self.acquire_timeout,
                    released: false,
                }))
            }
            Ok(None) => {
                debug!(resource = %self.resource, owner = %self.owner, "lock.held_elsewhere");
                Ok(LockAcquisition::Held)
            }
            Err(LockStoreError::Unreachable(reason)) => match self.policy {
                LockUnavailablePolicy::BlockSync => {
                    warn!(
                        backend = self.store.backend(),
                        resource = %self.resource,
                        policy = %self.policy,
                        reason = %reason,
                        "lock.unavailable_blocking_sync"
                    );
                    Err(FiscalError::LockUnavailable(reason))
                }
                LockUnavailablePolicy::ProceedUncoordinated => {
                    warn!(
                        backend = self.store.backend(),
                        resource = %self.resource,
                        policy = %self.policy,
                        reason = %reason,
                        "lock.unavailable_proceeding_uncoordinated"
                    );
                    Ok(LockAcquisition::Uncoordinated)
                }
            },
        }
    }
}

/// A held lease
///
/// Prefer [`LockGuard::release`]. Dropping an unreleased guard spawns a
/// best-effort release on the current runtime; without one the lease simply
/// expires after its TTL.
pub struct LockGuard {
    store: Arc<dyn LockStore>,
    token: LockToken,
    ttl: Duration,
    call_timeout: Duration,
    released: bool,
}

impl std::fmt::Debug for LockGuard {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LockGuard").field("token", &self.token).finish()
    }
}

impl LockGuard {
    pub fn token(&self) -> &LockToken {
        &self.token
    }

    pub fn fencing_token(&self) -> u64 {
        self.token.fencing_token
    }

    /// Extend the lease once less than half the TTL remains
    ///
    /// Returns `false` when the lease is lost (expired and taken, or the
    /// store is unreachable); the holder must stop mutating shared state.
    /// A store that does not answer within the acquire timeout counts as
    /// unreachable.
    pub async fn ensure_held(&mut self) -> bool {
        let now = Utc::now();
        if self.token.remaining(now) > self.ttl / 2 {
            return true;
        }

        let renewal = self.store.try_acquire(&self.token.resource, &self.token.owner, self.ttl);
        match bounded(self.call_timeout, renewal).await {
            Ok(Some(token)) if token.fencing_token == self.token.fencing_token => {
                debug!(
                    resource = %token.resource,
                    fencing_token = token.fencing_token,
                    "lock.renewed"
                );
                self.token = token;
                true
            }
            Ok(Some(token)) => {
                warn!(
                    resource = %token.resource,
                    previous_token = self.token.fencing_token,
                    fencing_token = token.fencing_token,
                    "lock.reacquired_after_expiry"
                );
                self.token = token;
                true
            }
            Ok(None) => {
                warn!(resource = %self.token.resource, "lock.lost");
                false
            }
            Err(err) => {
                warn!(resource = %self.token.resource, error = %err, "lock.renew_failed");
                !self.token.is_expired_at(Utc::now())
            }
        }
    }

    /// Release the lease; `false` if it was no longer ours
    pub async fn release(mut self) -> bool {
        self.released = true;
        match bounded(self.call_timeout, self.store.release(&self.token)).await {
            Ok(released) => {
                debug!(
                    resource = %self.token.resource,
                    fencing_token = self.token.fencing_token,
                    released,
                    "lock.released"
                );
                released
            }
            Err(err) => {
                warn!(resource = %self.token.resource, error = %err, "lock.release_failed");
                false
            }
        }
    }
}

impl Drop for LockGuard {
    fn drop(&mut self) {
        if self.released {
            return;
        }

        let Ok(handle) = tokio::runtime::Handle::try_current() else {
            debug!(resource = %self.token.resource, "lock.dropped_without_runtime");
            return;
        };
        let store = Arc::clone(&self.store);
        let token = self.token.clone();
        let call_timeout = self.call_timeout;
        handle.spawn(async move {
            if let Err(err) = bounded(call_timeout, store.release(&token)).await {
                debug!(resource = %token.resource, error = %err, "lock.release_on_drop_failed");
            }
        });
    }
}

/// Await one store round-trip; no answer in time is `Unreachable`
async fn bounded<T>(
    limit: Duration,
    call: impl std::future::Future<Output = std::result::Result<T, LockStoreError>>,
) -> std::result::Result<T, LockStoreError> {
    tokio::time::timeout(limit, call).await.unwrap_or_else(|_| {
        Err(LockStoreError::Unreachable(format!("no answer within {}ms", limit.as_millis())))
    })
}
