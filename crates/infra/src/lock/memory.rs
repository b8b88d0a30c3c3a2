//! In-process lock store for single-instance deployments and tests

use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use fiscalsync_core::{LockStore, LockStoreError, LockToken};

#[derive(Debug, Clone)]
struct Lease {
    owner: String,
    fencing_token: u64,
    expires_at: chrono::DateTime<Utc>,
}

/// Leases held in a concurrent map; only coordinates tasks sharing this value
#[derive(Debug, Default)]
pub struct InProcessLockStore {
    leases: DashMap<String, Lease>,
    offline: AtomicBool,
}

impl InProcessLockStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make every call fail as unreachable until switched back
    pub fn set_offline(&self, offline: bool) {
        self.offline.store(offline, Ordering::SeqCst);
    }

    fn check_online(&self) -> Result<(), LockStoreError> {
        if self.offline.load(Ordering::SeqCst) {
            return Err(LockStoreError::Unreachable("in-process store offline".to_string()));
        }
        Ok(())
    }
}

#[async_trait]
impl LockStore for InProcessLockStore {
    async fn try_acquire(
        &self,
        resource: &str,
        owner: &str,
        ttl: Duration,
    ) -> Result<Option<LockToken>, LockStoreError> {
        self.check_online()?;
        let now = Utc::now();
        let expires_at = now
            + chrono::Duration::from_std(ttl)
                .map_err(|e| LockStoreError::Unreachable(format!("invalid ttl: {e}")))?;

        let lease = match self.leases.entry(resource.to_string()) {
            Entry::Vacant(slot) => slot
                .insert(Lease { owner: owner.to_string(), fencing_token: 1, expires_at })
                .clone(),
            Entry::Occupied(mut slot) => {
                let current = slot.get_mut();
                if current.owner == owner {
                    current.expires_at = expires_at;
                } else if current.expires_at <= now {
                    current.owner = owner.to_string();
                    current.fencing_token += 1;
                    current.expires_at = expires_at;
                } else {
                    return Ok(None);
                }
                current.clone()
            }
        };

        Ok(Some(LockToken {
            resource: resource.to_string(),
            owner: lease.owner,
            fencing_token: lease.fencing_token,
            expires_at: lease.expires_at,
        }))
    }

    async fn release(&self, token: &LockToken) -> Result<bool, LockStoreError> {
        self.check_online()?;
        let Some(mut lease) = self.leases.get_mut(&token.resource) else {
            return Ok(false);
        };
        if lease.owner != token.owner || lease.fencing_token != token.fencing_token {
            return Ok(false);
        }
        // Keep the entry so the next holder gets a higher fencing token
        lease.owner.clear();
        lease.expires_at = chrono::DateTime::<Utc>::UNIX_EPOCH;
        Ok(true)
    }

    fn backend(&self) -> &'static str {
        "in_process"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const TTL: Duration = Duration::from_secs(30);

    #[tokio::test]
    async fn release_hands_over_with_higher_fence() {
        let store = InProcessLockStore::new();
        let a = store.try_acquire("drain", "a", TTL).await.unwrap().unwrap();
        assert!(store.try_acquire("drain", "b", TTL).await.unwrap().is_none());

        assert!(store.release(&a).await.unwrap());
        let b = store.try_acquire("drain", "b", TTL).await.unwrap().unwrap();
        assert!(b.fencing_token > a.fencing_token);
        assert!(!store.release(&a).await.unwrap());
    }

    #[tokio::test]
    async fn offline_store_reports_unreachable() {
        let store = InProcessLockStore::new();
        store.set_offline(true);
        assert!(matches!(
            store.try_acquire("drain", "a", TTL).await,
            Err(LockStoreError::Unreachable(_))
        ));
    }
}
