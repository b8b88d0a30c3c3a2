//! Distributed drain lock

pub mod coordinator;
pub mod ports;

pub use coordinator::{DistributedLock, LockAcquisition, LockGuard};
pub use ports::{LockStore, LockStoreError, LockToken};
