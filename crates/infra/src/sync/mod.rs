//! Phase 2: draining the buffer to the fiscal operator

pub mod drain;
pub mod worker;

pub use drain::{DrainCycle, DrainLock, DrainReport, DrainSettings};
pub use worker::{SyncWorker, SyncWorkerConfig, WorkerHealth};
