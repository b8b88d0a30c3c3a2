//! # FiscalSync Core
//!
//! Business logic of the two-phase fiscalization engine - no storage or
//! network code.
//!
//! This crate contains:
//! - The hybrid logical clock
//! - Port interfaces (traits) for the buffer, operator, printer and lock store
//! - The drain lock with its degraded-mode policy
//! - The Phase 1 fiscalization service
//!
//! ## Architecture Principles
//! - Depends on `fiscalsync-common` and `fiscalsync-domain` only
//! - All external dependencies via traits
//! - Clock and breaker are explicitly constructed and injected

pub mod buffer;
pub mod clock;
pub mod fiscalization;
pub mod lock;

pub use buffer::ReceiptBuffer;
pub use clock::{HybridLogicalClock, ManualWallClock, SystemWallClock, WallClock};
pub use fiscalization::{FiscalOperatorClient, FiscalizationService, HealthReport, PrintDevice};
pub use lock::{
    DistributedLock, LockAcquisition, LockGuard, LockStore, LockStoreError, LockToken,
};
