//! Port interface for the durable receipt buffer

use async_trait::async_trait;
use fiscalsync_domain::{
    AuditEvent, BufferStatus, DeadLetterEntry, FiscalDocument, Receipt, Result,
};
use uuid::Uuid;

/// Exclusive, crash-durable store for receipts, dead letters and the audit log
///
/// Every mutating call is committed and flushed before it returns. Updates
/// addressed to an unknown id are no-ops reported through the return value,
/// never errors.
#[async_trait]
pub trait ReceiptBuffer: Send + Sync {
    // Phase 1
    /// Stamp and persist a new pending receipt
    ///
    /// Fails with `CapacityExceeded` when the unsynced count has reached the
    /// configured capacity. Identical documents are not deduplicated.
    async fn insert(&self, pos_id: &str, fiscal_doc: &FiscalDocument) -> Result<Uuid>;

    // Reads
    /// Pending receipts ordered by `(coalesce(server_time, local_time), logical_counter)`
    async fn get_pending(&self, limit: usize) -> Result<Vec<Receipt>>;

    /// Fetch one receipt in any state
    async fn get_receipt(&self, id: Uuid) -> Result<Option<Receipt>>;

    /// Aggregate counts computed on demand
    async fn status(&self) -> Result<BufferStatus>;

    // Phase 2 transitions
    /// `pending -> syncing` before the remote call
    async fn mark_syncing(&self, id: Uuid) -> Result<bool>;

    /// `syncing -> pending` when the call never reached the operator
    ///
    /// Leaves the retry counter untouched.
    async fn return_to_pending(&self, id: Uuid) -> Result<bool>;

    /// `pending|syncing -> synced`, attaching the operator's server time
    async fn mark_synced(&self, id: Uuid, server_time: i64) -> Result<bool>;

    /// Bump the retry counter and return the receipt to `pending`
    ///
    /// Returns the new count, or `None` for an unknown or terminal receipt.
    async fn increment_retry(&self, id: Uuid, error: &str) -> Result<Option<u32>>;

    /// Snapshot into the dead-letter store and mark `failed`, atomically
    async fn move_to_dead_letter(&self, id: Uuid, reason: &str) -> Result<bool>;

    /// Return receipts left `syncing` by an interrupted drain to `pending`
    async fn recover_in_flight(&self) -> Result<u64>;

    // Forensics
    /// Most recent dead-letter entries first
    async fn dead_letters(&self, limit: usize) -> Result<Vec<DeadLetterEntry>>;

    /// Audit events for one receipt in insertion order
    async fn audit_trail(&self, receipt_id: Uuid) -> Result<Vec<AuditEvent>>;
}
