//! Receipt lifecycle types
//!
//! A receipt is created once as `pending`, then only the sync worker moves
//! it through `syncing` to `synced`, or to `failed` when it is promoted into
//! the dead-letter store.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::hlc::HybridTimestamp;
use crate::impl_domain_status_conversions;

/// Opaque fiscal document payload
///
/// The core never inspects its structure; validation belongs to the
/// regulatory layer that produced it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct FiscalDocument(serde_json::Value);

impl FiscalDocument {
    pub fn new(value: serde_json::Value) -> Self {
        Self(value)
    }

    pub fn as_value(&self) -> &serde_json::Value {
        &self.0
    }

    pub fn into_value(self) -> serde_json::Value {
        self.0
    }

    /// Canonical JSON text used for persistence
    pub fn to_json(&self) -> String {
        self.0.to_string()
    }

    /// Parse a persisted payload
    pub fn from_json(raw: &str) -> serde_json::Result<Self> {
        serde_json::from_str(raw).map(Self)
    }
}

impl From<serde_json::Value> for FiscalDocument {
    fn from(value: serde_json::Value) -> Self {
        Self(value)
    }
}

/// Receipt lifecycle status
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ReceiptStatus {
    /// Durably captured, waiting for the operator
    Pending,
    /// Claimed by a drain cycle, remote call in flight
    Syncing,
    /// Acknowledged by the operator
    Synced,
    /// Promoted to the dead-letter store
    Failed,
}

impl_domain_status_conversions!(ReceiptStatus {
    Pending => "pending",
    Syncing => "syncing",
    Synced => "synced",
    Failed => "failed",
});

impl ReceiptStatus {
    /// Whether the receipt still occupies buffer capacity
    pub fn is_unsynced(self) -> bool {
        matches!(self, Self::Pending | Self::Syncing)
    }

    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Synced | Self::Failed)
    }
}

/// A legally significant sale record held by the durable buffer
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Receipt {
    pub id: Uuid,
    pub pos_id: String,
    pub created_at: DateTime<Utc>,
    pub hlc: HybridTimestamp,
    pub fiscal_doc: FiscalDocument,
    pub status: ReceiptStatus,
    pub retry_count: u32,
    pub last_error: Option<String>,
    pub synced_at: Option<DateTime<Utc>>,
}

impl Receipt {
    /// New pending receipt with a time-ordered id
    pub fn new_pending(
        pos_id: impl Into<String>,
        fiscal_doc: FiscalDocument,
        hlc: HybridTimestamp,
        created_at: DateTime<Utc>,
    ) -> Self {
        Self {
            id: Uuid::now_v7(),
            pos_id: pos_id.into(),
            created_at,
            hlc,
            fiscal_doc,
            status: ReceiptStatus::Pending,
            retry_count: 0,
            last_error: None,
            synced_at: None,
        }
    }

    /// `synced` implies both the server time and the sync time are recorded
    pub fn is_consistent(&self) -> bool {
        self.status != ReceiptStatus::Synced
            || (self.hlc.server_time.is_some() && self.synced_at.is_some())
    }
}

/// Terminal record of a receipt that exhausted its retries
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DeadLetterEntry {
    pub original_receipt_id: Uuid,
    pub pos_id: String,
    pub failed_at: DateTime<Utc>,
    pub reason: String,
    pub fiscal_doc: FiscalDocument,
    pub retry_attempts: u32,
    pub last_error: Option<String>,
}

/// Kinds of audited state transitions
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AuditEventType {
    Created,
    Synced,
    RetryFailed,
    DeadLettered,
    Recovered,
}

impl_domain_status_conversions!(AuditEventType {
    Created => "created",
    Synced => "synced",
    RetryFailed => "retry_failed",
    DeadLettered => "dead_lettered",
    Recovered => "recovered",
});

/// Append-only audit record
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AuditEvent {
    pub id: i64,
    pub event_type: AuditEventType,
    pub receipt_id: Uuid,
    pub timestamp: DateTime<Utc>,
    pub metadata: serde_json::Value,
}

/// Derived view of the buffer, computed on demand
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BufferStatus {
    pub total: u64,
    pub pending: u64,
    pub syncing: u64,
    pub synced: u64,
    pub failed: u64,
    pub dead_letter_count: u64,
    pub capacity: u32,
    pub percent_full: f64,
}

impl BufferStatus {
    /// Build a status from per-state counts
    ///
    /// Fullness counts the receipts that occupy capacity (pending + syncing).
    #[allow(clippy::cast_precision_loss)]
    pub fn from_counts(
        pending: u64,
        syncing: u64,
        synced: u64,
        failed: u64,
        dead_letter_count: u64,
        capacity: u32,
    ) -> Self {
        let occupied = pending + syncing;
        let percent_full = if capacity == 0 {
            100.0
        } else {
            (occupied as f64 / f64::from(capacity)) * 100.0
        };

        Self {
            total: pending + syncing + synced + failed,
            pending,
            syncing,
            synced,
            failed,
            dead_letter_count,
            capacity,
            percent_full,
        }
    }

    /// Receipts currently counted against capacity
    pub fn occupied(&self) -> u64 {
        self.pending + self.syncing
    }
}
