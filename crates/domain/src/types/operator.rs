//! Values exchanged with external collaborators
//!
//! The fiscal operator and the print device are outside the core; these are
//! the only shapes the core relies on.

use chrono::{DateTime, TimeZone, Utc};
use serde::{Deserialize, Serialize};

/// Acknowledgement returned by the remote fiscal operator
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct OperatorAck {
    /// Operator-assigned seconds since the Unix epoch
    pub server_time: i64,
    /// Whether the operator accepted the document
    pub accepted: bool,
}

impl OperatorAck {
    pub fn accepted(server_time: i64) -> Self {
        Self { server_time, accepted: true }
    }

    /// `server_time` as a UTC timestamp, if representable
    pub fn server_datetime(&self) -> Option<DateTime<Utc>> {
        Utc.timestamp_opt(self.server_time, 0).single()
    }
}

/// Local print device confirmation
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PrintConfirmation {
    pub printed_at: DateTime<Utc>,
    /// Device-specific reference (fiscal memory number, job id, ...)
    pub reference: Option<String>,
}

/// Result of the Phase 1 create operation
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CreatedReceipt {
    pub receipt_id: uuid::Uuid,
    /// `None` when printing failed; the receipt is durable either way
    pub print: Option<PrintConfirmation>,
}
