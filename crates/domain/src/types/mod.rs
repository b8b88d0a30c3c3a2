//! Domain types and models

pub mod hlc;
pub mod operator;
pub mod receipt;

pub use hlc::HybridTimestamp;
pub use operator::{CreatedReceipt, OperatorAck, PrintConfirmation};
pub use receipt::{
    AuditEvent, AuditEventType, BufferStatus, DeadLetterEntry, FiscalDocument, Receipt,
    ReceiptStatus,
};
