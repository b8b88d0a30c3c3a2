//! Port interfaces for the external fiscal collaborators

use async_trait::async_trait;
use fiscalsync_domain::{FiscalDocument, OperatorAck, PrintConfirmation, RemoteError, Result};

/// Client for the remote fiscal operator
///
/// Transport, authentication and wire format are the implementor's concern.
/// An `OperatorAck` with `accepted == false` is treated as a failed call.
#[async_trait]
pub trait FiscalOperatorClient: Send + Sync {
    /// Submit one fiscal document
    async fn send(&self, fiscal_doc: &FiscalDocument) -> std::result::Result<OperatorAck, RemoteError>;
}

/// Local print device
#[async_trait]
pub trait PrintDevice: Send + Sync {
    /// Print the document and confirm
    async fn print(&self, fiscal_doc: &FiscalDocument) -> Result<PrintConfirmation>;
}
