//! Phase 1 fiscalization: capture, persist, print

pub mod ports;
pub mod service;

pub use ports::{FiscalOperatorClient, PrintDevice};
pub use service::{FiscalizationService, HealthReport};
