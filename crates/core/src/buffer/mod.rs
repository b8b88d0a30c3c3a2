//! Durable receipt buffer

pub mod ports;

pub use ports::ReceiptBuffer;
