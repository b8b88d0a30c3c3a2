//! SQLite persistence for the receipt buffer

pub mod manager;
pub mod receipt_buffer;

pub use manager::DbManager;
pub use receipt_buffer::SqliteReceiptBuffer;
