//! Infrastructure error conversions

mod conversions;

pub use conversions::{map_join_error, map_storage_error, InfraError};
pub(crate) use conversions::{postgres_to_lock_error, storage_to_lock_error};
