//! Configuration loading
//!
//! Loads [`fiscalsync_domain::Config`] from the environment or a config file.

pub mod loader;

// Re-export commonly used items
pub use loader::{load, load_from_env, load_from_file, probe_config_paths};
