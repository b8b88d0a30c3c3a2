//! Configuration loader
//!
//! Loads configuration from environment variables or files.
//!
//! ## Loading Strategy
//! 1. Reads a `.env` file into the environment if one is present
//! 2. Attempts to load from environment variables
//! 3. If `FISCALSYNC_DB_PATH` is unset, falls back to loading from file
//! 4. Probes multiple paths for config files (JSON and TOML)
//! 5. Validates the result before returning it
//!
//! ## Environment Variables
//! - `FISCALSYNC_DB_PATH`: Database file path (required for env loading)
//! - `FISCALSYNC_DB_POOL_SIZE`: Connection pool size
//! - `FISCALSYNC_INSTANCE_ID`: Lock owner identity of this instance
//! - `FISCALSYNC_BUFFER_CAPACITY`: Maximum unsynced receipts
//! - `FISCALSYNC_SYNC_ENABLED`: Whether the background worker runs
//! - `FISCALSYNC_SYNC_INTERVAL`: Base drain interval in seconds
//! - `FISCALSYNC_SYNC_BATCH_SIZE`: Receipts per drain cycle
//! - `FISCALSYNC_SYNC_MAX_RETRIES`: Attempts before dead-lettering
//! - `FISCALSYNC_SYNC_CALL_TIMEOUT`: Per-call operator timeout in seconds
//! - `FISCALSYNC_BREAKER_FAILURE_THRESHOLD`: Failures that open the breaker
//! - `FISCALSYNC_BREAKER_RECOVERY_TIMEOUT`: Seconds before a half-open probe
//! - `FISCALSYNC_LOCK_BACKEND`: `sqlite`, `postgres` or `in_process`
//! - `FISCALSYNC_LOCK_POSTGRES_URL`: Connection string for the postgres backend
//! - `FISCALSYNC_LOCK_TTL`: Lease length in seconds
//! - `FISCALSYNC_LOCK_ON_UNAVAILABLE`: `block_sync` or `proceed_uncoordinated`
//! - `FISCALSYNC_LOG_LEVEL`: Default filter when `RUST_LOG` is unset
//! - `FISCALSYNC_LOG_JSON`: Emit JSON log lines (true/false)
//!
//! ## File Locations
//! The loader probes the following paths (in order):
//! 1. `./config.{json,toml}` and `./fiscalsync.{json,toml}`
//! 2. The same names one and two directories up
//! 3. The same names relative to the executable location

use std::path::{Path, PathBuf};
use std::str::FromStr;

use fiscalsync_domain::{Config, FiscalError, LockBackend, LockUnavailablePolicy, Result};

const ENV_PREFIX: &str = "FISCALSYNC_";

/// Load configuration with automatic fallback strategy
///
/// # Errors
/// Returns `FiscalError::Config` if no source yields a valid configuration.
pub fn load() -> Result<Config> {
    if let Ok(path) = dotenvy::dotenv() {
        tracing::debug!(path = %path.display(), "config.dotenv_loaded");
    }

    let config = match load_from_env() {
        Ok(config) => {
            tracing::info!("config.loaded_from_env");
            config
        }
        Err(e) => {
            tracing::debug!(error = %e, "config.env_incomplete_trying_file");
            load_from_file(None)?
        }
    };

    config.validate()?;
    Ok(config)
}

/// Load configuration from environment variables
///
/// Only `FISCALSYNC_DB_PATH` is required; everything else falls back to
/// [`Config::default`].
///
/// # Errors
/// Returns `FiscalError::Config` if the database path is missing or a
/// variable has an invalid value.
pub fn load_from_env() -> Result<Config> {
    let mut config = Config::default();

    config.database.path = PathBuf::from(env_var("DB_PATH")?);
    if let Some(pool_size) = env_parse("DB_POOL_SIZE")? {
        config.database.pool_size = pool_size;
    }
    if let Ok(instance_id) = env_var("INSTANCE_ID") {
        config.instance_id = instance_id;
    }

    if let Some(capacity) = env_parse("BUFFER_CAPACITY")? {
        config.buffer.capacity = capacity;
    }

    config.sync.enabled = env_bool("SYNC_ENABLED", config.sync.enabled);
    if let Some(interval) = env_parse("SYNC_INTERVAL")? {
        config.sync.interval_secs = interval;
    }
    if let Some(batch_size) = env_parse("SYNC_BATCH_SIZE")? {
        config.sync.batch_size = batch_size;
    }
    if let Some(max_retries) = env_parse("SYNC_MAX_RETRIES")? {
        config.sync.max_retries = max_retries;
    }
    if let Some(timeout) = env_parse("SYNC_CALL_TIMEOUT")? {
        config.sync.call_timeout_secs = timeout;
    }

    if let Some(threshold) = env_parse("BREAKER_FAILURE_THRESHOLD")? {
        config.circuit_breaker.failure_threshold = threshold;
    }
    if let Some(timeout) = env_parse("BREAKER_RECOVERY_TIMEOUT")? {
        config.circuit_breaker.recovery_timeout_secs = timeout;
    }

    if let Some(backend) = env_parse::<LockBackend>("LOCK_BACKEND")? {
        config.lock.backend = backend;
    }
    if let Ok(url) = env_var("LOCK_POSTGRES_URL") {
        config.lock.postgres_url = Some(url);
    }
    if let Some(ttl) = env_parse("LOCK_TTL")? {
        config.lock.ttl_secs = ttl;
    }
    if let Some(policy) = env_parse::<LockUnavailablePolicy>("LOCK_ON_UNAVAILABLE")? {
        config.lock.on_unavailable = policy;
    }

    if let Ok(level) = env_var("LOG_LEVEL") {
        config.logging.level = level;
    }
    config.logging.json = env_bool("LOG_JSON", config.logging.json);

    Ok(config)
}

/// Load configuration from a file
///
/// If `path` is `None`, probes the standard locations.
///
/// # Errors
/// Returns `FiscalError::Config` if the file is missing or malformed.
pub fn load_from_file(path: Option<PathBuf>) -> Result<Config> {
    let config_path = match path {
        Some(p) => {
            if !p.exists() {
                return Err(FiscalError::Config(format!(
                    "Config file not found: {}",
                    p.display()
                )));
            }
            p
        }
        None => probe_config_paths().ok_or_else(|| {
            FiscalError::Config("No config file found in any of the standard locations".to_string())
        })?,
    };

    tracing::info!(path = %config_path.display(), "config.loading_file");

    let contents = std::fs::read_to_string(&config_path)
        .map_err(|e| FiscalError::Config(format!("Failed to read config file: {e}")))?;

    parse_config(&contents, &config_path)
}

/// Parse configuration text; format is chosen by file extension
fn parse_config(contents: &str, path: &Path) -> Result<Config> {
    let extension = path.extension().and_then(|e| e.to_str()).unwrap_or("json");

    match extension {
        "toml" => toml::from_str(contents)
            .map_err(|e| FiscalError::Config(format!("Invalid TOML format: {e}"))),
        "json" => serde_json::from_str(contents)
            .map_err(|e| FiscalError::Config(format!("Invalid JSON format: {e}"))),
        _ => Err(FiscalError::Config(format!("Unsupported config format: {extension}"))),
    }
}

/// First existing config file among the standard locations
pub fn probe_config_paths() -> Option<PathBuf> {
    const NAMES: [&str; 4] = ["config.json", "config.toml", "fiscalsync.json", "fiscalsync.toml"];

    let mut roots = Vec::new();
    if let Ok(cwd) = std::env::current_dir() {
        roots.push(cwd);
    }
    if let Some(exe_dir) =
        std::env::current_exe().ok().and_then(|exe| exe.parent().map(Path::to_path_buf))
    {
        roots.push(exe_dir);
    }

    roots
        .iter()
        .flat_map(|root| [root.clone(), root.join(".."), root.join("../..")])
        .flat_map(|dir| NAMES.iter().map(move |name| dir.join(name)))
        .find(|path| path.exists())
}

/// Required environment variable (without prefix)
fn env_var(key: &str) -> Result<String> {
    let name = format!("{ENV_PREFIX}{key}");
    std::env::var(&name)
        .map_err(|_| FiscalError::Config(format!("Missing required environment variable: {name}")))
}

/// Optional environment variable parsed into `T`
fn env_parse<T>(key: &str) -> Result<Option<T>>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    let name = format!("{ENV_PREFIX}{key}");
    match std::env::var(&name) {
        Ok(raw) => raw
            .trim()
            .parse::<T>()
            .map(Some)
            .map_err(|e| FiscalError::Config(format!("Invalid value for {name}: {e}"))),
        Err(_) => Ok(None),
    }
}

/// Parse boolean from environment variable
///
/// Accepts: `1`/`0`, `true`/`false`, `yes`/`no`, `on`/`off` (case-insensitive)
fn env_bool(key: &str, default: bool) -> bool {
    std::env::var(format!("{ENV_PREFIX}{key}"))
        .ok()
        .map(|s| matches!(s.to_ascii_lowercase().as_str(), "1" | "true" | "yes" | "on"))
        .unwrap_or(default)
}
