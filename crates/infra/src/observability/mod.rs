//! Logging setup and sync metrics
//!
//! Metric recorders return [`MetricsResult`] so callers can drop a failed
//! sample with a warning and carry on; today they always succeed.

pub mod logging;
pub mod metrics;

pub use logging::init_tracing;
pub use metrics::{SyncMetrics, SyncMetricsSnapshot};

/// Metrics error type
#[derive(Debug, thiserror::Error)]
pub enum MetricsError {
    /// Empty data set, cannot calculate an aggregate
    #[error("Empty data: cannot calculate {metric}")]
    EmptyData {
        /// Aggregate that failed (e.g. "P95")
        metric: &'static str,
    },
}

/// Result type for metrics operations
pub type MetricsResult<T> = Result<T, MetricsError>;
