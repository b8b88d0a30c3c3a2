//! Storage health and metric snapshot types

/// Health status of the storage system
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HealthStatus {
    /// Whether the pool is healthy
    pub healthy: bool,

    /// Number of open connections
    pub active_connections: usize,

    /// Number of idle connections
    pub idle_connections: usize,

    /// Maximum pool size
    pub max_connections: usize,

    /// Optional error message if unhealthy
    pub message: Option<String>,
}

impl HealthStatus {
    /// Create a healthy status
    pub fn healthy(active: usize, idle: usize, max: usize) -> Self {
        Self {
            healthy: true,
            active_connections: active,
            idle_connections: idle,
            max_connections: max,
            message: None,
        }
    }

    /// Create an unhealthy status
    pub fn unhealthy(message: impl Into<String>) -> Self {
        Self {
            healthy: false,
            active_connections: 0,
            idle_connections: 0,
            max_connections: 0,
            message: Some(message.into()),
        }
    }
}

/// Connection pool metrics snapshot
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PoolMetrics {
    /// Total connections acquired
    pub connections_acquired: u64,

    /// Total connection timeouts
    pub connections_timeout: u64,

    /// Total connection errors
    pub connections_error: u64,

    /// Average connection acquisition time (milliseconds)
    pub avg_acquisition_time_ms: u64,

    /// Write transactions that committed
    pub transactions_committed: u64,

    /// Write transactions that rolled back
    pub transactions_failed: u64,
}

#[cfg(test)]
mod tests {
    //! Unit tests for storage::types.
    use super::*;

    /// Tests creating an unhealthy HealthStatus instance.
    ///
    /// Verifies error state is properly represented with message.
    #[test]
    fn test_health_status_unhealthy() {
        let status = HealthStatus::unhealthy("Pool exhausted");

        assert!(!status.healthy, "Status should be marked as unhealthy");
        assert_eq!(status.max_connections, 0);
        assert_eq!(status.message.as_deref(), Some("Pool exhausted"));
    }

    #[test]
    fn test_health_status_healthy() {
        let status = HealthStatus::healthy(3, 1, 8);
        assert!(status.healthy);
        assert_eq!(status.active_connections, 3);
        assert!(status.message.is_none());
    }
}
