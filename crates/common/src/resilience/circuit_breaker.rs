//! Three-state circuit breaker guarding calls to a flaky dependency
//!
//! ```text
//!            failures >= failure_threshold
//!   CLOSED ─────────────────────────────────▶ OPEN
//!     ▲                                        │ recovery timeout elapsed
//!     │ successes >= success_threshold         │ (checked on next call)
//!     │                                        ▼
//!     └──────────────────────────────────── HALF_OPEN
//!                    any probe failure ───▶ OPEN
//! ```
//!
//! [`CircuitBreaker::call`] never raises for an open circuit. It returns a
//! tagged [`CallOutcome`] so callers branch on data: `Success`,
//! `CircuitOpen` (operation not invoked, nothing counted), or
//! `Failure(err)`.

use std::fmt;
use std::future::Future;
use std::sync::Arc;
use std::time::{Duration, Instant, SystemTime, UNIX_EPOCH};

use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, info, warn};

//==============================================================================
// Time Abstraction for Testability
//==============================================================================

/// Trait for time operations to enable deterministic testing
///
/// Production code uses [`SystemClock`]; tests drive a [`MockClock`] so the
/// recovery timeout can be crossed without sleeping.
pub trait Clock: Send + Sync + 'static {
    /// Get current instant (monotonic time)
    fn now(&self) -> Instant;

    /// Get current system time (wall clock)
    fn system_time(&self) -> SystemTime;

    /// Get milliseconds since UNIX epoch
    fn millis_since_epoch(&self) -> u64 {
        let millis =
            self.system_time().duration_since(UNIX_EPOCH).unwrap_or_default().as_millis();
        u64::try_from(millis).unwrap_or(u64::MAX)
    }
}

/// Real system clock implementation for production use
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> Instant {
        Instant::now()
    }

    fn system_time(&self) -> SystemTime {
        SystemTime::now()
    }
}

impl<T: Clock> Clock for Arc<T> {
    fn now(&self) -> Instant {
        (**self).now()
    }

    fn system_time(&self) -> SystemTime {
        (**self).system_time()
    }
}

/// Mock clock for deterministic testing
///
/// Clones share the same elapsed offset, so a test can keep one handle and
/// hand another to the breaker.
#[derive(Debug, Clone)]
pub struct MockClock {
    start: Instant,
    wall_start: SystemTime,
    elapsed: Arc<Mutex<Duration>>,
}

impl MockClock {
    /// Create a new mock clock starting at the current instant
    pub fn new() -> Self {
        Self {
            start: Instant::now(),
            wall_start: SystemTime::now(),
            elapsed: Arc::new(Mutex::new(Duration::ZERO)),
        }
    }

    /// Advance the mock clock by a duration
    pub fn advance(&self, duration: Duration) {
        *self.elapsed.lock() += duration;
    }

    /// Advance the mock clock by whole seconds
    pub fn advance_secs(&self, secs: u64) {
        self.advance(Duration::from_secs(secs));
    }

    /// Set the mock clock to a specific elapsed time
    pub fn set_elapsed(&self, duration: Duration) {
        *self.elapsed.lock() = duration;
    }

    /// Get the current elapsed time
    pub fn elapsed(&self) -> Duration {
        *self.elapsed.lock()
    }
}

impl Default for MockClock {
    fn default() -> Self {
        Self::new()
    }
}

impl Clock for MockClock {
    fn now(&self) -> Instant {
        self.start + self.elapsed()
    }

    fn system_time(&self) -> SystemTime {
        self.wall_start + self.elapsed()
    }
}

//==============================================================================
// Configuration
//==============================================================================

/// Configuration validation error
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("Invalid configuration: {message}")]
    Invalid { message: String },
}

/// Configuration result type
pub type ConfigResult<T> = Result<T, ConfigError>;

/// Circuit breaker states
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum CircuitState {
    /// Circuit is closed, allowing requests
    Closed,
    /// Circuit is open, rejecting requests
    Open,
    /// Circuit is half-open, letting probe calls through
    HalfOpen,
}

impl fmt::Display for CircuitState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CircuitState::Closed => write!(f, "CLOSED"),
            CircuitState::Open => write!(f, "OPEN"),
            CircuitState::HalfOpen => write!(f, "HALF_OPEN"),
        }
    }
}

/// Configuration for circuit breaker behavior
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CircuitBreakerConfig {
    /// Number of failures before opening the circuit
    pub failure_threshold: u64,
    /// Consecutive half-open successes needed to close the circuit
    pub success_threshold: u64,
    /// Time to wait after opening before letting a probe through
    pub recovery_timeout: Duration,
    /// Whether a success in the closed state clears the failure count
    pub reset_on_success: bool,
}

impl Default for CircuitBreakerConfig {
    fn default() -> Self {
        Self {
            failure_threshold: 5,
            success_threshold: 2,
            recovery_timeout: Duration::from_secs(60),
            reset_on_success: true,
        }
    }
}

impl CircuitBreakerConfig {
    /// Create a configuration builder
    pub fn builder() -> CircuitBreakerConfigBuilder {
        CircuitBreakerConfigBuilder::new()
    }

    /// Validate the configuration
    pub fn validate(&self) -> ConfigResult<()> {
        if self.failure_threshold == 0 {
            return Err(ConfigError::Invalid {
                message: "failure_threshold must be greater than 0".to_string(),
            });
        }

        if self.success_threshold == 0 {
            return Err(ConfigError::Invalid {
                message: "success_threshold must be greater than 0".to_string(),
            });
        }

        Ok(())
    }
}

/// Builder for CircuitBreakerConfig
#[derive(Debug, Default)]
pub struct CircuitBreakerConfigBuilder {
    config: CircuitBreakerConfig,
}

impl CircuitBreakerConfigBuilder {
    /// Start from the default configuration
    pub fn new() -> Self {
        Self { config: CircuitBreakerConfig::default() }
    }

    pub fn failure_threshold(mut self, threshold: u64) -> Self {
        self.config.failure_threshold = threshold;
        self
    }

    pub fn success_threshold(mut self, threshold: u64) -> Self {
        self.config.success_threshold = threshold;
        self
    }

    pub fn recovery_timeout(mut self, timeout: Duration) -> Self {
        self.config.recovery_timeout = timeout;
        self
    }

    pub fn reset_on_success(mut self, reset: bool) -> Self {
        self.config.reset_on_success = reset;
        self
    }

    pub fn build(self) -> ConfigResult<CircuitBreakerConfig> {
        self.config.validate()?;
        Ok(self.config)
    }
}

//==============================================================================
// Call outcome and stats
//==============================================================================

/// Result of a guarded call
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CallOutcome<T, E> {
    /// The operation ran and succeeded
    Success(T),
    /// The circuit rejected the call; the operation was not invoked
    CircuitOpen,
    /// The operation ran and failed
    Failure(E),
}

impl<T, E> CallOutcome<T, E> {
    pub fn is_success(&self) -> bool {
        matches!(self, Self::Success(_))
    }

    pub fn is_circuit_open(&self) -> bool {
        matches!(self, Self::CircuitOpen)
    }
}

/// Read-only snapshot of breaker state
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CircuitBreakerStats {
    pub state: CircuitState,
    pub failure_count: u64,
    pub success_count: u64,
    pub total_calls: u64,
    pub rejected_calls: u64,
    pub last_failure_time: Option<DateTime<Utc>>,
    pub last_state_change: DateTime<Utc>,
}

#[derive(Debug)]
struct BreakerInner {
    state: CircuitState,
    failure_count: u64,
    success_count: u64,
    total_calls: u64,
    rejected_calls: u64,
    opened_at: Option<Instant>,
    last_failure_time: Option<SystemTime>,
    last_state_change: SystemTime,
}

impl BreakerInner {
    fn closed(now: SystemTime) -> Self {
        Self {
            state: CircuitState::Closed,
            failure_count: 0,
            success_count: 0,
            total_calls: 0,
            rejected_calls: 0,
            opened_at: None,
            last_failure_time: None,
            last_state_change: now,
        }
    }
}

//==============================================================================
// Circuit breaker
//==============================================================================

/// Circuit breaker around a single remote dependency
///
/// All counters live behind one mutex, held only for bookkeeping and never
/// across the guarded operation. Clones share state.
pub struct CircuitBreaker<C: Clock = SystemClock> {
    name: Arc<str>,
    config: CircuitBreakerConfig,
    inner: Arc<Mutex<BreakerInner>>,
    clock: Arc<C>,
}

impl<C: Clock> fmt::Debug for CircuitBreaker<C> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let inner = self.inner.lock();
        f.debug_struct("CircuitBreaker")
            .field("name", &self.name)
            .field("config", &self.config)
            .field("state", &inner.state)
            .field("failure_count", &inner.failure_count)
            .field("success_count", &inner.success_count)
            .finish()
    }
}

impl<C: Clock> Clone for CircuitBreaker<C> {
    fn clone(&self) -> Self {
        Self {
            name: Arc::clone(&self.name),
            config: self.config.clone(),
            inner: Arc::clone(&self.inner),
            clock: Arc::clone(&self.clock),
        }
    }
}

impl CircuitBreaker<SystemClock> {
    /// Create a new circuit breaker using the system clock
    pub fn new(name: impl Into<String>, config: CircuitBreakerConfig) -> ConfigResult<Self> {
        Self::with_clock(name, config, SystemClock)
    }
}

impl<C: Clock> CircuitBreaker<C> {
    /// Create a new circuit breaker with a custom clock
    pub fn with_clock(
        name: impl Into<String>,
        config: CircuitBreakerConfig,
        clock: C,
    ) -> ConfigResult<Self> {
        config.validate()?;
        let now = clock.system_time();

        Ok(Self {
            name: Arc::from(name.into()),
            config,
            inner: Arc::new(Mutex::new(BreakerInner::closed(now))),
            clock: Arc::new(clock),
        })
    }

    /// Name used in log events
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Configuration this breaker was built with
    pub fn config(&self) -> &CircuitBreakerConfig {
        &self.config
    }

    /// Run `operation` if the circuit admits it
    ///
    /// An open circuit whose recovery timeout has elapsed moves to half-open
    /// here, on the call attempt, and the call becomes a probe. A rejected
    /// call does not touch failure accounting.
    pub async fn call<F, Fut, T, E>(&self, operation: F) -> CallOutcome<T, E>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T, E>>,
        E: fmt::Display,
    {
        if !self.try_admit() {
            debug!(breaker = %self.name, "breaker.call_rejected");
            return CallOutcome::CircuitOpen;
        }

        match operation().await {
            Ok(value) => {
                self.record_success();
                CallOutcome::Success(value)
            }
            Err(error) => {
                debug!(breaker = %self.name, error = %error, "breaker.call_failed");
                self.record_failure();
                CallOutcome::Failure(error)
            }
        }
    }

    /// Decide whether a call may proceed, applying the lazy OPEN -> HALF_OPEN
    /// transition.
    fn try_admit(&self) -> bool {
        let mut inner = self.inner.lock();
        let admitted = match inner.state {
            CircuitState::Closed | CircuitState::HalfOpen => true,
            CircuitState::Open => {
                let elapsed = inner
                    .opened_at
                    .map_or(Duration::MAX, |opened| self.clock.now().saturating_duration_since(opened));
                if elapsed >= self.config.recovery_timeout {
                    self.transition(&mut inner, CircuitState::HalfOpen);
                    true
                } else {
                    false
                }
            }
        };

        if admitted {
            inner.total_calls += 1;
        } else {
            inner.rejected_calls += 1;
        }
        admitted
    }

    /// Record a successful operation
    pub fn record_success(&self) {
        let mut inner = self.inner.lock();
        match inner.state {
            CircuitState::Closed => {
                if self.config.reset_on_success {
                    inner.failure_count = 0;
                }
            }
            CircuitState::HalfOpen => {
                inner.success_count += 1;
                if inner.success_count >= self.config.success_threshold {
                    self.transition(&mut inner, CircuitState::Closed);
                }
            }
            CircuitState::Open => {
                // A call admitted before another caller opened the circuit.
                debug!(breaker = %self.name, "breaker.late_success_ignored");
            }
        }
    }

    /// Record a failed operation
    pub fn record_failure(&self) {
        let mut inner = self.inner.lock();
        inner.failure_count += 1;
        inner.last_failure_time = Some(self.clock.system_time());

        match inner.state {
            CircuitState::Closed => {
                if inner.failure_count >= self.config.failure_threshold {
                    self.transition(&mut inner, CircuitState::Open);
                }
            }
            CircuitState::HalfOpen => self.transition(&mut inner, CircuitState::Open),
            CircuitState::Open => {}
        }
    }

    fn transition(&self, inner: &mut BreakerInner, to: CircuitState) {
        let from = inner.state;
        inner.state = to;
        inner.last_state_change = self.clock.system_time();

        match to {
            CircuitState::Open => {
                inner.opened_at = Some(self.clock.now());
                inner.success_count = 0;
                warn!(
                    breaker = %self.name,
                    from = %from,
                    failure_count = inner.failure_count,
                    recovery_timeout_secs = self.config.recovery_timeout.as_secs(),
                    "breaker.opened"
                );
            }
            CircuitState::HalfOpen => {
                inner.success_count = 0;
                info!(breaker = %self.name, "breaker.half_open");
            }
            CircuitState::Closed => {
                inner.failure_count = 0;
                inner.success_count = 0;
                inner.opened_at = None;
                info!(breaker = %self.name, from = %from, "breaker.closed");
            }
        }
    }

    /// Current state without applying the lazy recovery transition
    pub fn state(&self) -> CircuitState {
        self.inner.lock().state
    }

    /// Read-only snapshot of the breaker
    pub fn stats(&self) -> CircuitBreakerStats {
        let inner = self.inner.lock();
        CircuitBreakerStats {
            state: inner.state,
            failure_count: inner.failure_count,
            success_count: inner.success_count,
            total_calls: inner.total_calls,
            rejected_calls: inner.rejected_calls,
            last_failure_time: inner.last_failure_time.map(DateTime::<Utc>::from),
            last_state_change: DateTime::<Utc>::from(inner.last_state_change),
        }
    }

    /// Reset the circuit breaker to a fresh closed state
    pub fn reset(&self) {
        let mut inner = self.inner.lock();
        *inner = BreakerInner::closed(self.clock.system_time());
        info!(breaker = %self.name, "breaker.reset");
    }
}
