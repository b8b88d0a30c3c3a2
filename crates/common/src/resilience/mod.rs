//! Resilience patterns for calls to unreliable dependencies
//!
//! - **Circuit Breaker**: stops calling a failing dependency and probes for
//!   recovery after a timeout. Calls return a tagged [`CallOutcome`].
//! - **Backoff**: capped exponential delay for loops that keep hitting
//!   failures, reset by a clean iteration.
//!
//! Both are generic over the dependency and carry no domain knowledge.

pub mod backoff;
pub mod circuit_breaker;

pub use backoff::{BackoffStrategy, TickBackoff};
pub use circuit_breaker::{
    CallOutcome, CircuitBreaker, CircuitBreakerConfig, CircuitBreakerConfigBuilder,
    CircuitBreakerStats, CircuitState, Clock, ConfigError, ConfigResult, MockClock, SystemClock,
};
