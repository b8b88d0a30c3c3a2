//! Capped exponential backoff for periodic loops
//!
//! [`BackoffStrategy`] computes a delay per attempt; [`TickBackoff`] tracks
//! consecutive unhealthy ticks of a loop and yields the extra wait to add to
//! its base interval. A clean tick resets it.

use std::time::Duration;

/// Delay strategy for a given attempt number (0-based)
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BackoffStrategy {
    /// Same delay for every attempt
    Fixed(Duration),
    /// `initial_delay * 2^attempt`, never above `max_delay`
    Exponential { initial_delay: Duration, max_delay: Duration },
}

impl BackoffStrategy {
    /// Doubling backoff between `initial_delay` and `max_delay`
    pub fn exponential(initial_delay: Duration, max_delay: Duration) -> Self {
        Self::Exponential { initial_delay, max_delay: max_delay.max(initial_delay) }
    }

    /// Calculate the delay for the given attempt
    pub fn calculate_delay(&self, attempt: u32) -> Duration {
        match self {
            Self::Fixed(delay) => *delay,
            Self::Exponential { initial_delay, max_delay } => {
                let factor = 1_u32.checked_shl(attempt).unwrap_or(u32::MAX);
                initial_delay.saturating_mul(factor).min(*max_delay)
            }
        }
    }
}

impl Default for BackoffStrategy {
    fn default() -> Self {
        Self::exponential(Duration::from_secs(1), Duration::from_secs(60))
    }
}

/// Backoff state for a loop that alternates between clean and failing ticks
#[derive(Debug, Clone)]
pub struct TickBackoff {
    strategy: BackoffStrategy,
    consecutive_failures: u32,
}

impl TickBackoff {
    pub fn new(strategy: BackoffStrategy) -> Self {
        Self { strategy, consecutive_failures: 0 }
    }

    /// Record the outcome of a tick and return the extra delay before the next
    ///
    /// Returns `Duration::ZERO` after a clean tick.
    pub fn record_tick(&mut self, had_failures: bool) -> Duration {
        if had_failures {
            let delay = self.strategy.calculate_delay(self.consecutive_failures);
            self.consecutive_failures = self.consecutive_failures.saturating_add(1);
            delay
        } else {
            self.consecutive_failures = 0;
            Duration::ZERO
        }
    }

    /// Number of failing ticks in a row
    pub fn consecutive_failures(&self) -> u32 {
        self.consecutive_failures
    }
}

impl Default for TickBackoff {
    fn default() -> Self {
        Self::new(BackoffStrategy::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Validates `BackoffStrategy::Exponential` doubling and cap.
    ///
    /// Assertions:
    /// - Confirms attempts 0..=3 produce 1s, 2s, 4s, 8s.
    /// - Confirms large attempts are capped at 60s without overflow.
    #[test]
    fn exponential_doubles_until_capped() {
        let strategy = BackoffStrategy::default();
        assert_eq!(strategy.calculate_delay(0), Duration::from_secs(1));
        assert_eq!(strategy.calculate_delay(1), Duration::from_secs(2));
        assert_eq!(strategy.calculate_delay(2), Duration::from_secs(4));
        assert_eq!(strategy.calculate_delay(3), Duration::from_secs(8));
        assert_eq!(strategy.calculate_delay(6), Duration::from_secs(60));
        assert_eq!(strategy.calculate_delay(200), Duration::from_secs(60));
    }

    #[test]
    fn fixed_strategy_ignores_attempt() {
        let strategy = BackoffStrategy::Fixed(Duration::from_millis(250));
        assert_eq!(strategy.calculate_delay(0), strategy.calculate_delay(9));
    }

    /// Validates that a clean tick resets the backoff sequence.
    ///
    /// Assertions:
    /// - Confirms failing ticks grow the delay.
    /// - Confirms a clean tick returns zero and restarts at the initial delay.
    #[test]
    fn clean_tick_resets_sequence() {
        let mut backoff = TickBackoff::default();
        assert_eq!(backoff.record_tick(true), Duration::from_secs(1));
        assert_eq!(backoff.record_tick(true), Duration::from_secs(2));
        assert_eq!(backoff.consecutive_failures(), 2);

        assert_eq!(backoff.record_tick(false), Duration::ZERO);
        assert_eq!(backoff.consecutive_failures(), 0);
        assert_eq!(backoff.record_tick(true), Duration::from_secs(1));
    }
}
