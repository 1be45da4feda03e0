//! Fixed-delay retry policy for log fetches.

use std::time::Duration;

use crate::config::ListenerConfig;

/// Bounded retry with a constant pause between attempts.
///
/// No backoff growth and no jitter: a range is tried
/// `max_attempts` times, `delay` apart, and then the run gives up.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Total attempts, first try included.
    pub max_attempts: u32,
    /// Pause between two attempts.
    pub delay: Duration,
}

impl RetryPolicy {
    pub fn new(max_attempts: u32, delay: Duration) -> Self {
        Self {
            max_attempts,
            delay,
        }
    }

    pub fn from_config(config: &ListenerConfig) -> Self {
        Self::new(config.max_retries, config.retry_delay())
    }

    /// Delay to wait after the `attempt`-th failure (1-based), or `None`
    /// when that was the last allowed attempt.
    pub fn next_delay(&self, attempt: u32) -> Option<Duration> {
        self.should_retry(attempt).then_some(self.delay)
    }

    /// Returns `true` if another attempt is allowed after `attempt` failures.
    pub fn should_retry(&self, attempt: u32) -> bool {
        attempt < self.max_attempts
    }
}
