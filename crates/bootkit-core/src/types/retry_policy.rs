use std::time::Duration;

/// Attempt budget and wait for a retried operation
#[derive(Debug, Clone, PartialEq)]
pub struct RetryPolicy {
    /// Total attempts including the first; never below 1
    pub max_attempts: u32,
    /// Wait between consecutive attempts
    pub delay: Duration,
}

impl RetryPolicy {
    /// Wait `delay` between each of `max_attempts` attempts
    ///
    /// A zero attempt count still performs one attempt.
    pub fn fixed(max_attempts: u32, delay: Duration) -> Self {
        Self {
            max_attempts: max_attempts.max(1),
            delay,
        }
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::fixed(3, Duration::from_secs(5))
    }
}
