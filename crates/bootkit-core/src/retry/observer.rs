//! Retry event hooks

use std::time::Duration;

use tracing::{debug, error, info, warn};

/// Receives events from [`RetryExecutor`](super::RetryExecutor)
///
/// Errors arrive already rendered so observers stay independent of the
/// operation's error type.
pub trait RetryObserver: Send + Sync {
    /// A failed attempt that will be retried after `delay`
    fn on_retry(&self, attempt: u32, max_attempts: u32, error: &str, delay: Duration);

    /// The final attempt failed
    fn on_exhausted(&self, attempts: u32, error: &str);

    fn on_rejected(&self, attempt: u32, error: &str) {
        let _ = (attempt, error);
    }

    fn on_success(&self, attempt: u32) {
        let _ = attempt;
    }
}

/// Logs retry events for a named operation
#[derive(Debug, Clone)]
pub struct TracingObserver {
    operation: String,
}

impl TracingObserver {
    pub fn new(operation: impl Into<String>) -> Self {
        Self {
            operation: operation.into(),
        }
    }

    pub fn operation(&self) -> &str {
        &self.operation
    }
}

impl RetryObserver for TracingObserver {
    fn on_retry(&self, attempt: u32, max_attempts: u32, error: &str, delay: Duration) {
        warn!(
            operation = %self.operation,
            attempt,
            max_attempts,
            delay_ms = delay.as_millis() as u64,
            "Attempt failed, retrying: {}",
            error
        );
    }

    fn on_exhausted(&self, attempts: u32, error: &str) {
        error!(operation = %self.operation, attempts, "All attempts failed: {}", error);
    }

    fn on_rejected(&self, attempt: u32, error: &str) {
        warn!(operation = %self.operation, attempt, "Not retrying: {}", error);
    }

    fn on_success(&self, attempt: u32) {
        if attempt > 1 {
            info!(operation = %self.operation, attempt, "Succeeded after retry");
        } else {
            debug!(operation = %self.operation, "Succeeded on first attempt");
        }
    }
}
