//! Retry loop

use std::fmt;
use std::future::Future;

use crate::types::RetryPolicy;

use super::error::RetryError;
use super::observer::{RetryObserver, TracingObserver};

/// Runs an async operation until it succeeds or the policy is used up
pub struct RetryExecutor<E> {
    policy: RetryPolicy,
    retryable: fn(&E) -> bool,
    observer: Box<dyn RetryObserver>,
}

impl<E: fmt::Display> RetryExecutor<E> {
    /// Retry every error and log through `tracing`
    pub fn new(policy: RetryPolicy) -> Self {
        Self {
            policy,
            retryable: |_| true,
            observer: Box::new(TracingObserver::new("operation")),
        }
    }

    /// Only errors for which `retryable` returns `true` get another attempt
    pub fn retry_if(mut self, retryable: fn(&E) -> bool) -> Self {
        self.retryable = retryable;
        self
    }

    pub fn with_observer(mut self, observer: impl RetryObserver + 'static) -> Self {
        self.observer = Box::new(observer);
        self
    }

    /// Call `op` up to `max_attempts` times
    ///
    /// The wait happens between attempts only, never after the last one.
    pub async fn execute<F, Fut, T>(&self, mut op: F) -> Result<T, RetryError<E>>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, E>>,
    {
        let max_attempts = self.policy.max_attempts.max(1);
        let mut attempt = 1;

        loop {
            let err = match op().await {
                Ok(value) => {
                    self.observer.on_success(attempt);
                    return Ok(value);
                }
                Err(err) => err,
            };

            if !(self.retryable)(&err) {
                self.observer.on_rejected(attempt, &err.to_string());
                return Err(RetryError::Rejected { attempt, last: err });
            }
            if attempt >= max_attempts {
                self.observer.on_exhausted(attempt, &err.to_string());
                return Err(RetryError::Exhausted {
                    attempts: attempt,
                    last: err,
                });
            }

            let delay = self.policy.delay;
            self.observer
                .on_retry(attempt, max_attempts, &err.to_string(), delay);
            if !delay.is_zero() {
                tokio::time::sleep(delay).await;
            }
            attempt += 1;
        }
    }
}
