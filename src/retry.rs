//! Retry gateway for rate-limited external calls
//!
//! Every external call that can be throttled (tile OCR, text rewrite, batch
//! scoring, detail fetches) goes through a [`RetryGateway`]. Call sites differ
//! only in the [`RetryPolicy`] they hand it and the predicate that decides
//! which errors are worth retrying.
//!
//! # Backoff
//!
//! | Retry | Delay |
//! |-------|-------|
//! | 1st | `initial_backoff` |
//! | 2nd | `initial_backoff * 2` |
//! | n-th | `min(initial_backoff * 2^(n-1), max_backoff)` |
//!
//! `max_retries = N` allows up to `N + 1` attempts and exactly `N` sleeps.
//! Sleeps use `tokio::time::sleep`, so a backing-off call never blocks other
//! tasks on the runtime.

use crate::config::RetryConfig;
use std::fmt;
use std::future::Future;
use std::time::Duration;

/// Bounds for one call site's retries
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub max_retries: u32,
    pub initial_backoff: Duration,
    pub max_backoff: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: 3,
            initial_backoff: Duration::from_secs(2),
            max_backoff: Duration::from_secs(15),
        }
    }
}

impl RetryPolicy {
    /// Builds the shared exponential policy from configuration
    pub fn from_config(config: &RetryConfig) -> Self {
        Self {
            max_retries: config.max_retries,
            initial_backoff: Duration::from_millis(config.initial_backoff_ms),
            max_backoff: Duration::from_millis(config.max_backoff_ms),
        }
    }

    /// A policy that waits the same delay before every retry
    pub fn fixed(max_retries: u32, delay: Duration) -> Self {
        Self {
            max_retries,
            initial_backoff: delay,
            max_backoff: delay,
        }
    }

    /// Delay before retry number `retry` (zero-based)
    pub fn delay_for(&self, retry: u32) -> Duration {
        let factor = 1u32 << retry.min(31);
        self.initial_backoff
            .saturating_mul(factor)
            .min(self.max_backoff)
    }

    /// Every delay the policy would sleep if all attempts fail
    pub fn schedule(&self) -> Vec<Duration> {
        (0..self.max_retries).map(|n| self.delay_for(n)).collect()
    }
}

/// Failure of a gateway call
#[derive(Debug)]
pub enum RetryError<E> {
    /// The error was not retryable and surfaced on its first occurrence
    Rejected(E),

    /// Every allowed attempt failed with a retryable error
    Exhausted {
        operation: String,
        attempts: u32,
        last: E,
    },
}

impl<E> RetryError<E> {
    pub fn is_exhausted(&self) -> bool {
        matches!(self, Self::Exhausted { .. })
    }
}

impl<E: fmt::Display> fmt::Display for RetryError<E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Rejected(e) => write!(f, "{}", e),
            Self::Exhausted {
                operation,
                attempts,
                last,
            } => write!(f, "{} failed after {} attempts: {}", operation, attempts, last),
        }
    }
}

impl<E: fmt::Debug + fmt::Display> std::error::Error for RetryError<E> {}

/// Bounded retry with exponential backoff
#[derive(Debug, Clone, Default)]
pub struct RetryGateway {
    policy: RetryPolicy,
}

impl RetryGateway {
    pub fn new(policy: RetryPolicy) -> Self {
        Self { policy }
    }

    /// Runs `op` until it succeeds, fails with a non-retryable error, or the
    /// policy's retries are used up
    ///
    /// `operation` names the call in logs and in the terminal error.
    pub async fn call<T, E, F, Fut, P>(
        &self,
        operation: &str,
        mut op: F,
        is_retryable: P,
    ) -> Result<T, RetryError<E>>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, E>>,
        P: Fn(&E) -> bool,
        E: fmt::Display,
    {
        let mut attempt: u32 = 0;

        loop {
            attempt += 1;

            let error = match op().await {
                Ok(value) => {
                    if attempt > 1 {
                        tracing::debug!(operation, attempt, "call succeeded after retry");
                    }
                    return Ok(value);
                }
                Err(e) => e,
            };

            if !is_retryable(&error) {
                tracing::debug!(operation, attempt, error = %error, "non-retryable failure");
                return Err(RetryError::Rejected(error));
            }

            if attempt > self.policy.max_retries {
                tracing::warn!(operation, attempts = attempt, error = %error, "retries exhausted");
                return Err(RetryError::Exhausted {
                    operation: operation.to_string(),
                    attempts: attempt,
                    last: error,
                });
            }

            let delay = self.policy.delay_for(attempt - 1);
            tracing::warn!(
                operation,
                attempt,
                delay_ms = delay.as_millis() as u64,
                error = %error,
                "retryable failure, backing off"
            );
            tokio::time::sleep(delay).await;
        }
    }
}
