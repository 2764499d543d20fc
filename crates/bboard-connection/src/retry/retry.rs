//! Bounded retry loop with backoff

use std::future::Future;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use super::BackoffStrategy;
use crate::PoolError;

/// How many times to try and how long to wait in between
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RetryPolicy {
    /// Total attempts, including the first
    max_attempts: u32,
    #[serde(flatten)]
    backoff: BackoffStrategy,
}

impl RetryPolicy {
    pub fn new(max_attempts: u32, backoff: BackoffStrategy) -> Self {
        Self {
            max_attempts,
            backoff,
        }
    }

    /// A policy that tries exactly once
    pub fn no_retry() -> Self {
        Self::new(1, BackoffStrategy::default())
    }

    pub fn max_attempts(&self) -> u32 {
        self.max_attempts
    }

    pub fn backoff(&self) -> &BackoffStrategy {
        &self.backoff
    }

    pub fn validate(&self) -> Result<(), PoolError> {
        if self.max_attempts == 0 {
            return Err(PoolError::Configuration(
                "retry max_attempts must be at least 1".into(),
            ));
        }
        self.backoff.validate()
    }
}

impl Default for RetryPolicy {
    /// 3 attempts, 1s then 2s between them
    fn default() -> Self {
        Self::new(3, BackoffStrategy::default())
    }
}

/// Why [`retry_with_backoff`] stopped without a value
#[derive(Error, Debug)]
pub enum RetryError<E> {
    /// The error was not retryable; no further attempts were made
    #[error("{0}")]
    Aborted(E),
    /// Every attempt failed; `last` is the final attempt's error
    #[error("failed after {attempts} attempts: {last}")]
    Exhausted { attempts: u32, last: E },
}

impl<E> RetryError<E> {
    /// The error that ended the loop
    pub fn into_inner(self) -> E {
        match self {
            RetryError::Aborted(e) => e,
            RetryError::Exhausted { last, .. } => last,
        }
    }
}

/// Run `op` until it succeeds, returns a non-retryable error, or
/// `policy.max_attempts()` attempts have failed.
///
/// `op` receives the 1-based attempt number. Between attempts the task
/// sleeps for the policy's backoff delay; there is no sleep after the final
/// attempt.
pub async fn retry_with_backoff<T, E, Op, Fut>(
    policy: &RetryPolicy,
    mut is_retryable: impl FnMut(&E) -> bool,
    mut op: Op,
) -> Result<T, RetryError<E>>
where
    Op: FnMut(u32) -> Fut,
    Fut: Future<Output = Result<T, E>>,
    E: std::fmt::Display,
{
    let max_attempts = policy.max_attempts().max(1);
    let mut attempt = 0;

    loop {
        attempt += 1;
        let error = match op(attempt).await {
            Ok(value) => {
                if attempt > 1 {
                    tracing::info!(attempt, "succeeded after retry");
                }
                return Ok(value);
            }
            Err(error) => error,
        };

        if !is_retryable(&error) {
            tracing::debug!(attempt, error = %error, "error is not retryable");
            return Err(RetryError::Aborted(error));
        }
        if attempt >= max_attempts {
            tracing::error!(attempts = attempt, error = %error, "all attempts failed");
            return Err(RetryError::Exhausted {
                attempts: attempt,
                last: error,
            });
        }

        let delay = policy.backoff().calculate_delay(attempt - 1);
        tracing::warn!(
            attempt,
            max_attempts,
            delay_ms = delay.as_millis() as u64,
            error = %error,
            "attempt failed, backing off"
        );
        tokio::time::sleep(delay).await;
    }
}
