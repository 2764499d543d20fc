//! Exponential backoff calculator
//!
//! Delays grow geometrically from an initial value up to a cap. Jitter is
//! optional and off by default so schedules stay predictable in tests.

use std::time::Duration;

use rand::Rng;
use serde::{Deserialize, Serialize};

use crate::PoolError;

/// Exponential backoff strategy for retries.
///
/// # Example
///
/// ```
/// use bboard_connection::BackoffStrategy;
/// use std::time::Duration;
///
/// let backoff = BackoffStrategy::new(1_000, 30_000);
///
/// assert_eq!(backoff.calculate_delay(0), Duration::from_secs(1));
/// assert_eq!(backoff.calculate_delay(1), Duration::from_secs(2));
/// assert_eq!(backoff.calculate_delay(2), Duration::from_secs(4));
///
/// // Growth is capped at the maximum
/// assert_eq!(backoff.calculate_delay(20), Duration::from_secs(30));
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BackoffStrategy {
    /// Delay in milliseconds before the first retry
    initial_ms: u64,
    /// Cap in milliseconds for exponential growth
    max_ms: u64,
    /// Growth factor per attempt
    multiplier: f64,
    /// Spread each delay by up to ±25%
    jitter: bool,
}

impl BackoffStrategy {
    /// Create a backoff strategy with the given initial and maximum delays
    /// and a multiplier of 2.
    pub fn new(initial_ms: u64, max_ms: u64) -> Self {
        let initial_ms = initial_ms.max(1);
        Self {
            initial_ms,
            max_ms: max_ms.max(initial_ms),
            multiplier: 2.0,
            jitter: false,
        }
    }

    /// Set the growth factor. [`validate`](Self::validate) rejects values
    /// that are not above 1.0.
    pub fn with_multiplier(mut self, multiplier: f64) -> Self {
        self.multiplier = multiplier;
        self
    }

    /// Enable or disable jitter
    pub fn with_jitter(mut self, jitter: bool) -> Self {
        self.jitter = jitter;
        self
    }

    /// Delay before retry number `attempt` (0 = first retry)
    pub fn calculate_delay(&self, attempt: u32) -> Duration {
        let exponent = i32::try_from(attempt).unwrap_or(i32::MAX);
        let delay_ms = (self.initial_ms as f64) * self.multiplier.max(1.0).powi(exponent);
        let capped_ms = delay_ms.min(self.max_ms as f64) as u64;

        let final_ms = if self.jitter && capped_ms >= 4 {
            let spread = capped_ms / 4;
            let offset = rand::thread_rng().gen_range(0..=spread * 2);
            capped_ms.saturating_sub(spread).saturating_add(offset)
        } else {
            capped_ms
        };

        Duration::from_millis(final_ms)
    }

    /// Check that delays grow from a non-zero start. Values read from a
    /// config file skip the clamps in [`new`](Self::new).
    pub fn validate(&self) -> Result<(), PoolError> {
        if self.initial_ms == 0 {
            return Err(PoolError::Configuration(
                "retry initial_ms must be greater than 0".into(),
            ));
        }
        if !self.multiplier.is_finite() || self.multiplier <= 1.0 {
            return Err(PoolError::Configuration(format!(
                "retry multiplier must be a finite value above 1.0, got {}",
                self.multiplier
            )));
        }
        if self.max_ms < self.initial_ms {
            return Err(PoolError::Configuration(format!(
                "retry max_ms ({}) must not be below initial_ms ({})",
                self.max_ms, self.initial_ms
            )));
        }
        Ok(())
    }

    pub fn initial_delay(&self) -> Duration {
        Duration::from_millis(self.initial_ms)
    }

    pub fn max_delay(&self) -> Duration {
        Duration::from_millis(self.max_ms)
    }

    pub fn multiplier(&self) -> f64 {
        self.multiplier
    }

    pub fn has_jitter(&self) -> bool {
        self.jitter
    }
}

impl Default for BackoffStrategy {
    /// 1 second initial, 30 seconds max, doubling
    fn default() -> Self {
        Self::new(1_000, 30_000)
    }
}
