//! Health status classification

use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Health status of the database as seen through the pool
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum HealthStatus {
    /// The check query succeeded quickly
    Healthy,
    /// The check query succeeded, but slowly
    Degraded,
    /// No connection could be obtained or the query failed
    Unhealthy,
}

impl HealthStatus {
    /// Classify a successful check from its latency using default thresholds.
    ///
    /// ```
    /// use bboard_connection::HealthStatus;
    /// use std::time::Duration;
    ///
    /// assert_eq!(HealthStatus::from_latency(Duration::from_millis(20)), HealthStatus::Healthy);
    /// assert_eq!(HealthStatus::from_latency(Duration::from_secs(2)), HealthStatus::Degraded);
    /// ```
    pub fn from_latency(latency: Duration) -> Self {
        Self::from_latency_with_thresholds(latency, &HealthThresholds::default())
    }

    /// Classify a successful check from its latency using custom thresholds.
    ///
    /// A check that succeeded is never `Unhealthy`, however slow.
    pub fn from_latency_with_thresholds(latency: Duration, thresholds: &HealthThresholds) -> Self {
        if latency <= thresholds.healthy_threshold {
            HealthStatus::Healthy
        } else {
            HealthStatus::Degraded
        }
    }

    /// Both `Healthy` and `Degraded` mean the database is serving queries.
    pub fn is_usable(&self) -> bool {
        matches!(self, HealthStatus::Healthy | HealthStatus::Degraded)
    }

    pub fn is_healthy(&self) -> bool {
        matches!(self, HealthStatus::Healthy)
    }
}

impl std::fmt::Display for HealthStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            HealthStatus::Healthy => f.write_str("healthy"),
            HealthStatus::Degraded => f.write_str("degraded"),
            HealthStatus::Unhealthy => f.write_str("unhealthy"),
        }
    }
}

/// Latency thresholds for health classification
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HealthThresholds {
    /// Maximum latency considered healthy
    pub healthy_threshold: Duration,
}

impl HealthThresholds {
    pub fn new(healthy_ms: u64) -> Self {
        Self {
            healthy_threshold: Duration::from_millis(healthy_ms),
        }
    }
}

impl Default for HealthThresholds {
    /// Healthy up to 100ms
    fn default() -> Self {
        Self::new(100)
    }
}
