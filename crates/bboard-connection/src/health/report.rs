//! Readiness report

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::status::{HealthStatus, HealthThresholds};
use crate::pool::{PoolState, PoolStats};
use crate::{PoolError, PoolErrorKind};

/// Whether the check reached the database
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DatabaseState {
    Connected,
    Disconnected,
}

/// Outcome of a single readiness check.
///
/// Serializes to the shape health endpoints return, e.g.
/// `{"status":"healthy","database":"connected",...}`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HealthReport {
    pub status: HealthStatus,
    pub database: DatabaseState,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub latency_ms: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error_kind: Option<PoolErrorKind>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub pool_state: Option<PoolState>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub pool: Option<PoolStats>,
    pub checked_at: DateTime<Utc>,
}

impl HealthReport {
    /// Report for a check query that completed
    pub fn success(latency: std::time::Duration, thresholds: &HealthThresholds) -> Self {
        Self {
            status: HealthStatus::from_latency_with_thresholds(latency, thresholds),
            database: DatabaseState::Connected,
            latency_ms: Some(latency.as_millis() as u64),
            error: None,
            error_kind: None,
            pool_state: None,
            pool: None,
            checked_at: Utc::now(),
        }
    }

    /// Report for a check that could not run or failed
    pub fn failure(error: &PoolError) -> Self {
        Self {
            status: HealthStatus::Unhealthy,
            database: DatabaseState::Disconnected,
            latency_ms: None,
            error: Some(error.to_string()),
            error_kind: Some(error.root().kind()),
            pool_state: None,
            pool: None,
            checked_at: Utc::now(),
        }
    }

    /// Attach a snapshot of the pool the check went through
    pub fn with_pool(mut self, state: PoolState, stats: PoolStats) -> Self {
        self.pool_state = Some(state);
        self.pool = Some(stats);
        self
    }

    pub fn is_usable(&self) -> bool {
        self.status.is_usable()
    }
}
