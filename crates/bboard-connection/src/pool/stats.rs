//! Pool statistics, lifecycle state and counters

use std::sync::atomic::{AtomicU64, Ordering};

use serde::{Deserialize, Serialize};

/// Snapshot of a connection pool's occupancy
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PoolStats {
    /// Total number of connections (idle + checked out)
    total: usize,
    /// Number of idle connections available in the pool
    idle: usize,
    /// Number of connections currently checked out
    active: usize,
    /// Number of callers waiting for a connection
    waiting: usize,
}

impl PoolStats {
    pub fn new(total: usize, idle: usize, active: usize, waiting: usize) -> Self {
        Self {
            total,
            idle,
            active,
            waiting,
        }
    }

    /// Get the total number of connections
    pub fn total(&self) -> usize {
        self.total
    }

    /// Get the number of idle connections
    pub fn idle(&self) -> usize {
        self.idle
    }

    /// Get the number of checked-out connections
    pub fn active(&self) -> usize {
        self.active
    }

    /// Get the number of waiting callers
    pub fn waiting(&self) -> usize {
        self.waiting
    }

    /// Fraction of open connections that are checked out (0.0 to 1.0)
    pub fn utilization(&self) -> f64 {
        if self.total == 0 {
            0.0
        } else {
            self.active as f64 / self.total as f64
        }
    }

    /// Check if every open connection is checked out
    pub fn is_full(&self) -> bool {
        self.idle == 0 && self.total > 0
    }
}

impl Default for PoolStats {
    fn default() -> Self {
        Self::new(0, 0, 0, 0)
    }
}

/// Lifecycle of a pool.
///
/// `Uninitialized → Initializing → Ready ⇄ Degraded → Closing → Closed`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PoolState {
    Uninitialized,
    Initializing,
    /// All requested connections opened and the last creation succeeded
    Ready,
    /// Serving, but the most recent creation attempt failed
    Degraded,
    Closing,
    Closed,
}

impl PoolState {
    /// Whether the pool can still hand out connections
    pub fn is_open(&self) -> bool {
        !matches!(self, PoolState::Closing | PoolState::Closed)
    }
}

/// Cumulative counters since the pool was created
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PoolMetrics {
    pub connections_created: u64,
    pub connections_closed: u64,
    pub checkouts: u64,
    pub creation_failures: u64,
    pub probe_failures: u64,
}

#[derive(Default)]
pub(super) struct MetricsCounters {
    pub(super) created: AtomicU64,
    pub(super) closed: AtomicU64,
    pub(super) checkouts: AtomicU64,
    pub(super) creation_failures: AtomicU64,
    pub(super) probe_failures: AtomicU64,
}

impl MetricsCounters {
    pub(super) fn bump(counter: &AtomicU64) {
        counter.fetch_add(1, Ordering::Relaxed);
    }

    pub(super) fn snapshot(&self) -> PoolMetrics {
        PoolMetrics {
            connections_created: self.created.load(Ordering::Relaxed),
            connections_closed: self.closed.load(Ordering::Relaxed),
            checkouts: self.checkouts.load(Ordering::Relaxed),
            creation_failures: self.creation_failures.load(Ordering::Relaxed),
            probe_failures: self.probe_failures.load(Ordering::Relaxed),
        }
    }
}
