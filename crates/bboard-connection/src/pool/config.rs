//! Pool configuration types

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::PoolError;
use crate::health::ProbePolicy;

/// Configuration for a connection pool
///
/// Controls pool sizing, timeouts, liveness probing and connection lifetime.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PoolConfig {
    /// Upper bound on idle plus checked-out connections
    max_connections: usize,
    /// Connections opened when the pool is initialized
    min_connections: usize,
    /// Most connections kept idle; releases beyond this are closed
    max_idle: Option<usize>,
    /// Timeout in milliseconds when taking a connection from the pool
    acquire_timeout_ms: u64,
    /// Timeout in milliseconds for a single liveness probe
    probe_timeout_ms: u64,
    /// Only probe connections idle for at least this long; `None` probes
    /// on every checkout
    probe_after_idle_ms: Option<u64>,
    /// Maximum lifetime of a connection in milliseconds before it's recycled
    max_lifetime_ms: Option<u64>,
}

impl PoolConfig {
    /// Create a new pool configuration with the given min and max sizes
    pub fn new(min_connections: usize, max_connections: usize) -> Self {
        Self {
            min_connections,
            max_connections,
            ..Self::default()
        }
    }

    /// Set the number of connections kept idle at most
    pub fn with_max_idle(mut self, max_idle: usize) -> Self {
        self.max_idle = Some(max_idle);
        self
    }

    /// Set the acquire timeout in milliseconds
    pub fn with_acquire_timeout_ms(mut self, timeout_ms: u64) -> Self {
        self.acquire_timeout_ms = timeout_ms;
        self
    }

    /// Set the liveness probe timeout in milliseconds
    pub fn with_probe_timeout_ms(mut self, timeout_ms: u64) -> Self {
        self.probe_timeout_ms = timeout_ms;
        self
    }

    /// Set how often checked-out connections are probed
    pub fn with_probe_policy(mut self, policy: ProbePolicy) -> Self {
        self.probe_after_idle_ms = match policy {
            ProbePolicy::EveryCheckout => None,
            ProbePolicy::IdleFor(idle) => Some(idle.as_millis() as u64),
        };
        self
    }

    /// Set the maximum connection lifetime in milliseconds
    pub fn with_max_lifetime_ms(mut self, lifetime_ms: u64) -> Self {
        self.max_lifetime_ms = Some(lifetime_ms);
        self
    }

    /// Get the maximum number of connections
    pub fn max_connections(&self) -> usize {
        self.max_connections
    }

    /// Get the number of connections opened on initialization
    pub fn min_connections(&self) -> usize {
        self.min_connections
    }

    /// Get the idle container capacity
    pub fn max_idle(&self) -> usize {
        self.max_idle
            .map_or(self.max_connections, |idle| idle.min(self.max_connections))
    }

    /// Get the acquire timeout as a Duration
    pub fn acquire_timeout(&self) -> Duration {
        Duration::from_millis(self.acquire_timeout_ms)
    }

    /// Get the probe timeout as a Duration
    pub fn probe_timeout(&self) -> Duration {
        Duration::from_millis(self.probe_timeout_ms)
    }

    /// Get the probe policy
    pub fn probe_policy(&self) -> ProbePolicy {
        match self.probe_after_idle_ms {
            Some(ms) => ProbePolicy::IdleFor(Duration::from_millis(ms)),
            None => ProbePolicy::EveryCheckout,
        }
    }

    /// Get the maximum lifetime as a Duration if set
    pub fn max_lifetime(&self) -> Option<Duration> {
        self.max_lifetime_ms.map(Duration::from_millis)
    }

    /// Reject sizes and timeouts the pool cannot operate with
    pub fn validate(&self) -> Result<(), PoolError> {
        if self.max_connections == 0 {
            return Err(PoolError::Configuration(
                "max_connections must be greater than 0".into(),
            ));
        }
        if self.min_connections > self.max_connections {
            return Err(PoolError::Configuration(format!(
                "min_connections ({}) cannot exceed max_connections ({})",
                self.min_connections, self.max_connections
            )));
        }
        if self.max_idle == Some(0) {
            return Err(PoolError::Configuration(
                "max_idle must be greater than 0".into(),
            ));
        }
        if self.acquire_timeout_ms == 0 || self.probe_timeout_ms == 0 {
            return Err(PoolError::Configuration(
                "acquire and probe timeouts must be greater than 0".into(),
            ));
        }
        Ok(())
    }
}

impl Default for PoolConfig {
    /// Create a default pool configuration
    ///
    /// Defaults:
    /// - max_connections: 10, all opened on initialization
    /// - acquire_timeout: 30 seconds
    /// - probe_timeout: 5 seconds, probing on every checkout
    /// - max_lifetime: None
    fn default() -> Self {
        Self {
            max_connections: 10,
            min_connections: 10,
            max_idle: None,
            acquire_timeout_ms: 30_000,
            probe_timeout_ms: 5_000,
            probe_after_idle_ms: None,
            max_lifetime_ms: None,
        }
    }
}
