//! bboard connection - pooling, acquisition and shutdown
//!
//! The pieces, leaves first:
//!
//! - [`ConnectionFactory`] opens single sessions
//! - [`LivenessProbe`] decides whether a session still answers
//! - [`ConnectionPool`] bounds and recycles sessions
//! - [`ConnectionManager`] takes, probes, replaces and retries, and owns
//!   the pool's lifecycle including shutdown

mod error;
mod factory;
pub mod health;
mod manager;
pub mod pool;
pub mod retry;
mod shutdown;

#[cfg(test)]
mod testing;

pub use error::{PoolError, PoolErrorKind, Result};
pub use factory::ConnectionFactory;
pub use health::{
    DatabaseState, HealthReport, HealthStatus, HealthThresholds, LivenessProbe, PingError,
    PingProbe, PingResult, ProbePolicy, ping_connection,
};
pub use manager::{ConnectionManager, ManagerConfig};
pub use pool::{ConnectionPool, PoolConfig, PoolMetrics, PoolState, PoolStats, PooledConnection};
pub use retry::{BackoffStrategy, RetryError, RetryPolicy, retry_with_backoff};
pub use shutdown::{shutdown_signal, spawn_shutdown_on, spawn_shutdown_on_signal};
