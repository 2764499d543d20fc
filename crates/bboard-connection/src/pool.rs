//! Bounded connection pool
//!
//! The pool owns the "open connections" invariant: idle plus checked-out
//! connections never exceed `max_connections`, and every connection leaving
//! a caller's hands is either parked idle or closed with its slot given
//! back.
//!
//! # Example
//!
//! ```ignore
//! use bboard_connection::pool::{ConnectionPool, PoolConfig};
//!
//! let config = PoolConfig::new(2, 10).with_acquire_timeout_ms(5_000);
//! let pool = ConnectionPool::new(config, factory)?;
//! pool.initialize(pool.config().min_connections()).await;
//!
//! let mut conn = pool.take(pool.config().acquire_timeout()).await?;
//! conn.query("SELECT 1", &[]).await?;
//! // Connection returned to pool on drop
//! ```

mod config;
mod pool;
mod stats;


pub use config::PoolConfig;
pub use pool::{ConnectionPool, PooledConnection};
pub use stats::{PoolMetrics, PoolState, PoolStats};
