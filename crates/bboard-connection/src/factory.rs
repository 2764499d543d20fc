//! Connection factory abstraction

use std::sync::Arc;

use async_trait::async_trait;
use bboard_core::{Connection, Result};

/// Opens new database sessions for a pool.
///
/// Implementations return errors instead of panicking and do not register
/// the connection anywhere; the pool takes ownership of what they return.
#[async_trait]
pub trait ConnectionFactory: Send + Sync + 'static {
    /// Open a new session
    async fn create(&self) -> Result<Box<dyn Connection>>;

    /// Human-readable target for log lines (host:port/db or similar)
    fn describe(&self) -> String {
        "database".to_string()
    }
}

#[async_trait]
impl<T: ConnectionFactory> ConnectionFactory for Arc<T> {
    async fn create(&self) -> Result<Box<dyn Connection>> {
        (**self).create().await
    }

    fn describe(&self) -> String {
        (**self).describe()
    }
}
