//! Connection trait

use crate::{QueryResult, Result, StatementResult, Value};
use async_trait::async_trait;

/// Query used by the default liveness round-trip
pub const PING_QUERY: &str = "SELECT 1";

/// A single database session.
///
/// A connection is exclusively owned: either it sits idle inside a pool or
/// exactly one caller holds it. All statement methods therefore take
/// `&mut self`, and implementations need only be `Send`.
#[async_trait]
pub trait Connection: Send {
    /// Get the driver name (e.g., "mysql")
    fn driver_name(&self) -> &str;

    /// Execute a statement that modifies data (INSERT/UPDATE/DELETE)
    async fn execute(&mut self, sql: &str, params: &[Value]) -> Result<StatementResult>;

    /// Execute a query that returns rows (SELECT)
    async fn query(&mut self, sql: &str, params: &[Value]) -> Result<QueryResult>;

    /// Minimal round-trip proving the session still answers.
    ///
    /// Drivers with a protocol-level ping should override this.
    async fn ping(&mut self) -> Result<()> {
        self.query(PING_QUERY, &[]).await.map(|_| ())
    }

    /// Begin an explicit transaction
    async fn begin_transaction(&mut self) -> Result<()> {
        tracing::debug!(driver = self.driver_name(), "beginning transaction");
        self.execute("START TRANSACTION", &[]).await.map(|_| ())
    }

    /// Commit the current transaction
    async fn commit(&mut self) -> Result<()>;

    /// Roll back the current transaction
    async fn rollback(&mut self) -> Result<()>;

    /// Close the session, consuming it
    async fn close(self: Box<Self>) -> Result<()>;

    /// Check if the connection is known to be closed or broken.
    ///
    /// This is a local check and performs no I/O; a `false` answer does
    /// not prove the server side is still there.
    fn is_closed(&self) -> bool;
}
