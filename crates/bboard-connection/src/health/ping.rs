//! Connection ping with latency measurement

use std::time::Duration;

use bboard_core::Connection;
use thiserror::Error;
use tokio::time::Instant;

/// Result of a ping operation
pub type PingResult = Result<Duration, PingError>;

/// Why a ping did not succeed
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum PingError {
    /// The connection already knows it is closed
    #[error("connection is closed")]
    ConnectionClosed,
    /// The round-trip returned an error
    #[error("ping failed: {0}")]
    QueryFailed(String),
    /// No answer within the allowed time
    #[error("ping timed out after {0:?}")]
    Timeout(Duration),
}

/// Ping a connection and return the round-trip time.
///
/// Uses the connection's own [`Connection::ping`], bounded by `timeout`.
/// A connection that reports itself closed is not contacted at all.
pub async fn ping_connection(conn: &mut dyn Connection, timeout: Duration) -> PingResult {
    if conn.is_closed() {
        return Err(PingError::ConnectionClosed);
    }

    let start = Instant::now();
    match tokio::time::timeout(timeout, conn.ping()).await {
        Ok(Ok(())) => Ok(start.elapsed()),
        Ok(Err(e)) => Err(PingError::QueryFailed(e.to_string())),
        Err(_) => Err(PingError::Timeout(timeout)),
    }
}
