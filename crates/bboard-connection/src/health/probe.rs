//! Liveness probing for checked-out connections

use std::time::Duration;

use async_trait::async_trait;
use bboard_core::Connection;
use tokio::time::Instant;

use super::ping::ping_connection;

/// Decides whether a connection is still usable.
///
/// Any error or timeout counts as "not alive"; the underlying error is
/// logged, never returned.
#[async_trait]
pub trait LivenessProbe: Send + Sync + 'static {
    async fn is_alive(&self, conn: &mut dyn Connection, timeout: Duration) -> bool;
}

/// Default probe: a [`Connection::ping`] round-trip
#[derive(Debug, Clone, Copy, Default)]
pub struct PingProbe;

#[async_trait]
impl LivenessProbe for PingProbe {
    async fn is_alive(&self, conn: &mut dyn Connection, timeout: Duration) -> bool {
        match ping_connection(conn, timeout).await {
            Ok(latency) => {
                tracing::trace!(?latency, "liveness probe passed");
                true
            }
            Err(e) => {
                tracing::warn!(error = %e, driver = conn.driver_name(), "liveness probe failed");
                false
            }
        }
    }
}

/// How often checked-out connections are probed
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ProbePolicy {
    /// Probe every connection handed out of the idle container
    #[default]
    EveryCheckout,
    /// Skip the probe for connections returned less than this long ago
    IdleFor(Duration),
}

impl ProbePolicy {
    /// Whether a connection last returned at `last_used_at` needs probing
    pub fn should_probe(&self, last_used_at: Instant) -> bool {
        match self {
            ProbePolicy::EveryCheckout => true,
            ProbePolicy::IdleFor(threshold) => last_used_at.elapsed() >= *threshold,
        }
    }
}
