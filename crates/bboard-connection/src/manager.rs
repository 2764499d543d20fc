//! Acquisition coordinator: the public entry point to the pool

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::time::Duration;

use bboard_core::{BoardError, PING_QUERY};
use futures::future::BoxFuture;
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use tokio::time::Instant;

use crate::health::{HealthReport, HealthThresholds, LivenessProbe, PingProbe};
use crate::pool::{ConnectionPool, PoolConfig, PoolState, PoolStats, PooledConnection};
use crate::retry::{RetryError, RetryPolicy, retry_with_backoff};
use crate::{ConnectionFactory, PoolError, Result};


/// Settings for a [`ConnectionManager`]
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ManagerConfig {
    pub pool: PoolConfig,
    pub retry: RetryPolicy,
    /// Whether an acquisition after [`ConnectionManager::shutdown`] builds a
    /// fresh pool. When false it fails with [`PoolError::PoolClosed`].
    pub reinitialize_after_shutdown: bool,
}

impl Default for ManagerConfig {
    fn default() -> Self {
        Self {
            pool: PoolConfig::default(),
            retry: RetryPolicy::default(),
            reinitialize_after_shutdown: true,
        }
    }
}

/// Owns the pool and hands out verified connections.
///
/// Every acquisition runs take → probe → replace-if-dead, retried with
/// backoff on failure. The pool is created on first use (or by
/// [`initialize`](Self::initialize)) and re-created if it was shut down.
pub struct ConnectionManager {
    config: ManagerConfig,
    factory: Arc<dyn ConnectionFactory>,
    probe: Arc<dyn LivenessProbe>,
    thresholds: HealthThresholds,
    pool: RwLock<Option<ConnectionPool>>,
    /// Serializes pool construction so concurrent first acquisitions build
    /// one pool, not several
    init_lock: tokio::sync::Mutex<()>,
    shut_down: AtomicBool,
    /// Bumped by every shutdown; an initialization that sees it change
    /// while pre-filling discards its pool
    shutdowns: AtomicU64,
}

impl ConnectionManager {
    /// Create a manager. No connection is opened yet.
    pub fn new(config: ManagerConfig, factory: Arc<dyn ConnectionFactory>) -> Result<Self> {
        config.pool.validate()?;
        config.retry.validate()?;
        Ok(Self {
            config,
            factory,
            probe: Arc::new(PingProbe),
            thresholds: HealthThresholds::default(),
            pool: RwLock::new(None),
            init_lock: tokio::sync::Mutex::new(()),
            shut_down: AtomicBool::new(false),
            shutdowns: AtomicU64::new(0),
        })
    }

    /// Use a custom liveness probe instead of [`PingProbe`]
    pub fn with_probe(mut self, probe: Arc<dyn LivenessProbe>) -> Self {
        self.probe = probe;
        self
    }

    /// Use custom latency thresholds for health reports
    pub fn with_thresholds(mut self, thresholds: HealthThresholds) -> Self {
        self.thresholds = thresholds;
        self
    }

    pub fn config(&self) -> &ManagerConfig {
        &self.config
    }

    /// Build and pre-fill the pool unless an open one already exists.
    ///
    /// Pre-filling is best effort: connections that fail to open are logged
    /// and the pool is installed anyway, growing on demand later.
    ///
    /// A [`shutdown`](Self::shutdown) that arrives while the pool is being
    /// pre-filled wins: the new pool is closed and [`PoolError::PoolClosed`]
    /// is returned.
    #[tracing::instrument(skip(self), fields(target = %self.factory.describe()))]
    pub async fn initialize(&self) -> Result<ConnectionPool> {
        let _guard = self.init_lock.lock().await;
        if let Some(pool) = self.current_pool() {
            return Ok(pool);
        }

        let generation = self.shutdowns.load(Ordering::SeqCst);
        let pool = ConnectionPool::new(self.config.pool.clone(), Arc::clone(&self.factory))?;
        let wanted = self.config.pool.min_connections();
        let created = pool.initialize(wanted).await;
        if created < wanted {
            tracing::warn!(wanted, created, "connection pool only partially filled");
        }

        let installed = {
            let mut current = self.pool.write();
            if self.shutdowns.load(Ordering::SeqCst) == generation {
                self.shut_down.store(false, Ordering::SeqCst);
                *current = Some(pool.clone());
                true
            } else {
                false
            }
        };
        if !installed {
            tracing::info!("shutdown requested during initialization, closing new pool");
            pool.close().await;
            return Err(PoolError::PoolClosed);
        }
        Ok(pool)
    }

    /// Acquire a live connection.
    ///
    /// Up to `retry.max_attempts` attempts are made. A closed pool or bad
    /// configuration ends the loop at once; anything else is retried after
    /// the backoff delay, and the last failure is reported inside
    /// [`PoolError::RetriesExhausted`].
    pub async fn acquire(&self) -> Result<PooledConnection> {
        retry_with_backoff(
            &self.config.retry,
            |e: &PoolError| !e.is_terminal(),
            |attempt| self.try_acquire(attempt),
        )
        .await
        .map_err(|e| match e {
            RetryError::Aborted(e) => e,
            RetryError::Exhausted { attempts, last } => PoolError::RetriesExhausted {
                attempts,
                last: Box::new(last),
            },
        })
    }

    async fn try_acquire(&self, attempt: u32) -> Result<PooledConnection> {
        let pool = self.ensure_pool().await?;
        let mut conn = pool.take(pool.config().acquire_timeout()).await?;

        match self.verify(&pool, &mut conn).await {
            Ok(()) => {
                tracing::debug!(id = conn.id(), attempt, "connection acquired");
                Ok(conn)
            }
            Err(dead) => {
                tracing::warn!(error = %dead, attempt, "dead connection found, creating new one");
                pool.replace(conn).await
            }
        }
    }

    /// Probe a connection according to the pool's probe policy.
    ///
    /// Connections opened for this checkout are not probed.
    async fn verify(&self, pool: &ConnectionPool, conn: &mut PooledConnection) -> Result<()> {
        if conn.is_fresh() || !pool.config().probe_policy().should_probe(conn.last_used_at()) {
            return Ok(());
        }
        if self.probe.is_alive(&mut **conn, pool.config().probe_timeout()).await {
            conn.mark_probed();
            return Ok(());
        }
        pool.record_probe_failure();
        Err(PoolError::ConnectionDead { id: conn.id() })
    }

    async fn ensure_pool(&self) -> Result<ConnectionPool> {
        if let Some(pool) = self.current_pool() {
            return Ok(pool);
        }
        if self.shut_down.load(Ordering::SeqCst) && !self.config.reinitialize_after_shutdown {
            return Err(PoolError::PoolClosed);
        }
        self.initialize().await
    }

    fn current_pool(&self) -> Option<ConnectionPool> {
        self.pool
            .read()
            .as_ref()
            .filter(|pool| !pool.is_closed())
            .cloned()
    }

    /// Run `f` with an acquired connection, releasing it on every exit path.
    ///
    /// Whatever `f` leaves uncommitted is rolled back before the connection
    /// goes back to the pool. A connection-level failure, a failed rollback
    /// or a future dropped before `f` finishes closes the connection instead.
    ///
    /// ```ignore
    /// let posts = manager
    ///     .with_connection(|conn| Box::pin(async move {
    ///         conn.query("SELECT id, title FROM posts ORDER BY id DESC", &[]).await
    ///     }))
    ///     .await?;
    /// ```
    pub async fn with_connection<T, F>(&self, f: F) -> Result<T>
    where
        F: for<'c> FnOnce(&'c mut PooledConnection) -> BoxFuture<'c, bboard_core::Result<T>>,
    {
        let mut conn = self.acquire().await?;
        conn.set_in_flight(true);
        let outcome = f(&mut conn).await;

        let reusable = match &outcome {
            Ok(_) => true,
            Err(e) => {
                tracing::error!(id = conn.id(), error = %e, "database operation failed");
                !e.is_connection_level()
            }
        };
        if reusable {
            if let Err(rollback_err) = conn.rollback().await {
                tracing::warn!(id = conn.id(), error = %rollback_err, "rollback failed");
                conn.mark_broken();
            }
        } else {
            conn.mark_broken();
        }
        conn.set_in_flight(false);

        outcome.map_err(PoolError::Database)
    }

    /// Like [`with_connection`](Self::with_connection), inside an explicit
    /// transaction committed when `f` succeeds.
    pub async fn with_transaction<T, F>(&self, f: F) -> Result<T>
    where
        T: Send + 'static,
        F: for<'c> FnOnce(&'c mut PooledConnection) -> BoxFuture<'c, bboard_core::Result<T>>
            + Send
            + 'static,
    {
        self.with_connection(|conn| {
            Box::pin(async move {
                conn.begin_transaction().await?;
                let value = f(&mut *conn).await?;
                conn.commit().await?;
                Ok(value)
            })
        })
        .await
    }

    /// Close the pool once and drop it, so a later acquisition starts
    /// fresh (or fails fast, per `reinitialize_after_shutdown`).
    ///
    /// Safe to call from several places; only the first call closes
    /// anything. Checked-out connections are closed as they are released.
    pub async fn shutdown(&self) {
        let pool = {
            let mut current = self.pool.write();
            self.shutdowns.fetch_add(1, Ordering::SeqCst);
            self.shut_down.store(true, Ordering::SeqCst);
            current.take()
        };
        match pool {
            Some(pool) => {
                tracing::info!(stats = ?pool.stats(), "shutting down connection pool");
                pool.close().await;
            }
            None => tracing::debug!("connection pool already shut down"),
        }
    }

    /// Whether [`shutdown`](Self::shutdown) was called since the last
    /// initialization
    pub fn is_shut_down(&self) -> bool {
        self.shut_down.load(Ordering::SeqCst)
    }

    /// Readiness check: acquire a connection and run a trivial query, all
    /// within `timeout`.
    pub async fn health_check(&self, timeout: Duration) -> HealthReport {
        let check = self.with_connection(|conn| {
            Box::pin(async move {
                let start = Instant::now();
                conn.query(PING_QUERY, &[]).await?;
                Ok(start.elapsed())
            })
        });

        let outcome = match tokio::time::timeout(timeout, check).await {
            Ok(outcome) => outcome,
            Err(_) => Err(PoolError::Database(BoardError::Timeout(format!(
                "health check did not finish within {:?}",
                timeout
            )))),
        };

        let report = match outcome {
            Ok(latency) => HealthReport::success(latency, &self.thresholds),
            Err(e) => {
                tracing::error!(error = %e, "health check failed");
                HealthReport::failure(&e)
            }
        };

        match self.current_pool() {
            Some(pool) => report.with_pool(pool.state(), pool.stats()),
            None => report,
        }
    }

    /// The current pool, if one is open
    pub fn pool(&self) -> Option<ConnectionPool> {
        self.current_pool()
    }

    /// Occupancy of the current pool; zeroes if there is none
    pub fn stats(&self) -> PoolStats {
        self.current_pool()
            .map(|pool| pool.stats())
            .unwrap_or_default()
    }

    /// Lifecycle state of the current pool
    pub fn state(&self) -> PoolState {
        match self.current_pool() {
            Some(pool) => pool.state(),
            None if self.is_shut_down() => PoolState::Closed,
            None => PoolState::Uninitialized,
        }
    }
}
