//! Connection pool implementation

use std::collections::VecDeque;
use std::ops::{Deref, DerefMut};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use std::time::Duration;

use bboard_core::Connection;
use parking_lot::Mutex;
use tokio::sync::Notify;
use tokio::time::Instant;

use super::config::PoolConfig;
use super::stats::{MetricsCounters, PoolMetrics, PoolState, PoolStats};
use crate::{ConnectionFactory, PoolError, Result};

/// A connection plus the bookkeeping the pool keeps about it
struct Handle {
    conn: Box<dyn Connection>,
    id: u64,
    created_at: Instant,
    last_used_at: Instant,
    last_probed_at: Option<Instant>,
    checkouts: u64,
}

impl Handle {
    fn new(conn: Box<dyn Connection>, id: u64) -> Self {
        let now = Instant::now();
        Self {
            conn,
            id,
            created_at: now,
            last_used_at: now,
            last_probed_at: None,
            checkouts: 0,
        }
    }
}

struct PoolShared {
    config: PoolConfig,
    factory: Arc<dyn ConnectionFactory>,
    /// Idle connections, taken from the front and returned to the back
    idle: Mutex<VecDeque<Handle>>,
    /// Open connections, idle plus checked out. Never locked while `idle`
    /// is held.
    open: Mutex<usize>,
    /// Signalled when a connection is returned or a slot frees up
    available: Notify,
    waiting: AtomicUsize,
    /// Only flipped while `idle` is held, so a release can't slip a handle
    /// into the container after `close` drained it.
    closed: AtomicBool,
    state: Mutex<PoolState>,
    next_id: AtomicU64,
    metrics: MetricsCounters,
}

/// A bounded pool of database connections
///
/// The pool keeps up to `max_connections` sessions open. Idle sessions sit
/// in a FIFO container; callers receive a [`PooledConnection`] guard that
/// returns the session when dropped. Cloning the pool is cheap and every
/// clone refers to the same set of connections.
#[derive(Clone)]
pub struct ConnectionPool {
    shared: Arc<PoolShared>,
}

impl ConnectionPool {
    /// Create an empty pool. No connection is opened until [`initialize`]
    /// or the first [`take`].
    ///
    /// [`initialize`]: ConnectionPool::initialize
    /// [`take`]: ConnectionPool::take
    pub fn new(config: PoolConfig, factory: Arc<dyn ConnectionFactory>) -> Result<Self> {
        config.validate()?;
        Ok(Self {
            shared: Arc::new(PoolShared {
                config,
                factory,
                idle: Mutex::new(VecDeque::new()),
                open: Mutex::new(0),
                available: Notify::new(),
                waiting: AtomicUsize::new(0),
                closed: AtomicBool::new(false),
                state: Mutex::new(PoolState::Uninitialized),
                next_id: AtomicU64::new(1),
                metrics: MetricsCounters::default(),
            }),
        })
    }

    /// Open up to `size` connections (capped at `max_connections`) and
    /// park them idle.
    ///
    /// Creation failures are logged and skipped; the number of connections
    /// actually opened is returned.
    pub async fn initialize(&self, size: usize) -> usize {
        let shared = &self.shared;
        shared.set_state(PoolState::Initializing);

        let target = size.min(shared.config.max_connections());
        let mut created = 0;
        for _ in 0..target {
            let Some(slot) = shared.reserve_slot() else {
                break;
            };
            match shared.open_connection().await {
                Ok(handle) => {
                    slot.commit();
                    shared.push_idle(handle);
                    created += 1;
                }
                Err(e) => {
                    tracing::warn!(error = %e, "connection failed during pool initialization");
                }
            }
        }

        if self.is_closed() {
            return created;
        }
        shared.set_state(if created == target {
            PoolState::Ready
        } else {
            PoolState::Degraded
        });
        tracing::info!(
            requested = target,
            created,
            target = %shared.factory.describe(),
            "connection pool initialized"
        );
        created
    }

    /// Take a connection, waiting up to `timeout` for one to be released.
    ///
    /// An idle connection is preferred. With nothing idle and capacity to
    /// spare, a new connection is opened instead of waiting. Idle
    /// connections past their maximum lifetime are closed and skipped.
    pub async fn take(&self, timeout: Duration) -> Result<PooledConnection> {
        let shared: &PoolShared = &self.shared;
        let deadline = Instant::now() + timeout;

        loop {
            if shared.closed.load(Ordering::Acquire) {
                return Err(PoolError::PoolClosed);
            }

            // Register interest before looking, so a release between the
            // look and the wait still wakes us.
            let notified = shared.available.notified();
            tokio::pin!(notified);
            notified.as_mut().enable();

            if let Some(handle) = shared.pop_idle() {
                return Ok(self.checkout(handle, false));
            }

            if let Some(slot) = shared.reserve_slot() {
                let handle = shared.open_connection().await?;
                let handle = shared.admit(slot, handle)?;
                return Ok(self.checkout(handle, true));
            }

            let _waiting = WaitingGuard::new(&shared.waiting);
            if tokio::time::timeout_at(deadline, notified).await.is_err() {
                tracing::debug!(?timeout, "timed out waiting for a pooled connection");
                return Err(PoolError::PoolExhausted { timeout });
            }
        }
    }

    /// Return a checked-out connection to the pool.
    ///
    /// Equivalent to dropping the guard; never blocks.
    pub fn put(&self, conn: PooledConnection) {
        drop(conn);
    }

    /// Close a dead connection and open a new one in its slot.
    ///
    /// The slot is never given up in between, so a concurrent caller can't
    /// claim it while the replacement is being opened.
    pub async fn replace(&self, mut dead: PooledConnection) -> Result<PooledConnection> {
        let shared: &PoolShared = &self.shared;
        let Some(handle) = dead.handle.take() else {
            return Err(PoolError::PoolClosed);
        };
        let dead_id = handle.id;
        shared.close_in_background(handle);

        // The dead handle's slot now belongs to this reservation.
        let slot = SlotReservation {
            shared,
            armed: true,
        };
        if shared.closed.load(Ordering::Acquire) {
            return Err(PoolError::PoolClosed);
        }

        let handle = match shared.open_connection().await {
            Ok(handle) => handle,
            Err(PoolError::ConnectionCreateFailed(source)) => {
                return Err(PoolError::ReplacementFailed(source));
            }
            Err(other) => return Err(other),
        };
        let handle = shared.admit(slot, handle)?;
        tracing::info!(dead_id, new_id = handle.id, "replaced dead connection");
        Ok(self.checkout(handle, true))
    }

    /// Close the pool: refuse new checkouts, close every idle connection
    /// and reset the open count. Idempotent.
    ///
    /// Checked-out connections are not waited for; they are closed when
    /// released.
    pub async fn close(&self) {
        let shared = &self.shared;
        let drained: Vec<Handle> = {
            let mut idle = shared.idle.lock();
            if shared.closed.swap(true, Ordering::AcqRel) {
                return;
            }
            *shared.state.lock() = PoolState::Closing;
            idle.drain(..).collect()
        };
        *shared.open.lock() = 0;
        shared.available.notify_waiters();

        let count = drained.len();
        for handle in drained {
            let id = handle.id;
            if let Err(e) = handle.conn.close().await {
                tracing::debug!(id, error = %e, "error closing idle connection");
            }
            MetricsCounters::bump(&shared.metrics.closed);
        }

        *shared.state.lock() = PoolState::Closed;
        tracing::info!(closed_idle = count, "connection pool closed");
    }

    /// Whether [`close`](ConnectionPool::close) has been called
    pub fn is_closed(&self) -> bool {
        self.shared.closed.load(Ordering::Acquire)
    }

    /// Get current pool statistics
    pub fn stats(&self) -> PoolStats {
        let idle = self.shared.idle.lock().len();
        let total = (*self.shared.open.lock()).max(idle);
        let waiting = self.shared.waiting.load(Ordering::Relaxed);
        PoolStats::new(total, idle, total - idle, waiting)
    }

    /// Get the lifecycle state
    pub fn state(&self) -> PoolState {
        *self.shared.state.lock()
    }

    /// Get cumulative counters
    pub fn metrics(&self) -> PoolMetrics {
        self.shared.metrics.snapshot()
    }

    /// Get the pool configuration
    pub fn config(&self) -> &PoolConfig {
        &self.shared.config
    }

    pub(crate) fn record_probe_failure(&self) {
        MetricsCounters::bump(&self.shared.metrics.probe_failures);
    }

    fn checkout(&self, mut handle: Handle, fresh: bool) -> PooledConnection {
        handle.checkouts += 1;
        MetricsCounters::bump(&self.shared.metrics.checkouts);
        tracing::trace!(id = handle.id, checkouts = handle.checkouts, "connection checked out");
        PooledConnection {
            handle: Some(handle),
            pool: Arc::clone(&self.shared),
            fresh,
            broken: false,
            in_flight: false,
        }
    }
}

impl PoolShared {
    /// Claim a slot for a new connection if the pool is open and below
    /// capacity.
    fn reserve_slot(&self) -> Option<SlotReservation<'_>> {
        let mut open = self.open.lock();
        if self.closed.load(Ordering::Acquire) || *open >= self.config.max_connections() {
            return None;
        }
        *open += 1;
        Some(SlotReservation {
            shared: self,
            armed: true,
        })
    }

    /// Keep a newly opened handle in its reserved slot, or close it if the
    /// pool closed while it was being opened.
    ///
    /// The check runs under the idle lock, where `close` flips the flag, so
    /// the handle counts as checked out either before the close or not at
    /// all.
    fn admit(&self, slot: SlotReservation<'_>, handle: Handle) -> Result<Handle> {
        let admitted = {
            let _idle = self.idle.lock();
            if self.closed.load(Ordering::Acquire) {
                false
            } else {
                slot.commit();
                true
            }
        };
        if admitted {
            Ok(handle)
        } else {
            // `slot` is given back on return, outside the idle lock
            self.close_in_background(handle);
            Err(PoolError::PoolClosed)
        }
    }

    fn release_slot(&self) {
        {
            let mut open = self.open.lock();
            *open = open.saturating_sub(1);
        }
        self.available.notify_one();
    }

    #[tracing::instrument(skip(self), fields(target = %self.factory.describe()))]
    async fn open_connection(&self) -> Result<Handle> {
        match self.factory.create().await {
            Ok(conn) => {
                let id = self.next_id.fetch_add(1, Ordering::Relaxed);
                MetricsCounters::bump(&self.metrics.created);
                self.transition(&[PoolState::Uninitialized, PoolState::Degraded], PoolState::Ready);
                tracing::debug!(id, "opened new connection");
                Ok(Handle::new(conn, id))
            }
            Err(e) => {
                MetricsCounters::bump(&self.metrics.creation_failures);
                self.transition(&[PoolState::Uninitialized, PoolState::Ready], PoolState::Degraded);
                tracing::warn!(error = %e, "failed to create connection");
                Err(PoolError::ConnectionCreateFailed(e))
            }
        }
    }

    fn pop_idle(&self) -> Option<Handle> {
        loop {
            let handle = self.idle.lock().pop_front()?;
            let expired = self
                .config
                .max_lifetime()
                .is_some_and(|lifetime| handle.created_at.elapsed() >= lifetime);
            if expired {
                self.dispose(handle, "max lifetime exceeded");
                continue;
            }
            return Some(handle);
        }
    }

    fn push_idle(&self, handle: Handle) {
        let rejected = {
            let mut idle = self.idle.lock();
            if self.closed.load(Ordering::Acquire) {
                Some(handle)
            } else {
                idle.push_back(handle);
                None
            }
        };
        match rejected {
            Some(handle) => self.dispose(handle, "pool closed"),
            None => self.available.notify_one(),
        }
    }

    /// Release path: park the handle idle if possible, otherwise close it
    /// and give up its slot.
    fn put(&self, mut handle: Handle) {
        if handle.conn.is_closed() {
            self.dispose(handle, "connection reported closed");
            return;
        }

        handle.last_used_at = Instant::now();
        let rejected = {
            let mut idle = self.idle.lock();
            if self.closed.load(Ordering::Acquire) {
                Some((handle, "pool closed"))
            } else if idle.len() >= self.config.max_idle() {
                Some((handle, "idle container full"))
            } else {
                tracing::trace!(id = handle.id, "connection returned to pool");
                idle.push_back(handle);
                None
            }
        };

        match rejected {
            Some((handle, reason)) => self.dispose(handle, reason),
            None => self.available.notify_one(),
        }
    }

    /// Close a handle and give up its slot
    fn dispose(&self, handle: Handle, reason: &'static str) {
        tracing::debug!(id = handle.id, reason, "disposing connection");
        self.close_in_background(handle);
        self.release_slot();
    }

    /// Close a handle without touching the open count
    fn close_in_background(&self, handle: Handle) {
        MetricsCounters::bump(&self.metrics.closed);
        let id = handle.id;
        match tokio::runtime::Handle::try_current() {
            Ok(runtime) => {
                runtime.spawn(async move {
                    if let Err(e) = handle.conn.close().await {
                        tracing::debug!(id, error = %e, "error closing connection");
                    }
                });
            }
            // Outside a runtime the session is dropped without a goodbye.
            Err(_) => drop(handle),
        }
    }

    fn set_state(&self, state: PoolState) {
        let mut current = self.state.lock();
        if current.is_open() {
            *current = state;
        }
    }

    /// Move to `to` only from one of the `from` states
    fn transition(&self, from: &[PoolState], to: PoolState) {
        let mut current = self.state.lock();
        if from.contains(&current) {
            tracing::debug!(from = ?*current, ?to, "pool state changed");
            *current = to;
        }
    }
}

/// A slot counted in `open` for a connection that is still being opened.
///
/// Dropping it without [`commit`](SlotReservation::commit) gives the slot
/// back, which covers both creation errors and a cancelled caller.
struct SlotReservation<'a> {
    shared: &'a PoolShared,
    armed: bool,
}

impl SlotReservation<'_> {
    fn commit(mut self) {
        self.armed = false;
    }
}

impl Drop for SlotReservation<'_> {
    fn drop(&mut self) {
        if self.armed {
            self.shared.release_slot();
        }
    }
}

struct WaitingGuard<'a>(&'a AtomicUsize);

impl<'a> WaitingGuard<'a> {
    fn new(counter: &'a AtomicUsize) -> Self {
        counter.fetch_add(1, Ordering::Relaxed);
        Self(counter)
    }
}

impl Drop for WaitingGuard<'_> {
    fn drop(&mut self) {
        self.0.fetch_sub(1, Ordering::Relaxed);
    }
}

/// A connection checked out of the pool
///
/// Dereferences to the underlying [`Connection`]. When dropped the
/// connection goes back to the pool. It is closed instead if it was marked
/// broken, if it is released in the middle of scoped work, if the pool has
/// closed, or if the holder is unwinding from a panic.
///
/// Dropping the guard does not roll back an open transaction. Scoped use
/// through [`ConnectionManager::with_connection`] does.
///
/// [`ConnectionManager::with_connection`]: crate::ConnectionManager::with_connection
pub struct PooledConnection {
    handle: Option<Handle>,
    pool: Arc<PoolShared>,
    fresh: bool,
    broken: bool,
    /// Scoped work started and has not finished; the session state is
    /// unknown if the guard is dropped now
    in_flight: bool,
}

impl PooledConnection {
    fn handle(&self) -> &Handle {
        self.handle.as_ref().expect("handle present until drop")
    }

    fn handle_mut(&mut self) -> &mut Handle {
        self.handle.as_mut().expect("handle present until drop")
    }

    /// Pool-assigned identifier, unique within the pool
    pub fn id(&self) -> u64 {
        self.handle().id
    }

    /// When the session was opened
    pub fn created_at(&self) -> Instant {
        self.handle().created_at
    }

    /// When the connection was last returned to the pool
    pub fn last_used_at(&self) -> Instant {
        self.handle().last_used_at
    }

    /// When the connection last passed a liveness probe
    pub fn last_probed_at(&self) -> Option<Instant> {
        self.handle().last_probed_at
    }

    /// Whether the connection was opened for this checkout rather than
    /// taken from the idle container
    pub fn is_fresh(&self) -> bool {
        self.fresh
    }

    /// How many times this connection has been checked out, this time
    /// included
    pub fn checkouts(&self) -> u64 {
        self.handle().checkouts
    }

    pub(crate) fn mark_probed(&mut self) {
        self.handle_mut().last_probed_at = Some(Instant::now());
    }

    /// Close the connection on release instead of returning it
    pub fn mark_broken(&mut self) {
        self.broken = true;
    }

    pub(crate) fn set_in_flight(&mut self, in_flight: bool) {
        self.in_flight = in_flight;
    }

    /// Return the connection to the pool now
    pub fn release(self) {
        drop(self);
    }
}

impl Deref for PooledConnection {
    type Target = dyn Connection;

    fn deref(&self) -> &Self::Target {
        self.handle().conn.as_ref()
    }
}

impl DerefMut for PooledConnection {
    fn deref_mut(&mut self) -> &mut Self::Target {
        self.handle_mut().conn.as_mut()
    }
}

impl Drop for PooledConnection {
    fn drop(&mut self) {
        let Some(handle) = self.handle.take() else {
            return;
        };
        if std::thread::panicking() {
            self.pool.dispose(handle, "released during panic");
        } else if self.broken {
            self.pool.dispose(handle, "marked broken");
        } else if self.in_flight {
            self.pool.dispose(handle, "released with work in flight");
        } else {
            self.pool.put(handle);
        }
    }
}

impl std::fmt::Debug for PooledConnection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match &self.handle {
            Some(handle) => f
                .debug_struct("PooledConnection")
                .field("id", &handle.id)
                .field("driver", &handle.conn.driver_name())
                .field("checkouts", &handle.checkouts)
                .finish(),
            None => f.write_str("PooledConnection(released)"),
        }
    }
}
