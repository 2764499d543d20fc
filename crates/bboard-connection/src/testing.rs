//! In-memory connection and factory used by the unit tests

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use bboard_core::{BoardError, Connection, QueryResult, Result, StatementResult, Value};
use parking_lot::Mutex;

use crate::ConnectionFactory;

/// Observable state of one mock session, shared with the test
#[derive(Default)]
pub(crate) struct MockState {
    pub(crate) id: usize,
    /// Set to simulate the server dropping the session
    pub(crate) dead: AtomicBool,
    pub(crate) closed: AtomicBool,
    pub(crate) rollbacks: AtomicUsize,
    pub(crate) queries: AtomicUsize,
}

pub(crate) struct MockConnection {
    state: Arc<MockState>,
    ping_delay: Option<Duration>,
}

impl MockConnection {
    fn check(&self) -> Result<()> {
        if self.state.closed.load(Ordering::SeqCst) {
            return Err(BoardError::Connection("connection closed".into()));
        }
        if self.state.dead.load(Ordering::SeqCst) {
            return Err(BoardError::Connection("server has gone away".into()));
        }
        Ok(())
    }
}

#[async_trait]
impl Connection for MockConnection {
    fn driver_name(&self) -> &str {
        "mock"
    }

    async fn execute(&mut self, _sql: &str, _params: &[Value]) -> Result<StatementResult> {
        self.check()?;
        self.state.queries.fetch_add(1, Ordering::SeqCst);
        Ok(StatementResult {
            affected_rows: 1,
            last_insert_id: None,
        })
    }

    async fn query(&mut self, _sql: &str, _params: &[Value]) -> Result<QueryResult> {
        self.check()?;
        self.state.queries.fetch_add(1, Ordering::SeqCst);
        Ok(QueryResult::empty())
    }

    async fn ping(&mut self) -> Result<()> {
        if let Some(delay) = self.ping_delay {
            tokio::time::sleep(delay).await;
        }
        self.check()
    }

    async fn commit(&mut self) -> Result<()> {
        self.check()
    }

    async fn rollback(&mut self) -> Result<()> {
        self.state.rollbacks.fetch_add(1, Ordering::SeqCst);
        self.check()
    }

    async fn close(self: Box<Self>) -> Result<()> {
        self.state.closed.store(true, Ordering::SeqCst);
        Ok(())
    }

    fn is_closed(&self) -> bool {
        self.state.closed.load(Ordering::SeqCst)
    }
}

/// Factory handing out [`MockConnection`]s with scriptable failures
#[derive(Default)]
pub(crate) struct MockFactory {
    attempts: AtomicUsize,
    fail_next: AtomicUsize,
    fail_all: AtomicBool,
    create_delay: Mutex<Option<Duration>>,
    ping_delay: Mutex<Option<Duration>>,
    sessions: Mutex<Vec<Arc<MockState>>>,
}

impl MockFactory {
    pub(crate) fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Fail the next `count` creations, then succeed
    pub(crate) fn failing_first(count: usize) -> Arc<Self> {
        let factory = Self::default();
        factory.fail_next.store(count, Ordering::SeqCst);
        Arc::new(factory)
    }

    pub(crate) fn set_fail_all(&self, fail: bool) {
        self.fail_all.store(fail, Ordering::SeqCst);
    }

    pub(crate) fn set_create_delay(&self, delay: Duration) {
        *self.create_delay.lock() = Some(delay);
    }

    pub(crate) fn set_ping_delay(&self, delay: Duration) {
        *self.ping_delay.lock() = Some(delay);
    }

    /// Number of create calls, successful or not
    pub(crate) fn attempts(&self) -> usize {
        self.attempts.load(Ordering::SeqCst)
    }

    /// Number of sessions successfully opened
    pub(crate) fn created(&self) -> usize {
        self.sessions.lock().len()
    }

    /// State of the `n`-th opened session (1-based)
    pub(crate) fn session(&self, n: usize) -> Arc<MockState> {
        Arc::clone(&self.sessions.lock()[n - 1])
    }

    /// Simulate the server dropping every session opened so far
    pub(crate) fn kill_all(&self) {
        for state in self.sessions.lock().iter() {
            state.dead.store(true, Ordering::SeqCst);
        }
    }

    /// Sessions not yet closed by the pool
    pub(crate) fn open_sessions(&self) -> usize {
        self.sessions
            .lock()
            .iter()
            .filter(|state| !state.closed.load(Ordering::SeqCst))
            .count()
    }
}

#[async_trait]
impl ConnectionFactory for MockFactory {
    async fn create(&self) -> Result<Box<dyn Connection>> {
        self.attempts.fetch_add(1, Ordering::SeqCst);
        let delay = *self.create_delay.lock();
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }

        let scripted_failure = self
            .fail_next
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok();
        if scripted_failure || self.fail_all.load(Ordering::SeqCst) {
            return Err(BoardError::Connection("connection refused".into()));
        }

        let state = {
            let mut sessions = self.sessions.lock();
            let state = Arc::new(MockState {
                id: sessions.len() + 1,
                ..MockState::default()
            });
            sessions.push(Arc::clone(&state));
            state
        };
        Ok(Box::new(MockConnection {
            state,
            ping_delay: *self.ping_delay.lock(),
        }))
    }

    fn describe(&self) -> String {
        "mock".to_string()
    }
}
