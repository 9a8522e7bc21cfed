//! In-memory driver and recording sink for tests.
//!
//! `MemoryDriver` never touches the network. Statements are answered from a
//! table of scripted [`Behavior`]s (unknown statements return zero rows), and
//! every open, close, session and transaction is counted so tests can assert
//! on connection lifetimes.

use crate::driver::{Connection, Driver, Session, TransactionMode};
use crate::endpoint::Endpoint;
use crate::error::DriverError;
use crate::metrics::{MetricsSink, RequestEvent};
use crate::request::Params;
use async_trait::async_trait;
use serde_json::Value;
use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Scripted response for one statement.
#[derive(Debug, Clone)]
pub struct Behavior {
    result: Result<u64, String>,
    delay: Option<Duration>,
}

impl Behavior {
    pub fn rows(rows: u64) -> Self {
        Self {
            result: Ok(rows),
            delay: None,
        }
    }

    pub fn fail(message: impl Into<String>) -> Self {
        Self {
            result: Err(message.into()),
            delay: None,
        }
    }

    /// Sleep before answering, to simulate a slow query.
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }
}

#[derive(Default)]
struct MemoryState {
    behaviors: Mutex<HashMap<String, Behavior>>,
    scalars: Mutex<HashMap<String, Value>>,
    failing_uris: Mutex<HashSet<String>>,
    open_delay: Mutex<Option<Duration>>,
    calls: Mutex<Vec<(TransactionMode, String)>>,
    opens: AtomicUsize,
    closes: AtomicUsize,
    sessions: AtomicUsize,
    use_after_close: AtomicUsize,
}

/// Driver backed by scripted in-memory behaviour. Clones share state.
#[derive(Clone, Default)]
pub struct MemoryDriver {
    state: Arc<MemoryState>,
}

impl MemoryDriver {
    pub fn new() -> Self {
        Self::default()
    }

    /// Answer `statement` with `behavior` from now on.
    pub fn on_statement(&self, statement: &str, behavior: Behavior) {
        lock(&self.state.behaviors).insert(statement.to_string(), behavior);
    }

    /// Value returned by [`Session::scalar`] for `statement`.
    pub fn on_scalar(&self, statement: &str, value: Value) {
        lock(&self.state.scalars).insert(statement.to_string(), value);
    }

    /// Make every open for `uri` fail.
    pub fn fail_open(&self, uri: &str) {
        lock(&self.state.failing_uris).insert(uri.to_string());
    }

    /// Sleep this long inside every open, widening acquire races.
    pub fn with_open_delay(self, delay: Duration) -> Self {
        *lock(&self.state.open_delay) = Some(delay);
        self
    }

    pub fn opens(&self) -> usize {
        self.state.opens.load(Ordering::SeqCst)
    }

    pub fn closes(&self) -> usize {
        self.state.closes.load(Ordering::SeqCst)
    }

    pub fn sessions(&self) -> usize {
        self.state.sessions.load(Ordering::SeqCst)
    }

    /// Transactions run so far, in order.
    pub fn calls(&self) -> Vec<(TransactionMode, String)> {
        lock(&self.state.calls).clone()
    }

    /// Sessions requested from a connection that was already closed.
    pub fn use_after_close(&self) -> usize {
        self.state.use_after_close.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Driver for MemoryDriver {
    type Connection = MemoryConnection;

    async fn open(&self, endpoint: &Endpoint) -> Result<MemoryConnection, DriverError> {
        let delay = *lock(&self.state.open_delay);
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
        if lock(&self.state.failing_uris).contains(endpoint.uri()) {
            return Err(DriverError::Connect(format!(
                "connection refused: {}",
                endpoint.uri()
            )));
        }
        self.state.opens.fetch_add(1, Ordering::SeqCst);
        Ok(MemoryConnection {
            state: Arc::clone(&self.state),
            closed: Arc::new(AtomicBool::new(false)),
        })
    }
}

pub struct MemoryConnection {
    state: Arc<MemoryState>,
    closed: Arc<AtomicBool>,
}

impl MemoryConnection {
    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Connection for MemoryConnection {
    type Session = MemorySession;

    async fn session(&self) -> Result<MemorySession, DriverError> {
        if self.is_closed() {
            self.state.use_after_close.fetch_add(1, Ordering::SeqCst);
            return Err(DriverError::Closed);
        }
        self.state.sessions.fetch_add(1, Ordering::SeqCst);
        Ok(MemorySession {
            state: Arc::clone(&self.state),
            closed: Arc::clone(&self.closed),
        })
    }

    async fn close(&self) {
        if !self.closed.swap(true, Ordering::SeqCst) {
            self.state.closes.fetch_add(1, Ordering::SeqCst);
        }
    }
}

pub struct MemorySession {
    state: Arc<MemoryState>,
    closed: Arc<AtomicBool>,
}

#[async_trait]
impl Session for MemorySession {
    async fn run(
        &mut self,
        mode: TransactionMode,
        statement: &str,
        _params: &Params,
    ) -> Result<u64, DriverError> {
        lock(&self.state.calls).push((mode, statement.to_string()));
        let behavior = lock(&self.state.behaviors)
            .get(statement)
            .cloned()
            .unwrap_or_else(|| Behavior::rows(0));

        if let Some(delay) = behavior.delay {
            tokio::time::sleep(delay).await;
        }
        if self.closed.load(Ordering::SeqCst) {
            self.state.use_after_close.fetch_add(1, Ordering::SeqCst);
            return Err(DriverError::Closed);
        }
        behavior.result.map_err(DriverError::Query)
    }

    async fn scalar(
        &mut self,
        statement: &str,
        _params: &Params,
        _column: &str,
    ) -> Result<Option<Value>, DriverError> {
        Ok(lock(&self.state.scalars).get(statement).cloned())
    }
}

/// Sink that keeps every event in memory.
#[derive(Default)]
pub struct RecordingSink {
    events: Mutex<Vec<RequestEvent>>,
}

impl RecordingSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn events(&self) -> Vec<RequestEvent> {
        lock(&self.events).clone()
    }

    pub fn len(&self) -> usize {
        lock(&self.events).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl MetricsSink for RecordingSink {
    fn record(&self, event: RequestEvent) {
        lock(&self.events).push(event);
    }
}
