//! Transaction executor wrapping one pooled connection.

use crate::driver::{Connection, Session, TransactionMode};
use crate::error::DriverError;
use crate::metrics::{EventContext, MetricsSink, RequestEvent};
use crate::pool::PoolKey;
use crate::request::{Outcome, Query, Request, RequestKind};
use serde_json::Value;
use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

/// Per-caller state passed into every execution: who is calling, where the
/// events go, and the shutdown signal that turns in-flight calls into
/// interruptions.
#[derive(Clone)]
pub struct RequestContext {
    actor_id: String,
    sink: Arc<dyn MetricsSink>,
    shutdown: CancellationToken,
}

impl RequestContext {
    pub fn new(
        actor_id: impl Into<String>,
        sink: Arc<dyn MetricsSink>,
        shutdown: CancellationToken,
    ) -> Self {
        Self {
            actor_id: actor_id.into(),
            sink,
            shutdown,
        }
    }

    pub fn actor_id(&self) -> &str {
        &self.actor_id
    }

    pub fn shutdown(&self) -> &CancellationToken {
        &self.shutdown
    }

    pub fn is_shutting_down(&self) -> bool {
        self.shutdown.is_cancelled()
    }
}

impl fmt::Debug for RequestContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RequestContext")
            .field("actor_id", &self.actor_id)
            .field("shutting_down", &self.is_shutting_down())
            .finish()
    }
}

/// Executes transactions against one connection and reports each outcome.
///
/// Clients are created by the [`crate::Pool`] and shared by every actor that
/// acquired the same key.
pub struct Client<C: Connection> {
    id: String,
    key: PoolKey,
    connection: C,
    closed: AtomicBool,
}

impl<C: Connection> Client<C> {
    pub(crate) fn new(key: PoolKey, connection: C) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            key,
            connection,
            closed: AtomicBool::new(false),
        }
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn key(&self) -> &PoolKey {
        &self.key
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Acquire)
    }

    /// Close the underlying connection. Returns `false` if it was already
    /// closed.
    pub(crate) async fn close(&self) -> bool {
        if self.closed.swap(true, Ordering::AcqRel) {
            return false;
        }
        info!("{} closing connection for {}", self, self.key);
        self.connection.close().await;
        true
    }

    /// Run `query` in a read transaction.
    pub async fn read(&self, query: &Query, ctx: &RequestContext) -> Outcome {
        self.execute(RequestKind::Read, query, ctx).await
    }

    /// Run `query` in a write transaction.
    pub async fn write(&self, query: &Query, ctx: &RequestContext) -> Outcome {
        self.execute(RequestKind::Write, query, ctx).await
    }

    /// Execute one transaction and classify the result.
    ///
    /// Emits exactly one event to the context's sink unless the call was
    /// interrupted by shutdown, in which case nothing is reported.
    pub async fn execute(&self, kind: RequestKind, query: &Query, ctx: &RequestContext) -> Outcome {
        let request = Request::new(kind, query, ctx.actor_id());
        let start = Instant::now();

        if ctx.is_shutting_down() || self.is_closed() {
            debug!("{} skipping request from {}: shutting down", self, ctx.actor_id());
            return Outcome::interrupted(start.elapsed());
        }

        let mode = match request.kind {
            RequestKind::Read => TransactionMode::Read,
            RequestKind::Write => TransactionMode::Write,
        };

        let result = tokio::select! {
            biased;
            _ = ctx.shutdown().cancelled() => None,
            result = self.run_in_session(mode, query) => Some(result),
        };
        let elapsed = start.elapsed();

        let outcome = match result {
            None => Outcome::interrupted(elapsed),
            Some(Ok(rows)) => Outcome::completed(rows, elapsed),
            // Errors raised while the run is being torn down are shutdown noise.
            Some(Err(e)) if ctx.is_shutting_down() || self.is_closed() => {
                debug!("{} request interrupted during shutdown: {}", self, e);
                Outcome::interrupted(elapsed)
            }
            Some(Err(e)) => Outcome::failed(e.to_string(), elapsed),
        };

        if !outcome.is_interrupted() {
            ctx.sink.record(self.event(&request, &outcome));
        }
        outcome
    }

    /// Unmetered single-value lookup, used by workload setup.
    pub async fn scalar(&self, query: &Query, column: &str) -> Result<Option<Value>, DriverError> {
        if self.is_closed() {
            return Err(DriverError::Closed);
        }
        let mut session = self.connection.session().await?;
        session.scalar(query.text(), query.params(), column).await
    }

    async fn run_in_session(&self, mode: TransactionMode, query: &Query) -> Result<u64, DriverError> {
        let mut session = self.connection.session().await?;
        session.run(mode, query.text(), query.params()).await
    }

    fn event(&self, request: &Request<'_>, outcome: &Outcome) -> RequestEvent {
        RequestEvent {
            kind: request.kind,
            name: request.query.display_name().to_string(),
            response_time_ms: outcome.latency_ms(),
            response_length: outcome.rows(),
            exception: outcome.error().map(str::to_string),
            context: EventContext {
                actor_id: request.actor_id.to_string(),
                client_id: self.id.clone(),
            },
            timestamp: request.started_at,
        }
    }
}

impl<C: Connection> fmt::Display for Client<C> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Client({})", self.id)
    }
}

impl<C: Connection> fmt::Debug for Client<C> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Client")
            .field("id", &self.id)
            .field("key", &self.key)
            .field("closed", &self.is_closed())
            .finish()
    }
}
