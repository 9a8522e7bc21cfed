//! Simulated users.
//!
//! An [`Actor`] owns the lifecycle (`Idle → Started → Running → Stopped`) and
//! the pooled client; what it actually does is supplied by a [`Workload`].

use crate::client::{Client, RequestContext};
use crate::driver::{Connection, Driver};
use crate::endpoint::Endpoint;
use crate::error::{ActorError, DriverError};
use crate::metrics::MetricsSink;
use crate::pool::{ClientHandle, Pool, ReleaseStatus};
use crate::request::{Outcome, Query};
use async_trait::async_trait;
use futures::FutureExt;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use serde::Serialize;
use serde_json::Value;
use std::any::Any;
use std::fmt;
use std::panic::AssertUnwindSafe;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

/// The behaviour of one kind of simulated user.
#[async_trait]
pub trait Workload: Send + 'static {
    fn name(&self) -> &str;

    /// Called once after the actor acquired its client. An error stops the
    /// actor before it runs any task.
    async fn on_start<C: Connection>(&mut self, _ctx: &TaskContext<'_, C>) -> Result<(), ActorError> {
        Ok(())
    }

    /// One unit of work. Failed transactions are reported through the
    /// metrics sink and do not need handling here.
    async fn run_task<C: Connection>(&mut self, ctx: &TaskContext<'_, C>);

    /// Called once before the client is released.
    async fn on_stop(&mut self) {}
}

/// What a workload can do while its actor holds a client.
///
/// Only built by [`Actor`] from a live lease, so a workload can never
/// execute against a released client.
pub struct TaskContext<'a, C: Connection> {
    client: &'a Client<C>,
    request: &'a RequestContext,
    interrupted: AtomicBool,
}

impl<'a, C: Connection> TaskContext<'a, C> {
    fn new(client: &'a Client<C>, request: &'a RequestContext) -> Self {
        Self {
            client,
            request,
            interrupted: AtomicBool::new(false),
        }
    }

    pub async fn read(&self, query: &Query) -> Outcome {
        let outcome = self.client.read(query, self.request).await;
        self.observe(&outcome);
        outcome
    }

    pub async fn write(&self, query: &Query) -> Outcome {
        let outcome = self.client.write(query, self.request).await;
        self.observe(&outcome);
        outcome
    }

    /// Unmetered lookup of `column` from the first row of `query`.
    pub async fn scalar(&self, query: &Query, column: &str) -> Result<Option<Value>, DriverError> {
        self.client.scalar(query, column).await
    }

    pub fn actor_id(&self) -> &str {
        self.request.actor_id()
    }

    pub fn client_id(&self) -> &str {
        self.client.id()
    }

    /// Whether any execution in this context was interrupted.
    pub fn is_interrupted(&self) -> bool {
        self.interrupted.load(Ordering::Acquire)
    }

    fn observe(&self, outcome: &Outcome) {
        if outcome.is_interrupted() {
            self.interrupted.store(true, Ordering::Release);
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum ActorState {
    Idle,
    Started,
    Running,
    Stopped,
}

impl fmt::Display for ActorState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ActorState::Idle => write!(f, "idle"),
            ActorState::Started => write!(f, "started"),
            ActorState::Running => write!(f, "running"),
            ActorState::Stopped => write!(f, "stopped"),
        }
    }
}

/// Think time between two tasks, drawn uniformly in whole milliseconds.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WaitTime {
    min_ms: u64,
    max_ms: u64,
}

impl WaitTime {
    pub fn none() -> Self {
        Self { min_ms: 0, max_ms: 0 }
    }

    pub fn constant(wait: Duration) -> Self {
        let ms = duration_ms(wait);
        Self { min_ms: ms, max_ms: ms }
    }

    /// Bounds are reordered if given backwards.
    pub fn between(min: Duration, max: Duration) -> Self {
        let (a, b) = (duration_ms(min), duration_ms(max));
        Self {
            min_ms: a.min(b),
            max_ms: a.max(b),
        }
    }

    pub fn sample<R: Rng + ?Sized>(&self, rng: &mut R) -> Duration {
        if self.min_ms == self.max_ms {
            return Duration::from_millis(self.min_ms);
        }
        Duration::from_millis(rng.random_range(self.min_ms..=self.max_ms))
    }
}

impl Default for WaitTime {
    fn default() -> Self {
        Self::none()
    }
}

fn duration_ms(d: Duration) -> u64 {
    u64::try_from(d.as_millis()).unwrap_or(u64::MAX)
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        s.to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "non-string panic payload".to_string()
    }
}

/// Result of a single [`Actor::step`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StepStatus {
    Continue,
    /// The task was interrupted; the actor has stopped.
    Interrupted,
}

/// Summary of a finished [`Actor::run`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ActorReport {
    pub actor_id: String,
    pub workload: String,
    pub tasks: u64,
    pub interrupted: bool,
    pub release: Option<ReleaseStatus>,
}

/// A simulated user: one client lease, one workload, one task loop.
pub struct Actor<D: Driver, W: Workload> {
    id: String,
    endpoint: Endpoint,
    pool: Arc<Pool<D>>,
    workload: W,
    context: RequestContext,
    handle: Option<ClientHandle<D::Connection>>,
    state: ActorState,
    wait: WaitTime,
    tasks: u64,
    interrupted: bool,
}

impl<D: Driver, W: Workload> Actor<D, W> {
    pub fn new(
        id: impl Into<String>,
        endpoint: Endpoint,
        pool: Arc<Pool<D>>,
        workload: W,
        sink: Arc<dyn MetricsSink>,
        shutdown: CancellationToken,
    ) -> Self {
        let id = id.into();
        Self {
            context: RequestContext::new(id.clone(), sink, shutdown),
            id,
            endpoint,
            pool,
            workload,
            handle: None,
            state: ActorState::Idle,
            wait: WaitTime::none(),
            tasks: 0,
            interrupted: false,
        }
    }

    pub fn with_wait(mut self, wait: WaitTime) -> Self {
        self.wait = wait;
        self
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn state(&self) -> ActorState {
        self.state
    }

    pub fn tasks_run(&self) -> u64 {
        self.tasks
    }

    pub fn workload(&self) -> &W {
        &self.workload
    }

    pub fn holds_client(&self) -> bool {
        self.handle.is_some()
    }

    /// Acquire a client and run the workload's setup.
    pub async fn start(&mut self) -> Result<(), ActorError> {
        if self.state != ActorState::Idle {
            return Err(ActorError::AlreadyStarted(self.id.clone()));
        }

        let handle = match self.pool.acquire(&self.endpoint).await {
            Ok(handle) => handle,
            Err(e) => {
                self.state = ActorState::Stopped;
                return Err(e.into());
            }
        };

        let ctx = TaskContext::new(handle.client(), &self.context);
        let setup = self.workload.on_start(&ctx).await;
        drop(ctx);

        if let Err(e) = setup {
            warn!("Actor {}: {} setup failed: {}", self.id, self.workload.name(), e);
            self.pool.release(handle).await;
            self.state = ActorState::Stopped;
            return Err(e);
        }

        info!(
            "Actor {} started ({}) on {}",
            self.id,
            self.workload.name(),
            handle.client()
        );
        self.handle = Some(handle);
        self.state = ActorState::Started;
        Ok(())
    }

    /// Run one task. Stops the actor if the task was interrupted.
    pub async fn step(&mut self) -> Result<StepStatus, ActorError> {
        let Some(handle) = self.handle.as_ref() else {
            return Err(ActorError::NotRunning(self.id.clone()));
        };
        self.state = ActorState::Running;

        let ctx = TaskContext::new(handle.client(), &self.context);
        let task = AssertUnwindSafe(self.workload.run_task(&ctx))
            .catch_unwind()
            .await;
        let interrupted = ctx.is_interrupted();
        drop(ctx);
        self.tasks += 1;

        if let Err(payload) = task {
            let message = panic_message(payload.as_ref());
            error!("Actor {}: task panicked, stopping: {}", self.id, message);
            self.stop().await;
            return Err(ActorError::TaskPanicked {
                actor: self.id.clone(),
                message,
            });
        }

        if interrupted || self.context.is_shutting_down() {
            debug!("Actor {}: task interrupted, stopping", self.id);
            self.interrupted = true;
            self.stop().await;
            return Ok(StepStatus::Interrupted);
        }
        Ok(StepStatus::Continue)
    }

    /// Run the workload's teardown and release the client.
    ///
    /// Safe to call more than once; only the first call touches the pool.
    pub async fn stop(&mut self) -> Option<ReleaseStatus> {
        let handle = self.handle.take();
        self.state = ActorState::Stopped;
        let handle = handle?;

        self.workload.on_stop().await;
        let status = self.pool.release(handle).await;
        info!(
            "Actor {} stopped after {} task(s): {:?}",
            self.id, self.tasks, status
        );
        Some(status)
    }

    /// Start, loop over tasks until shutdown or interruption, then stop.
    pub async fn run(mut self) -> Result<ActorReport, ActorError> {
        self.start().await?;
        let mut rng = StdRng::from_os_rng();

        loop {
            if self.context.is_shutting_down() {
                self.interrupted = true;
                break;
            }
            if self.step().await? == StepStatus::Interrupted {
                break;
            }

            let wait = self.wait.sample(&mut rng);
            if wait.is_zero() {
                tokio::task::yield_now().await;
                continue;
            }
            tokio::select! {
                _ = self.context.shutdown().cancelled() => {
                    self.interrupted = true;
                    break;
                }
                _ = tokio::time::sleep(wait) => {}
            }
        }
        let release = self.stop().await;

        Ok(ActorReport {
            actor_id: self.id.clone(),
            workload: self.workload.name().to_string(),
            tasks: self.tasks,
            interrupted: self.interrupted,
            release,
        })
    }
}

impl<D: Driver, W: Workload> fmt::Debug for Actor<D, W> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Actor")
            .field("id", &self.id)
            .field("workload", &self.workload.name())
            .field("state", &self.state)
            .field("tasks", &self.tasks)
            .finish()
    }
}
