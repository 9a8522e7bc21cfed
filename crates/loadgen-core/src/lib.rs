//! Shared client pool, transaction executor and actor lifecycle for
//! graph-loadgen.
//!
//! Many concurrently running actors share a small number of expensive
//! database connections:
//!
//! ```text
//! Actor ──acquire──▶ Pool ──▶ Client (shared, refcounted)
//!   │                           │
//!   │                           ├── Connection::session ─▶ Session::run
//!   │                           └── MetricsSink::record(RequestEvent)
//!   └──release on stop──▶ Pool (closes at refcount 0)
//! ```
//!
//! # Example
//!
//! ```ignore
//! use loadgen_core::{Credentials, Endpoint, Pool, Query, RequestContext};
//!
//! let pool = Pool::new(driver);
//! let endpoint = Endpoint::new("bolt://localhost:7687", Credentials::new("neo4j", "pw"))?;
//! let handle = pool.acquire(&endpoint).await?;
//!
//! let ctx = RequestContext::new("actor-1", sink, shutdown.clone());
//! let (rows, latency_ms, interrupted) = handle
//!     .client()
//!     .read(&Query::new("MATCH (n) RETURN n LIMIT 5"), &ctx)
//!     .await
//!     .as_tuple();
//!
//! pool.release(handle).await;
//! ```

pub mod actor;
pub mod client;
pub mod driver;
pub mod endpoint;
pub mod error;
pub mod metrics;
pub mod pool;
pub mod request;
pub mod testing;

pub use actor::{Actor, ActorReport, ActorState, StepStatus, TaskContext, WaitTime, Workload};
pub use client::{Client, RequestContext};
pub use driver::{Connection, Driver, Session, TransactionMode};
pub use endpoint::{Credentials, Endpoint};
pub use error::{ActorError, ConfigError, DriverError, PoolError};
pub use metrics::{EventContext, MetricsSink, RequestEvent};
pub use pool::{ClientHandle, Pool, PoolKey, PoolStats, ReleaseStatus};
pub use request::{Outcome, OutcomeStatus, Params, Query, Request, RequestKind};
