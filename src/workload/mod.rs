//! Workloads run by simulated users.

mod ldbc;
mod random;

pub use ldbc::{LdbcUser, LDBC_IC6_QUERY, MAX_PERSON_ID_QUERY, MAX_TAG_ID};
pub use random::{
    RandomReader, RandomWriter, CREATE_LINK_QUERY, MAX_NODE_ID_QUERY, RANDOM_READ_QUERY,
};

use async_trait::async_trait;
use clap::ValueEnum;
use loadgen_core::{ActorError, Connection, Query, TaskContext, Workload};
use rand::rngs::StdRng;
use serde::Deserialize;
use serde_json::Value;
use std::fmt;

/// Column every max-id lookup returns.
const MAX_ID_COLUMN: &str = "maxId";

/// Workload selectable on the command line.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, ValueEnum, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum WorkloadKind {
    /// Traverse up to three hops from a random node
    #[default]
    RandomReader,
    /// Link two random nodes
    RandomWriter,
    /// LDBC interactive complex query 6 (tag co-occurrence)
    Ldbc,
}

impl fmt::Display for WorkloadKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            WorkloadKind::RandomReader => write!(f, "random-reader"),
            WorkloadKind::RandomWriter => write!(f, "random-writer"),
            WorkloadKind::Ldbc => write!(f, "ldbc"),
        }
    }
}

/// One of the built-in workloads.
pub enum AnyWorkload {
    RandomReader(RandomReader),
    RandomWriter(RandomWriter),
    Ldbc(LdbcUser),
}

impl AnyWorkload {
    pub fn new(kind: WorkloadKind, rng: StdRng) -> Self {
        match kind {
            WorkloadKind::RandomReader => AnyWorkload::RandomReader(RandomReader::new(rng)),
            WorkloadKind::RandomWriter => AnyWorkload::RandomWriter(RandomWriter::new(rng)),
            WorkloadKind::Ldbc => AnyWorkload::Ldbc(LdbcUser::new(rng)),
        }
    }
}

#[async_trait]
impl Workload for AnyWorkload {
    fn name(&self) -> &str {
        match self {
            AnyWorkload::RandomReader(w) => w.name(),
            AnyWorkload::RandomWriter(w) => w.name(),
            AnyWorkload::Ldbc(w) => w.name(),
        }
    }

    async fn on_start<C: Connection>(&mut self, ctx: &TaskContext<'_, C>) -> Result<(), ActorError> {
        match self {
            AnyWorkload::RandomReader(w) => w.on_start(ctx).await,
            AnyWorkload::RandomWriter(w) => w.on_start(ctx).await,
            AnyWorkload::Ldbc(w) => w.on_start(ctx).await,
        }
    }

    async fn run_task<C: Connection>(&mut self, ctx: &TaskContext<'_, C>) {
        match self {
            AnyWorkload::RandomReader(w) => w.run_task(ctx).await,
            AnyWorkload::RandomWriter(w) => w.run_task(ctx).await,
            AnyWorkload::Ldbc(w) => w.run_task(ctx).await,
        }
    }

    async fn on_stop(&mut self) {
        match self {
            AnyWorkload::RandomReader(w) => w.on_stop().await,
            AnyWorkload::RandomWriter(w) => w.on_stop().await,
            AnyWorkload::Ldbc(w) => w.on_stop().await,
        }
    }
}

/// Run a `RETURN max(...) AS maxId` lookup. `None` when the graph has no
/// matching nodes.
async fn lookup_max_id<C: Connection>(
    ctx: &TaskContext<'_, C>,
    statement: &str,
) -> Result<Option<i64>, ActorError> {
    match ctx.scalar(&Query::new(statement), MAX_ID_COLUMN).await? {
        None | Some(Value::Null) => Ok(None),
        Some(value) => value
            .as_i64()
            .or_else(|| value.as_f64().map(|f| f as i64))
            .map(Some)
            .ok_or_else(|| ActorError::Setup(format!("unexpected {MAX_ID_COLUMN} value: {value}"))),
    }
}
