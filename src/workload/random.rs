//! Workloads that touch random nodes by internal id.

use super::lookup_max_id;
use async_trait::async_trait;
use loadgen_core::{ActorError, Connection, Query, TaskContext, Workload};
use rand::rngs::StdRng;
use rand::Rng;
use tracing::debug;

pub const MAX_NODE_ID_QUERY: &str = "MATCH (n) RETURN max(id(n)) AS maxId";

pub const RANDOM_READ_QUERY: &str =
    "MATCH (n) WHERE id(n) = $nodeId MATCH p=(n)-[*1..3]-() RETURN p LIMIT 5";

pub const CREATE_LINK_QUERY: &str = "MATCH (a), (b) WHERE id(a) = $fromId AND id(b) = $toId \
     CREATE (a)-[r:LOADGEN_LINK {createdAt: timestamp()}]->(b) RETURN count(r) AS created";

async fn find_max_node_id<C: Connection>(ctx: &TaskContext<'_, C>) -> Result<i64, ActorError> {
    let max = lookup_max_id(ctx, MAX_NODE_ID_QUERY)
        .await?
        .ok_or_else(|| ActorError::Setup("the graph has no nodes".to_string()))?;
    debug!("Actor {}: max node id is {}", ctx.actor_id(), max);
    Ok(max)
}

/// Picks a random anchor node and traverses up to three hops from it.
pub struct RandomReader {
    rng: StdRng,
    max_node_id: i64,
}

impl RandomReader {
    pub fn new(rng: StdRng) -> Self {
        Self { rng, max_node_id: 0 }
    }

    pub fn max_node_id(&self) -> i64 {
        self.max_node_id
    }
}

#[async_trait]
impl Workload for RandomReader {
    fn name(&self) -> &str {
        "RandomReader"
    }

    async fn on_start<C: Connection>(&mut self, ctx: &TaskContext<'_, C>) -> Result<(), ActorError> {
        self.max_node_id = find_max_node_id(ctx).await?;
        Ok(())
    }

    async fn run_task<C: Connection>(&mut self, ctx: &TaskContext<'_, C>) {
        let node_id = self.rng.random_range(0..=self.max_node_id);
        let query = Query::new(RANDOM_READ_QUERY)
            .named("random_read")
            .param("nodeId", node_id);
        ctx.read(&query).await;
    }
}

/// Links two random nodes with a `LOADGEN_LINK` relationship.
pub struct RandomWriter {
    rng: StdRng,
    max_node_id: i64,
}

impl RandomWriter {
    pub fn new(rng: StdRng) -> Self {
        Self { rng, max_node_id: 0 }
    }

    pub fn max_node_id(&self) -> i64 {
        self.max_node_id
    }
}

#[async_trait]
impl Workload for RandomWriter {
    fn name(&self) -> &str {
        "RandomWriter"
    }

    async fn on_start<C: Connection>(&mut self, ctx: &TaskContext<'_, C>) -> Result<(), ActorError> {
        self.max_node_id = find_max_node_id(ctx).await?;
        Ok(())
    }

    async fn run_task<C: Connection>(&mut self, ctx: &TaskContext<'_, C>) {
        let from_id = self.rng.random_range(0..=self.max_node_id);
        let to_id = self.rng.random_range(0..=self.max_node_id);
        let query = Query::new(CREATE_LINK_QUERY)
            .named("create_link")
            .param("fromId", from_id)
            .param("toId", to_id);
        ctx.write(&query).await;
    }
}
