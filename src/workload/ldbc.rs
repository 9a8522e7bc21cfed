//! LDBC Social Network Benchmark queries.
//!
//! Expects a graph loaded from the LDBC SNB datagen (`Person`, `Tag`,
//! `KNOWS`, `HAS_CREATOR`, `HAS_TAG`).

use super::lookup_max_id;
use async_trait::async_trait;
use loadgen_core::{ActorError, Connection, Query, TaskContext, Workload};
use rand::rngs::StdRng;
use rand::Rng;
use tracing::debug;

pub const MAX_PERSON_ID_QUERY: &str = "MATCH (p:Person) RETURN max(p.id) AS maxId";

/// Highest tag number in the SF1 dataset.
pub const MAX_TAG_ID: i64 = 16080;

/// Interactive complex query 6: tag co-occurrence.
pub const LDBC_IC6_QUERY: &str = r#"
MATCH (knownTag:Tag {name: "Tag-" + $tagId})
MATCH (person:Person {id: $personId})-[:KNOWS*1..2]-(friend)
WHERE NOT person = friend
WITH DISTINCT friend, knownTag

MATCH (friend)<-[:HAS_CREATOR]-(post)
WHERE (post)-[:HAS_TAG]->(knownTag)
WITH post, knownTag

MATCH (post)-[:HAS_TAG]->(commonTag)
WHERE NOT commonTag = knownTag
WITH commonTag, count(post) AS postCount

RETURN commonTag.name AS tagName, postCount
ORDER BY postCount DESC, tagName ASC
LIMIT 10
"#;

pub struct LdbcUser {
    rng: StdRng,
    max_person_id: i64,
}

impl LdbcUser {
    pub fn new(rng: StdRng) -> Self {
        Self {
            rng,
            max_person_id: 0,
        }
    }

    pub fn max_person_id(&self) -> i64 {
        self.max_person_id
    }
}

#[async_trait]
impl Workload for LdbcUser {
    fn name(&self) -> &str {
        "LdbcUser"
    }

    async fn on_start<C: Connection>(&mut self, ctx: &TaskContext<'_, C>) -> Result<(), ActorError> {
        let max = lookup_max_id(ctx, MAX_PERSON_ID_QUERY).await?.unwrap_or(0);
        if max < 1 {
            return Err(ActorError::Setup(
                "failed to find max person id".to_string(),
            ));
        }
        debug!("Actor {}: max person id is {}", ctx.actor_id(), max);
        self.max_person_id = max;
        Ok(())
    }

    async fn run_task<C: Connection>(&mut self, ctx: &TaskContext<'_, C>) {
        let person_id = self.rng.random_range(1..=self.max_person_id);
        let tag_id = self.rng.random_range(1..=MAX_TAG_ID);
        let query = Query::new(LDBC_IC6_QUERY)
            .named("ldbc_ic6_tag_cooccurrence")
            .param("personId", person_id)
            .param("tagId", tag_id);
        ctx.read(&query).await;
    }
}
