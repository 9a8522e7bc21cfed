//! Round trip against a live Neo4j server.
//!
//! Run with `cargo test -p loadgen-neo4j -- --ignored` after pointing
//! `NEO4J_URI` / `NEO4J_USERNAME` / `NEO4J_PASSWORD` at a server
//! (defaults match the dev container: bolt://neo4j:7687, neo4j/password).

use loadgen_core::testing::RecordingSink;
use loadgen_core::{Credentials, Endpoint, Pool, Query, ReleaseStatus, RequestContext, RequestKind};
use loadgen_neo4j::{Neo4jDriver, Neo4jSettings};
use std::sync::Arc;
use tokio_test::assert_ok;
use tokio_util::sync::CancellationToken;

fn endpoint() -> Endpoint {
    let uri = std::env::var("NEO4J_URI").unwrap_or_else(|_| "bolt://neo4j:7687".to_string());
    let user = std::env::var("NEO4J_USERNAME").unwrap_or_else(|_| "neo4j".to_string());
    let password = std::env::var("NEO4J_PASSWORD").unwrap_or_else(|_| "password".to_string());
    Endpoint::new(&uri, Credentials::new(user, password)).unwrap()
}

#[tokio::test]
#[ignore = "requires a running Neo4j server"]
async fn test_write_then_read_through_pool() {
    tracing_subscriber::fmt()
        .with_env_filter("loadgen_core=debug,loadgen_neo4j=debug")
        .try_init()
        .ok();

    let marker = format!("loadgen_e2e_{}", std::process::id());
    let pool = Pool::new(Neo4jDriver::new(Neo4jSettings::default()));
    let sink = Arc::new(RecordingSink::new());
    let ctx = RequestContext::new("e2e", sink.clone(), CancellationToken::new());

    let handle = assert_ok!(pool.acquire(&endpoint()).await);
    let client = handle.client();

    let create = Query::new(
        "UNWIND range(1, 3) AS i CREATE (n:LoadgenE2E {marker: $marker, i: i}) RETURN n",
    )
    .named("create")
    .param("marker", marker.clone());
    let outcome = client.write(&create, &ctx).await;
    assert!(outcome.is_success(), "{:?}", outcome);
    assert_eq!(outcome.rows(), 3);

    let read = Query::new("MATCH (n:LoadgenE2E {marker: $marker}) RETURN n")
        .named("read")
        .param("marker", marker.clone());
    let outcome = client.read(&read, &ctx).await;
    assert_eq!(outcome.rows(), 3);

    let count = client
        .scalar(
            &Query::new("MATCH (n:LoadgenE2E {marker: $marker}) RETURN count(n) AS c")
                .param("marker", marker.clone()),
            "c",
        )
        .await;
    let count = assert_ok!(count);
    assert_eq!(count, Some(serde_json::Value::from(3)));

    let broken = client.write(&Query::new("CREATE (n:LoadgenE2E"), &ctx).await;
    assert!(broken.error().is_some());

    let cleanup = Query::new("MATCH (n:LoadgenE2E {marker: $marker}) DETACH DELETE n")
        .param("marker", marker);
    assert!(client.write(&cleanup, &ctx).await.is_success());

    let events = sink.events();
    assert_eq!(events.len(), 4);
    assert_eq!(events[0].kind, RequestKind::Write);
    assert_eq!(events[1].kind, RequestKind::Read);
    assert!(events[2].is_failure());

    assert_eq!(pool.release(handle).await, ReleaseStatus::Closed);
}
