//! End-to-end actor runs against the in-memory driver.

use async_trait::async_trait;
use loadgen_core::testing::{Behavior, MemoryDriver, RecordingSink};
use loadgen_core::{
    Actor, ActorError, Connection, Credentials, Endpoint, Pool, Query, ReleaseStatus, TaskContext,
    WaitTime, Workload,
};
use std::sync::Arc;
use std::time::Duration;
use tokio_test::assert_err;
use tokio_util::sync::CancellationToken;

/// Alternates a failing write with a succeeding read.
struct Flaky {
    turn: u64,
}

#[async_trait]
impl Workload for Flaky {
    fn name(&self) -> &str {
        "flaky"
    }

    async fn run_task<C: Connection>(&mut self, ctx: &TaskContext<'_, C>) {
        self.turn += 1;
        if self.turn % 2 == 1 {
            ctx.write(&Query::new("CREATE (n:Broken").named("broken_write"))
                .await;
        } else {
            ctx.read(&Query::new("MATCH (n) RETURN n LIMIT 1").named("sample_read"))
                .await;
        }
    }
}

fn endpoint() -> Endpoint {
    Endpoint::new("bolt://uri1", Credentials::new("neo4j", "pw")).unwrap()
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_actors_share_one_connection_and_release_on_shutdown() {
    let driver = MemoryDriver::new();
    driver.on_statement("CREATE (n:Broken", Behavior::fail("Invalid input"));
    driver.on_statement("MATCH (n) RETURN n LIMIT 1", Behavior::rows(1));
    let pool = Arc::new(Pool::new(driver.clone()));
    let sink = Arc::new(RecordingSink::new());
    let token = CancellationToken::new();

    let mut tasks = Vec::new();
    for i in 0..8 {
        let actor = Actor::new(
            format!("actor-{i}"),
            endpoint(),
            pool.clone(),
            Flaky { turn: 0 },
            sink.clone(),
            token.clone(),
        )
        .with_wait(WaitTime::between(
            Duration::from_millis(1),
            Duration::from_millis(5),
        ));
        tasks.push(tokio::spawn(actor.run()));
    }

    tokio::time::sleep(Duration::from_millis(100)).await;
    token.cancel();

    let mut reports = Vec::new();
    for task in tasks {
        reports.push(task.await.unwrap().unwrap());
    }

    assert_eq!(driver.opens(), 1);
    assert_eq!(driver.closes(), 1);
    assert_eq!(driver.use_after_close(), 0);
    assert_eq!(pool.live_connections().await, 0);
    assert_eq!(
        reports
            .iter()
            .filter(|r| r.release == Some(ReleaseStatus::Closed))
            .count(),
        1
    );
    assert!(reports.iter().all(|r| r.interrupted));

    // Failures were reported and did not stop anyone.
    let events = sink.events();
    let failures = events.iter().filter(|e| e.is_failure()).count();
    let successes = events.len() - failures;
    assert!(failures > 0);
    assert!(successes > 0);
    assert!(events
        .iter()
        .filter(|e| e.is_failure())
        .all(|e| e.name == "broken_write" && e.response_length == 0));
}

#[tokio::test]
async fn test_unreachable_endpoint_does_not_affect_other_actors() {
    let driver = MemoryDriver::new();
    driver.fail_open("bolt://down");
    let pool = Arc::new(Pool::new(driver.clone()));
    let sink = Arc::new(RecordingSink::new());
    let token = CancellationToken::new();

    let broken = Actor::new(
        "broken",
        Endpoint::new("bolt://down", Credentials::new("neo4j", "pw")).unwrap(),
        pool.clone(),
        Flaky { turn: 0 },
        sink.clone(),
        token.clone(),
    );
    let healthy = Actor::new(
        "healthy",
        endpoint(),
        pool.clone(),
        Flaky { turn: 0 },
        sink.clone(),
        token.clone(),
    )
    .with_wait(WaitTime::constant(Duration::from_millis(2)));

    let healthy = tokio::spawn(healthy.run());
    let err = assert_err!(broken.run().await);
    assert!(matches!(err, ActorError::Acquire(_)));

    tokio::time::sleep(Duration::from_millis(20)).await;
    token.cancel();
    let report = healthy.await.unwrap().unwrap();
    assert!(report.tasks > 0);
    assert_eq!(report.release, Some(ReleaseStatus::Closed));
}

#[test]
fn test_invalid_endpoint_is_rejected_before_any_actor_exists() {
    let err = assert_err!(Endpoint::new("http://uri1", Credentials::new("neo4j", "pw")));
    let err: ActorError = err.into();
    assert!(matches!(err, ActorError::Config(_)));
    assert!(Endpoint::new("bolt://uri1", Credentials::new("", "pw")).is_err());
}

/// Panics on its third task.
struct Panicky {
    turn: u64,
}

#[async_trait]
impl Workload for Panicky {
    fn name(&self) -> &str {
        "panicky"
    }

    async fn run_task<C: Connection>(&mut self, ctx: &TaskContext<'_, C>) {
        self.turn += 1;
        if self.turn == 3 {
            panic!("bad row in task {}", self.turn);
        }
        ctx.read(&Query::new("MATCH (n) RETURN n LIMIT 1").named("sample_read"))
            .await;
    }
}

#[tokio::test]
async fn test_panicking_task_still_releases_the_client() {
    let driver = MemoryDriver::new();
    driver.on_statement("MATCH (n) RETURN n LIMIT 1", Behavior::rows(1));
    let pool = Arc::new(Pool::new(driver.clone()));
    let sink = Arc::new(RecordingSink::new());

    let actor = Actor::new(
        "panicky",
        endpoint(),
        pool.clone(),
        Panicky { turn: 0 },
        sink.clone(),
        CancellationToken::new(),
    );
    let err = assert_err!(actor.run().await);
    match err {
        ActorError::TaskPanicked { actor, message } => {
            assert_eq!(actor, "panicky");
            assert_eq!(message, "bad row in task 3");
        }
        other => panic!("unexpected error: {other}"),
    }

    assert_eq!(driver.opens(), 1);
    assert_eq!(driver.closes(), 1);
    assert_eq!(pool.live_connections().await, 0);
    assert_eq!(pool.shutdown().await, 0);
}
