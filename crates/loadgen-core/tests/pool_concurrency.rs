//! Concurrency tests for the client pool.
//!
//! These tests verify that:
//! 1. Concurrent first acquires for one key open exactly one connection
//! 2. Refcount equals the number of un-released leases
//! 3. Randomized acquire/release traffic leaves no connection open and never
//!    uses a closed one

use loadgen_core::testing::{MemoryDriver, RecordingSink};
use loadgen_core::{Credentials, Endpoint, Pool, Query, ReleaseStatus, RequestContext};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

/// Pool debug logs (refcount changes, opens, closes) show up with
/// `cargo test -- --nocapture`.
fn init_tracing() {
    tracing_subscriber::fmt()
        .with_env_filter("loadgen_core=debug")
        .with_test_writer()
        .try_init()
        .ok();
}

fn endpoint(uri: &str) -> Endpoint {
    Endpoint::new(uri, Credentials::new("neo4j", "pw")).unwrap()
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_first_acquire_opens_once() {
    init_tracing();
    let driver = MemoryDriver::new().with_open_delay(Duration::from_millis(20));
    let pool = Arc::new(Pool::new(driver.clone()));
    let ep = endpoint("bolt://uri1");

    let mut tasks = Vec::new();
    for _ in 0..16 {
        let pool = pool.clone();
        let ep = ep.clone();
        tasks.push(tokio::spawn(async move { pool.acquire(&ep).await.unwrap() }));
    }
    let mut handles = Vec::new();
    for task in tasks {
        handles.push(task.await.unwrap());
    }

    assert_eq!(driver.opens(), 1);
    assert_eq!(pool.refcount(&ep.pool_key()).await, 16);
    assert!(handles.iter().all(|h| h.shares_client_with(&handles[0])));

    let mut closed = 0;
    for handle in handles {
        if pool.release(handle).await == ReleaseStatus::Closed {
            closed += 1;
        }
    }
    assert_eq!(closed, 1);
    assert_eq!(driver.closes(), 1);
}

#[tokio::test]
async fn test_two_actor_scenario() {
    let driver = MemoryDriver::new();
    let pool = Pool::new(driver.clone());
    let ep = endpoint("bolt://uri1");
    let key = ep.pool_key();

    let a = pool.acquire(&ep).await.unwrap();
    let b = pool.acquire(&ep).await.unwrap();
    assert_eq!(pool.live_connections().await, 1);
    assert_eq!(pool.refcount(&key).await, 2);

    assert_eq!(pool.release(a).await, ReleaseStatus::Retained { refcount: 1 });
    assert_eq!(pool.live_connections().await, 1);
    assert!(!b.client().is_closed());

    let first_client = b.client().id().to_string();
    assert_eq!(pool.release(b).await, ReleaseStatus::Closed);
    assert_eq!(pool.live_connections().await, 0);
    assert_eq!(driver.closes(), 1);

    let c = pool.acquire(&ep).await.unwrap();
    assert_ne!(c.client().id(), first_client);
    assert_eq!(driver.opens(), 2);
    pool.release(c).await;
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_randomized_interleaving_leaves_no_leaks() {
    init_tracing();
    let driver = MemoryDriver::new().with_open_delay(Duration::from_millis(1));
    let pool = Arc::new(Pool::new(driver.clone()));
    let sink = Arc::new(RecordingSink::new());
    let token = CancellationToken::new();
    let uris = ["bolt://uri1", "bolt://uri2", "bolt://uri3"];

    let mut tasks = Vec::new();
    for actor in 0..24u64 {
        let pool = pool.clone();
        let sink = sink.clone();
        let token = token.clone();
        tasks.push(tokio::spawn(async move {
            let mut rng = StdRng::seed_from_u64(actor);
            let ctx = RequestContext::new(format!("actor-{actor}"), sink, token);
            let query = Query::new("MATCH (n) RETURN n LIMIT 1");
            for _ in 0..50 {
                let ep = endpoint(uris[rng.random_range(0..uris.len())]);
                let handle = pool.acquire(&ep).await.unwrap();
                let outcome = handle.client().read(&query, &ctx).await;
                assert!(outcome.is_success());
                if rng.random_bool(0.5) {
                    tokio::task::yield_now().await;
                }
                let status = pool.release(handle).await;
                assert_ne!(status, ReleaseStatus::Inconsistent);
            }
        }));
    }
    for task in tasks {
        task.await.unwrap();
    }

    assert_eq!(pool.live_connections().await, 0);
    assert_eq!(driver.opens(), driver.closes());
    assert_eq!(driver.use_after_close(), 0);
    assert_eq!(sink.len(), 24 * 50);

    let stats = pool.stats();
    assert_eq!(stats.opened, stats.closed);
    assert_eq!(stats.live, 0);
}

#[tokio::test]
async fn test_release_after_record_is_gone_never_closes_twice() {
    let driver = MemoryDriver::new();
    let pool = Pool::new(driver.clone());
    let ep = endpoint("bolt://uri1");

    let a = pool.acquire(&ep).await.unwrap();
    let b = pool.acquire(&ep).await.unwrap();
    assert_eq!(pool.shutdown().await, 1);
    assert_eq!(driver.closes(), 1);

    assert_eq!(pool.release(a).await, ReleaseStatus::ShutDown);
    assert_eq!(pool.release(b).await, ReleaseStatus::ShutDown);
    assert_eq!(driver.closes(), 1);
    assert_eq!(pool.refcount(&ep.pool_key()).await, 0);
}
