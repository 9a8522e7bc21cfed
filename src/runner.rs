//! Run scheduler: spawns simulated users at the configured rate, logs
//! progress, and tears everything down when the run time is up.

use crate::config::{spawn_interval, LoadTestConfig};
use crate::workload::AnyWorkload;
use anyhow::Context;
use loadgen_core::{Actor, ActorReport, Driver, MetricsSink, Pool};
use loadgen_stats::{format_progress, FanoutSink, JsonlSink, RequestStats, StatsReport};
use rand::rngs::StdRng;
use rand::SeedableRng;
use std::sync::Arc;
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};
use uuid::Uuid;

/// Outcome of a finished run.
#[derive(Debug, Clone)]
pub struct RunSummary {
    pub report: StatsReport,
    /// Users that acquired a client and ran.
    pub actors_started: usize,
    /// Users that could not start (bad endpoint, setup failure) or stopped
    /// on a panicking task.
    pub actors_failed: usize,
    pub tasks: u64,
    /// Connections still open at the end that the pool had to close.
    pub force_closed: usize,
    /// Events written to the JSONL log, when one was configured.
    pub events_written: Option<u64>,
}

/// Run a load test until `config.run_time` elapses or Ctrl+C is pressed.
pub async fn run_load_test<D: Driver>(
    config: &LoadTestConfig,
    driver: D,
) -> anyhow::Result<RunSummary> {
    let shutdown = CancellationToken::new();

    let ctrl_c = {
        let shutdown = shutdown.clone();
        tokio::spawn(async move {
            tokio::select! {
                result = tokio::signal::ctrl_c() => {
                    match result {
                        Ok(()) => info!("Received Ctrl+C, stopping users..."),
                        Err(e) => warn!("Failed to listen for Ctrl+C: {}", e),
                    }
                    shutdown.cancel();
                }
                _ = shutdown.cancelled() => {}
            }
        })
    };

    let result = run_with_shutdown(config, driver, shutdown.clone()).await;
    shutdown.cancel();
    let _ = ctrl_c.await;
    result
}

/// Like [`run_load_test`], but stopped through `shutdown` instead of Ctrl+C.
pub async fn run_with_shutdown<D: Driver>(
    config: &LoadTestConfig,
    driver: D,
    shutdown: CancellationToken,
) -> anyhow::Result<RunSummary> {
    let spawn_interval = spawn_interval(config.spawn_rate)?;
    let pool = Arc::new(Pool::new(driver));
    let stats = Arc::new(RequestStats::new());

    let mut sinks = FanoutSink::new().with(stats.clone());
    let jsonl = match &config.events_jsonl {
        Some(path) => {
            let sink = Arc::new(JsonlSink::create(path).with_context(|| {
                format!("Failed to create event log {}", path.display())
            })?);
            sinks.push(sink.clone());
            Some(sink)
        }
        None => None,
    };
    let sink: Arc<dyn MetricsSink> = Arc::new(sinks);

    info!(
        "Starting load test: {} {} user(s) at {}/s for {:?} against {}",
        config.users, config.workload, config.spawn_rate, config.run_time, config.endpoint
    );

    let deadline = {
        let shutdown = shutdown.clone();
        let run_time = config.run_time;
        tokio::spawn(async move {
            tokio::select! {
                _ = tokio::time::sleep(run_time) => {
                    info!("Run time of {:?} elapsed, stopping users...", run_time);
                    shutdown.cancel();
                }
                _ = shutdown.cancelled() => {}
            }
        })
    };

    let progress = {
        let shutdown = shutdown.clone();
        let stats = stats.clone();
        let pool = pool.clone();
        let every = config.stats_interval;
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(every);
            // The first tick completes immediately.
            ticker.tick().await;
            loop {
                tokio::select! {
                    _ = shutdown.cancelled() => break,
                    _ = ticker.tick() => {
                        let report = StatsReport::from_stats(&stats);
                        info!(
                            "{} ({} connection(s))",
                            format_progress(&report),
                            pool.live_connections().await
                        );
                    }
                }
            }
        })
    };

    let mut actors = JoinSet::new();
    for index in 0..config.users {
        if shutdown.is_cancelled() {
            info!("Spawning stopped after {} user(s)", index);
            break;
        }

        let rng = match config.seed {
            Some(seed) => StdRng::seed_from_u64(seed.wrapping_add(index as u64)),
            None => StdRng::from_os_rng(),
        };
        let actor = Actor::new(
            Uuid::new_v4().to_string(),
            config.endpoint.clone(),
            pool.clone(),
            AnyWorkload::new(config.workload, rng),
            sink.clone(),
            shutdown.clone(),
        )
        .with_wait(config.wait);
        actors.spawn(actor.run());

        if index + 1 < config.users {
            tokio::select! {
                _ = shutdown.cancelled() => {}
                _ = tokio::time::sleep(spawn_interval) => {}
            }
        }
    }

    let mut reports: Vec<ActorReport> = Vec::new();
    let mut actors_failed = 0;
    while let Some(joined) = actors.join_next().await {
        match joined {
            Ok(Ok(report)) => reports.push(report),
            Ok(Err(e)) => {
                warn!("User failed: {}", e);
                actors_failed += 1;
            }
            Err(e) => {
                error!("User task panicked or was aborted: {}", e);
                actors_failed += 1;
            }
        }
    }

    // Every user is done; stop the timers too.
    shutdown.cancel();
    let _ = deadline.await;
    let _ = progress.await;

    let force_closed = pool.shutdown().await;
    if force_closed > 0 {
        warn!("{} connection(s) were still open at the end of the run", force_closed);
    }

    let events_written = match &jsonl {
        Some(sink) => {
            sink.flush()
                .with_context(|| format!("Failed to flush event log {}", sink.path().display()))?;
            Some(sink.written())
        }
        None => None,
    };

    let report = StatsReport::from_stats(&stats);
    let tasks = reports.iter().map(|r| r.tasks).sum();
    info!(
        "Load test finished: {} user(s) ran {} task(s), {} failed",
        reports.len(),
        tasks,
        actors_failed
    );

    Ok(RunSummary {
        report,
        actors_started: reports.len(),
        actors_failed,
        tasks,
        force_closed,
        events_written,
    })
}
