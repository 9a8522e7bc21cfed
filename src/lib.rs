//! graph-loadgen library
//!
//! Generates synthetic load against a graph database by running many
//! concurrent simulated users that share a small number of pooled
//! connections.
//!
//! # Crates
//!
//! - `loadgen_core` - pool, client, driver traits and actor lifecycle
//! - `loadgen_neo4j` - Neo4j driver backed by neo4rs
//! - `loadgen_stats` - request statistics, event log and reports
//!
//! # CLI Usage
//!
//! ```bash
//! # 50 users, 5 new users per second, for 10 minutes
//! graph-loadgen run --neo4j-uri bolt://localhost:7687 --neo4j-password secret \
//!   --users 50 --spawn-rate 5 --run-time 10m --workload random-reader
//!
//! # Rebuild the report of an earlier run
//! graph-loadgen report --events events.jsonl --output-format markdown
//! ```

pub mod config;
pub mod runner;
pub mod workload;

pub use config::{FileConfig, LoadTestConfig, OutputFormat, RunArgs};
pub use runner::{run_load_test, run_with_shutdown, RunSummary};
pub use workload::{AnyWorkload, LdbcUser, RandomReader, RandomWriter, WorkloadKind};

use anyhow::Context;
use loadgen_stats::{
    format_json, format_markdown, format_table, read_events, RequestStats, StatsReport,
};
use std::path::Path;

/// Render a report in the requested format.
pub fn render_report(report: &StatsReport, format: OutputFormat) -> anyhow::Result<String> {
    Ok(match format {
        OutputFormat::Table => format_table(report),
        OutputFormat::Markdown => format_markdown(report),
        OutputFormat::Json => format_json(report)?,
    })
}

/// Rebuild the report of a finished run from its JSONL event log.
///
/// The run is taken to end when the last request finished.
pub fn replay_report(path: &Path) -> anyhow::Result<StatsReport> {
    let events = read_events(path)
        .with_context(|| format!("Failed to load events from {}", path.display()))?;
    let stats = RequestStats::from_events(&events);
    let finished_at = events
        .iter()
        .map(|e| {
            let elapsed = i64::try_from(e.response_time_ms)
                .ok()
                .and_then(chrono::Duration::try_milliseconds)
                .unwrap_or_default();
            e.timestamp + elapsed
        })
        .max()
        .unwrap_or_else(|| stats.started_at());
    Ok(StatsReport::from_stats_at(&stats, finished_at))
}
