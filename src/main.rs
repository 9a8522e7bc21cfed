//! Command-line interface for graph-loadgen
//!
//! # Usage Examples
//!
//! ## Run a load test
//! ```bash
//! # Random reads from as many users as there are CPUs, for 60 seconds
//! graph-loadgen run --neo4j-uri bolt://localhost:7687 --neo4j-password secret
//!
//! # LDBC tag co-occurrence, settings from a file, raw events kept
//! graph-loadgen run --config loadgen.toml --workload ldbc \
//!   --events-jsonl events.jsonl --output-format json
//! ```
//!
//! ## Replay a run
//! ```bash
//! graph-loadgen report --events events.jsonl --output-format markdown
//! ```
//!
//! ## Config file
//! ```toml
//! [neo4j]
//! uri = "bolt://localhost:7687"
//! username = "neo4j"
//! password = "secret"
//!
//! [run]
//! users = 50
//! spawn_rate = 5
//! run_time = "10m"
//! workload = "random-writer"
//! ```

use anyhow::Context;
use clap::{Parser, Subcommand, ValueEnum};
use graph_loadgen::{render_report, replay_report, run_load_test, OutputFormat, RunArgs};
use loadgen_neo4j::Neo4jDriver;
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "graph-loadgen")]
#[command(about = "Generate concurrent read/write load against a graph database")]
#[command(long_about = None)]
struct Cli {
    /// Log output format
    #[arg(long, value_enum, global = true, default_value = "text")]
    log_format: LogFormat,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run a load test and print the final statistics
    Run(RunArgs),

    /// Print statistics rebuilt from a JSONL event log
    Report {
        /// Event log written by `run --events-jsonl`
        #[arg(long, value_name = "PATH")]
        events: PathBuf,

        /// Output format
        #[arg(long, value_enum, default_value = "table")]
        output_format: OutputFormat,
    },
}

#[derive(Clone, Copy, Debug, ValueEnum)]
enum LogFormat {
    Text,
    Json,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    if let Err(e) = run().await {
        eprintln!("Error: {e:#}");
        std::process::exit(1);
    }
    Ok(())
}

async fn run() -> anyhow::Result<()> {
    let cli = Cli::parse();

    // Initialize tracing
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    match cli.log_format {
        LogFormat::Text => tracing_subscriber::fmt().with_env_filter(filter).init(),
        LogFormat::Json => tracing_subscriber::fmt()
            .json()
            .with_env_filter(filter)
            .init(),
    }

    match cli.command {
        Commands::Run(args) => {
            let config = args.resolve().context("Invalid load test configuration")?;
            let driver = Neo4jDriver::new(config.neo4j);
            let summary = run_load_test(&config, driver).await?;

            println!("{}", render_report(&summary.report, config.output_format)?);
            if let Some(written) = summary.events_written {
                tracing::info!("Wrote {} event(s) to the event log", written);
            }
            if summary.actors_started == 0 && summary.actors_failed > 0 {
                anyhow::bail!(
                    "None of the {} user(s) could start; see the log for details",
                    summary.actors_failed
                );
            }
        }
        Commands::Report {
            events,
            output_format,
        } => {
            let report = replay_report(&events)?;
            println!("{}", render_report(&report, output_format)?);
        }
    }

    Ok(())
}
