//! Run configuration: command-line arguments, the optional TOML file, and
//! the resolved [`LoadTestConfig`].
//!
//! Precedence is CLI/env > config file > defaults.

pub mod duration;

use crate::workload::WorkloadKind;
use anyhow::Context;
use clap::{Args, ValueEnum};
use loadgen_core::{ConfigError, Credentials, Endpoint, WaitTime};
use loadgen_neo4j::{Neo4jArgs, Neo4jSettings, DEFAULT_USERNAME};
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::time::Duration;

pub use duration::{parse_duration, parse_duration_arg};

pub const DEFAULT_SPAWN_RATE: f64 = 10.0;
pub const DEFAULT_RUN_TIME: Duration = Duration::from_secs(60);
pub const DEFAULT_STATS_INTERVAL: Duration = Duration::from_secs(2);

/// Final report format.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, ValueEnum, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum OutputFormat {
    #[default]
    Table,
    Markdown,
    Json,
}

/// Arguments of the `run` subcommand.
#[derive(Args, Clone, Debug, Default)]
pub struct RunArgs {
    #[command(flatten)]
    pub neo4j: Neo4jArgs,

    /// Number of concurrent simulated users [default: number of CPUs]
    #[arg(long, short = 'u', env = "LOADGEN_USERS")]
    pub users: Option<usize>,

    /// Users started per second [default: 10]
    #[arg(long, short = 'r', env = "LOADGEN_SPAWN_RATE")]
    pub spawn_rate: Option<f64>,

    /// Stop after this long, e.g. "90", "30s", "5m", "1h" [default: 60s]
    #[arg(long, short = 't', env = "LOADGEN_RUN_TIME", value_parser = parse_duration_arg)]
    pub run_time: Option<Duration>,

    /// Workload every user runs [default: random-reader]
    #[arg(long, value_enum, env = "LOADGEN_WORKLOAD")]
    pub workload: Option<WorkloadKind>,

    /// Minimum think time between two tasks of one user [default: 0]
    #[arg(long)]
    pub wait_min_ms: Option<u64>,

    /// Maximum think time between two tasks of one user [default: wait-min-ms]
    #[arg(long)]
    pub wait_max_ms: Option<u64>,

    /// How often progress is logged [default: 2s]
    #[arg(long, value_parser = parse_duration_arg)]
    pub stats_interval: Option<Duration>,

    /// Format of the final report [default: table]
    #[arg(long, value_enum)]
    pub output_format: Option<OutputFormat>,

    /// Also append every request event to this JSON Lines file
    #[arg(long, value_name = "PATH")]
    pub events_jsonl: Option<PathBuf>,

    /// Seed for workload randomness (a fresh seed per user otherwise)
    #[arg(long)]
    pub seed: Option<u64>,

    /// TOML file with `[neo4j]` and `[run]` tables
    #[arg(long, short = 'c', value_name = "PATH")]
    pub config: Option<PathBuf>,
}

/// `[run]` table of the config file.
#[derive(Clone, Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RunFileConfig {
    #[serde(default)]
    pub users: Option<usize>,
    #[serde(default)]
    pub spawn_rate: Option<f64>,
    #[serde(default, deserialize_with = "duration::serde_opt::deserialize")]
    pub run_time: Option<Duration>,
    #[serde(default)]
    pub workload: Option<WorkloadKind>,
    #[serde(default)]
    pub wait_min_ms: Option<u64>,
    #[serde(default)]
    pub wait_max_ms: Option<u64>,
    #[serde(default, deserialize_with = "duration::serde_opt::deserialize")]
    pub stats_interval: Option<Duration>,
    #[serde(default)]
    pub output_format: Option<OutputFormat>,
    #[serde(default)]
    pub events_jsonl: Option<PathBuf>,
    #[serde(default)]
    pub seed: Option<u64>,
}

/// Contents of a config file.
#[derive(Clone, Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct FileConfig {
    #[serde(default)]
    pub neo4j: Neo4jArgs,
    #[serde(default)]
    pub run: RunFileConfig,
}

impl FileConfig {
    pub fn from_file(path: &Path) -> anyhow::Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file {}", path.display()))?;
        Self::parse(&content)
            .with_context(|| format!("Failed to parse config file {}", path.display()))
    }

    pub fn parse(content: &str) -> anyhow::Result<Self> {
        Ok(toml::from_str(content)?)
    }
}

/// Everything a run needs, validated.
#[derive(Clone, Debug)]
pub struct LoadTestConfig {
    pub endpoint: Endpoint,
    pub neo4j: Neo4jSettings,
    pub users: usize,
    pub spawn_rate: f64,
    pub run_time: Duration,
    pub workload: WorkloadKind,
    pub wait: WaitTime,
    pub stats_interval: Duration,
    pub output_format: OutputFormat,
    pub events_jsonl: Option<PathBuf>,
    pub seed: Option<u64>,
}

impl RunArgs {
    /// Load the config file named by `--config`, if any, and resolve.
    pub fn resolve(self) -> anyhow::Result<LoadTestConfig> {
        let file = match &self.config {
            Some(path) => FileConfig::from_file(path)?,
            None => FileConfig::default(),
        };
        Ok(self.resolve_with(file)?)
    }

    /// Merge with `file`, apply defaults and validate.
    pub fn resolve_with(self, file: FileConfig) -> Result<LoadTestConfig, ConfigError> {
        let run = file.run;
        let neo4j = self.neo4j.merge(file.neo4j);

        let uri = neo4j.uri.clone().ok_or(ConfigError::MissingUri)?;
        let username = neo4j
            .username
            .clone()
            .unwrap_or_else(|| DEFAULT_USERNAME.to_string());
        let password = neo4j
            .password
            .clone()
            .ok_or_else(|| ConfigError::MissingSecret {
                principal: username.clone(),
            })?;

        let mut endpoint = Endpoint::new(&uri, Credentials::new(username, password))?;
        if let Some(database) = &neo4j.database {
            endpoint = endpoint.with_database(database.clone());
        }

        let users = self.users.or(run.users).unwrap_or_else(default_users);
        if users == 0 {
            return Err(ConfigError::Invalid("users must be at least 1".to_string()));
        }

        let spawn_rate = self
            .spawn_rate
            .or(run.spawn_rate)
            .unwrap_or(DEFAULT_SPAWN_RATE);
        spawn_interval(spawn_rate)?;

        let wait_min = self.wait_min_ms.or(run.wait_min_ms).unwrap_or(0);
        let wait_max = self.wait_max_ms.or(run.wait_max_ms).unwrap_or(wait_min);
        if wait_min > wait_max {
            return Err(ConfigError::Invalid(format!(
                "wait-min-ms ({wait_min}) is greater than wait-max-ms ({wait_max})"
            )));
        }

        let stats_interval = self
            .stats_interval
            .or(run.stats_interval)
            .unwrap_or(DEFAULT_STATS_INTERVAL);
        if stats_interval.is_zero() {
            return Err(ConfigError::Invalid(
                "stats interval must be greater than zero".to_string(),
            ));
        }

        Ok(LoadTestConfig {
            endpoint,
            neo4j: neo4j.settings(),
            users,
            spawn_rate,
            run_time: self.run_time.or(run.run_time).unwrap_or(DEFAULT_RUN_TIME),
            workload: self.workload.or(run.workload).unwrap_or_default(),
            wait: WaitTime::between(
                Duration::from_millis(wait_min),
                Duration::from_millis(wait_max),
            ),
            stats_interval,
            output_format: self
                .output_format
                .or(run.output_format)
                .unwrap_or_default(),
            events_jsonl: self.events_jsonl.or(run.events_jsonl),
            seed: self.seed.or(run.seed),
        })
    }
}

/// Delay between two user spawns at `spawn_rate` users per second.
pub fn spawn_interval(spawn_rate: f64) -> Result<Duration, ConfigError> {
    if !spawn_rate.is_finite() || spawn_rate <= 0.0 {
        return Err(ConfigError::Invalid(format!(
            "spawn rate must be positive, got {spawn_rate}"
        )));
    }
    Duration::try_from_secs_f64(1.0 / spawn_rate).map_err(|_| {
        ConfigError::Invalid(format!("spawn rate {spawn_rate} is too small"))
    })
}

fn default_users() -> usize {
    std::thread::available_parallelism()
        .map(|n| n.get())
        .unwrap_or(1)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn args(uri: &str, password: &str) -> RunArgs {
        RunArgs {
            neo4j: Neo4jArgs {
                uri: Some(uri.to_string()),
                password: Some(password.to_string()),
                ..Default::default()
            },
            ..Default::default()
        }
    }

    #[test]
    fn test_defaults() {
        let config = args("bolt://localhost:7687", "pw")
            .resolve_with(FileConfig::default())
            .unwrap();
        assert_eq!(config.endpoint.credentials().principal(), "neo4j");
        assert_eq!(config.users, default_users());
        assert_eq!(config.spawn_rate, DEFAULT_SPAWN_RATE);
        assert_eq!(config.run_time, DEFAULT_RUN_TIME);
        assert_eq!(config.workload, WorkloadKind::RandomReader);
        assert_eq!(config.wait, WaitTime::none());
        assert_eq!(config.output_format, OutputFormat::Table);
        assert!(config.events_jsonl.is_none());
    }

    #[test]
    fn test_missing_uri_and_password() {
        let err = RunArgs::default()
            .resolve_with(FileConfig::default())
            .unwrap_err();
        assert_eq!(err, ConfigError::MissingUri);

        let mut no_password = args("bolt://localhost:7687", "pw");
        no_password.neo4j.password = None;
        no_password.neo4j.username = Some("alice".to_string());
        let err = no_password.resolve_with(FileConfig::default()).unwrap_err();
        assert_eq!(
            err,
            ConfigError::MissingSecret {
                principal: "alice".to_string()
            }
        );
    }

    #[test]
    fn test_invalid_values() {
        let mut zero_users = args("bolt://localhost:7687", "pw");
        zero_users.users = Some(0);
        assert!(matches!(
            zero_users.resolve_with(FileConfig::default()),
            Err(ConfigError::Invalid(_))
        ));

        let mut bad_rate = args("bolt://localhost:7687", "pw");
        bad_rate.spawn_rate = Some(0.0);
        assert!(matches!(
            bad_rate.resolve_with(FileConfig::default()),
            Err(ConfigError::Invalid(_))
        ));

        let mut tiny_rate = args("bolt://localhost:7687", "pw");
        tiny_rate.spawn_rate = Some(1e-300);
        assert!(matches!(
            tiny_rate.resolve_with(FileConfig::default()),
            Err(ConfigError::Invalid(_))
        ));
        assert!(spawn_interval(f64::NAN).is_err());
        assert_eq!(spawn_interval(4.0).unwrap(), Duration::from_millis(250));

        let mut bad_wait = args("bolt://localhost:7687", "pw");
        bad_wait.wait_min_ms = Some(50);
        bad_wait.wait_max_ms = Some(10);
        assert!(matches!(
            bad_wait.resolve_with(FileConfig::default()),
            Err(ConfigError::Invalid(_))
        ));

        let bad_scheme = args("http://localhost:7474", "pw");
        assert!(matches!(
            bad_scheme.resolve_with(FileConfig::default()),
            Err(ConfigError::UnsupportedScheme { .. })
        ));
    }

    #[test]
    fn test_file_fills_gaps_and_cli_wins() {
        let file = FileConfig::parse(
            r#"
            [neo4j]
            uri = "bolt://file:7687"
            password = "from-file"
            database = "graph"

            [run]
            users = 4
            spawn_rate = 2.5
            run_time = "5m"
            workload = "ldbc"
            wait_min_ms = 10
            wait_max_ms = 20
            output_format = "json"
            "#,
        )
        .unwrap();

        let mut cli = RunArgs::default();
        cli.users = Some(8);
        cli.neo4j.uri = Some("neo4j://cli:7687".to_string());

        let config = cli.resolve_with(file).unwrap();
        assert_eq!(config.endpoint.uri(), "neo4j://cli:7687");
        assert_eq!(config.endpoint.credentials().secret(), "from-file");
        assert_eq!(config.endpoint.database(), Some("graph"));
        assert_eq!(config.users, 8);
        assert_eq!(config.spawn_rate, 2.5);
        assert_eq!(config.run_time, Duration::from_secs(300));
        assert_eq!(config.workload, WorkloadKind::Ldbc);
        assert_eq!(
            config.wait,
            WaitTime::between(Duration::from_millis(10), Duration::from_millis(20))
        );
        assert_eq!(config.output_format, OutputFormat::Json);
    }

    #[test]
    fn test_unknown_file_keys_are_rejected() {
        assert!(FileConfig::parse("[run]\nuserz = 3\n").is_err());
        assert!(FileConfig::parse("[run]\nrun_time = \"soon\"\n").is_err());
    }
}
