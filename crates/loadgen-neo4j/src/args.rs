//! CLI argument definitions for the Neo4j backend.

use clap::Args;
use serde::Deserialize;

pub const DEFAULT_USERNAME: &str = "neo4j";
pub const DEFAULT_MAX_CONNECTIONS: usize = 100;
pub const DEFAULT_FETCH_SIZE: usize = 200;

/// Neo4j connection arguments.
///
/// Every field is optional so values from a config file can fill the gaps;
/// see [`Neo4jArgs::merge`].
#[derive(Args, Clone, Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Neo4jArgs {
    /// Neo4j connection URI (e.g., bolt://localhost:7687)
    #[arg(long = "neo4j-uri", env = "NEO4J_URI")]
    #[serde(default)]
    pub uri: Option<String>,

    /// Neo4j username [default: neo4j]
    #[arg(long = "neo4j-username", env = "NEO4J_USERNAME")]
    #[serde(default)]
    pub username: Option<String>,

    /// Neo4j password
    #[arg(long = "neo4j-password", env = "NEO4J_PASSWORD", hide_env_values = true)]
    #[serde(default)]
    pub password: Option<String>,

    /// Neo4j database name (server default when omitted)
    #[arg(long = "neo4j-database", env = "NEO4J_DATABASE")]
    #[serde(default)]
    pub database: Option<String>,

    /// Size of the driver's internal Bolt connection pool [default: 100]
    #[arg(long, env = "NEO4J_MAX_CONNECTIONS")]
    #[serde(default)]
    pub max_connections: Option<usize>,

    /// Rows fetched per Bolt PULL [default: 200]
    #[arg(long, env = "NEO4J_FETCH_SIZE")]
    #[serde(default)]
    pub fetch_size: Option<usize>,
}

impl Neo4jArgs {
    /// Fill every unset field from `fallback`.
    pub fn merge(self, fallback: Neo4jArgs) -> Neo4jArgs {
        Neo4jArgs {
            uri: self.uri.or(fallback.uri),
            username: self.username.or(fallback.username),
            password: self.password.or(fallback.password),
            database: self.database.or(fallback.database),
            max_connections: self.max_connections.or(fallback.max_connections),
            fetch_size: self.fetch_size.or(fallback.fetch_size),
        }
    }

    /// Driver tuning knobs with defaults applied.
    pub fn settings(&self) -> Neo4jSettings {
        Neo4jSettings {
            max_connections: self.max_connections.unwrap_or(DEFAULT_MAX_CONNECTIONS),
            fetch_size: self.fetch_size.unwrap_or(DEFAULT_FETCH_SIZE),
            verify_connectivity: true,
        }
    }
}

/// Settings applied to every connection the driver opens.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Neo4jSettings {
    pub max_connections: usize,
    pub fetch_size: usize,
    /// Run `RETURN 1` when opening so a bad address fails the acquire
    /// instead of the first transaction.
    pub verify_connectivity: bool,
}

impl Default for Neo4jSettings {
    fn default() -> Self {
        Self {
            max_connections: DEFAULT_MAX_CONNECTIONS,
            fetch_size: DEFAULT_FETCH_SIZE,
            verify_connectivity: true,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::Parser;

    #[derive(Parser)]
    struct Cli {
        #[command(flatten)]
        neo4j: Neo4jArgs,
    }

    #[test]
    fn test_cli_overrides_file() {
        let cli = Cli::parse_from(["test", "--neo4j-uri", "bolt://cli:7687", "--fetch-size", "50"]);
        let file = Neo4jArgs {
            uri: Some("bolt://file:7687".into()),
            password: Some("secret".into()),
            fetch_size: Some(10),
            ..Default::default()
        };

        let merged = cli.neo4j.merge(file);
        assert_eq!(merged.uri.as_deref(), Some("bolt://cli:7687"));
        assert_eq!(merged.password.as_deref(), Some("secret"));
        assert_eq!(merged.fetch_size, Some(50));
        assert_eq!(merged.settings().max_connections, DEFAULT_MAX_CONNECTIONS);
        assert_eq!(merged.settings().fetch_size, 50);
    }
}
