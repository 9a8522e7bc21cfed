//! Request, query and outcome types.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;
use std::time::Duration;

/// Statement parameters, keyed by parameter name.
pub type Params = serde_json::Map<String, Value>;

/// The transaction mode a request runs in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum RequestKind {
    Read,
    Write,
}

impl fmt::Display for RequestKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RequestKind::Read => write!(f, "Read"),
            RequestKind::Write => write!(f, "Write"),
        }
    }
}

impl std::str::FromStr for RequestKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "read" | "cypherread" => Ok(RequestKind::Read),
            "write" | "cypherwrite" => Ok(RequestKind::Write),
            _ => Err(format!(
                "Unknown request kind: '{s}'. Expected 'read' or 'write'"
            )),
        }
    }
}

/// A statement plus its parameters and an optional display name.
///
/// The name is what shows up in statistics; without one the trimmed
/// statement text is used.
#[derive(Debug, Clone, PartialEq)]
pub struct Query {
    text: String,
    name: Option<String>,
    params: Params,
}

impl Query {
    pub fn new(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            name: None,
            params: Params::new(),
        }
    }

    pub fn named(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    pub fn param(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.params.insert(key.into(), value.into());
        self
    }

    pub fn text(&self) -> &str {
        &self.text
    }

    pub fn params(&self) -> &Params {
        &self.params
    }

    /// Name used to group this statement in metrics.
    pub fn display_name(&self) -> &str {
        self.name.as_deref().unwrap_or_else(|| self.text.trim())
    }
}

/// One transaction attempt, built by the client when a call starts.
#[derive(Debug, Clone)]
pub struct Request<'a> {
    pub kind: RequestKind,
    pub query: &'a Query,
    pub actor_id: &'a str,
    pub started_at: DateTime<Utc>,
}

impl<'a> Request<'a> {
    pub fn new(kind: RequestKind, query: &'a Query, actor_id: &'a str) -> Self {
        Self {
            kind,
            query,
            actor_id,
            started_at: Utc::now(),
        }
    }
}

/// How a request ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OutcomeStatus {
    Completed,
    /// The driver reported an error; the description is what the metrics
    /// sink receives as the exception.
    Failed(String),
    /// Shutdown interrupted the request. Never reported to the sink.
    Interrupted,
}

/// The classified result of executing a [`Request`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Outcome {
    rows: u64,
    latency_ms: u64,
    status: OutcomeStatus,
}

impl Outcome {
    pub fn completed(rows: u64, latency: Duration) -> Self {
        Self {
            rows,
            latency_ms: whole_millis(latency),
            status: OutcomeStatus::Completed,
        }
    }

    pub fn failed(error: impl Into<String>, latency: Duration) -> Self {
        Self {
            rows: 0,
            latency_ms: whole_millis(latency),
            status: OutcomeStatus::Failed(error.into()),
        }
    }

    pub fn interrupted(latency: Duration) -> Self {
        Self {
            rows: 0,
            latency_ms: whole_millis(latency),
            status: OutcomeStatus::Interrupted,
        }
    }

    pub fn rows(&self) -> u64 {
        self.rows
    }

    pub fn latency_ms(&self) -> u64 {
        self.latency_ms
    }

    pub fn status(&self) -> &OutcomeStatus {
        &self.status
    }

    pub fn error(&self) -> Option<&str> {
        match &self.status {
            OutcomeStatus::Failed(e) => Some(e),
            _ => None,
        }
    }

    pub fn is_interrupted(&self) -> bool {
        self.status == OutcomeStatus::Interrupted
    }

    pub fn is_success(&self) -> bool {
        self.status == OutcomeStatus::Completed
    }

    /// `(row_count, latency_ms, interrupted)`
    pub fn as_tuple(&self) -> (u64, u64, bool) {
        (self.rows, self.latency_ms, self.is_interrupted())
    }
}

fn whole_millis(d: Duration) -> u64 {
    u64::try_from(d.as_millis()).unwrap_or(u64::MAX)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_request_kind_parsing() {
        assert_eq!("read".parse::<RequestKind>(), Ok(RequestKind::Read));
        assert_eq!("WRITE".parse::<RequestKind>(), Ok(RequestKind::Write));
        assert_eq!("CypherRead".parse::<RequestKind>(), Ok(RequestKind::Read));
        assert!("delete".parse::<RequestKind>().is_err());
        assert!("".parse::<RequestKind>().is_err());
    }

    #[test]
    fn test_request_kind_serializes_as_display() {
        assert_eq!(serde_json::to_string(&RequestKind::Read).unwrap(), "\"Read\"");
        assert_eq!(RequestKind::Write.to_string(), "Write");
    }

    #[test]
    fn test_query_display_name() {
        let q = Query::new("  MATCH (n) RETURN n  ");
        assert_eq!(q.display_name(), "MATCH (n) RETURN n");

        let q = q.named("all_nodes").param("limit", 5);
        assert_eq!(q.display_name(), "all_nodes");
        assert_eq!(q.params().get("limit"), Some(&Value::from(5)));
    }

    #[test]
    fn test_outcome_statuses_are_exclusive() {
        let ok = Outcome::completed(3, Duration::from_micros(12_900));
        assert_eq!(ok.as_tuple(), (3, 12, false));
        assert!(ok.error().is_none());
        assert!(ok.is_success());

        let failed = Outcome::failed("boom", Duration::from_millis(4));
        assert_eq!(failed.rows(), 0);
        assert_eq!(failed.error(), Some("boom"));
        assert!(!failed.is_interrupted());

        let interrupted = Outcome::interrupted(Duration::from_millis(1));
        assert!(interrupted.is_interrupted());
        assert!(interrupted.error().is_none());
        assert_eq!(interrupted.as_tuple(), (0, 1, true));
    }
}
