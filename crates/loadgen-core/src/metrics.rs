//! Metrics event shape and the sink trait.

use crate::request::RequestKind;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Who issued a request and through which client.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EventContext {
    pub actor_id: String,
    pub client_id: String,
}

/// One completed (or failed) request, as delivered to a [`MetricsSink`].
///
/// Interrupted requests never produce an event.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RequestEvent {
    #[serde(rename = "type")]
    pub kind: RequestKind,
    /// Statement name, or the statement text when unnamed
    pub name: String,
    pub response_time_ms: u64,
    /// Number of rows returned
    pub response_length: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub exception: Option<String>,
    pub context: EventContext,
    /// When the request started
    pub timestamp: DateTime<Utc>,
}

impl RequestEvent {
    pub fn is_failure(&self) -> bool {
        self.exception.is_some()
    }
}

/// Receives request events. Implementations must be cheap and non-blocking;
/// `record` is called inline on the actor's task.
pub trait MetricsSink: Send + Sync {
    fn record(&self, event: RequestEvent);
}

impl<T: MetricsSink + ?Sized> MetricsSink for std::sync::Arc<T> {
    fn record(&self, event: RequestEvent) {
        (**self).record(event)
    }
}
