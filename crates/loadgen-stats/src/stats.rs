//! In-memory request statistics.

use chrono::{DateTime, Utc};
use loadgen_core::{MetricsSink, RequestEvent, RequestKind};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use std::sync::{Mutex, MutexGuard, PoisonError};

/// Name of the row that sums every entry.
pub const AGGREGATED_NAME: &str = "Aggregated";

/// Round a response time to its histogram bucket: exact below 100 ms, to
/// the nearest 10 ms below 1000 ms, to the nearest 100 ms above.
pub fn rounded_response_time(ms: u64) -> u64 {
    match ms {
        0..=99 => ms,
        100..=999 => (ms + 5) / 10 * 10,
        _ => (ms + 50) / 100 * 100,
    }
}

/// Counters for one (type, name) pair, or for the aggregated total.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct StatsEntry {
    pub num_requests: u64,
    pub num_failures: u64,
    pub total_response_time_ms: u64,
    pub min_response_time_ms: Option<u64>,
    pub max_response_time_ms: u64,
    pub total_content_length: u64,
    /// Rounded response time → number of requests
    pub response_times: BTreeMap<u64, u64>,
}

impl StatsEntry {
    pub fn log(&mut self, response_time_ms: u64, content_length: u64, failed: bool) {
        self.num_requests += 1;
        if failed {
            self.num_failures += 1;
        }
        self.total_response_time_ms += response_time_ms;
        self.min_response_time_ms = Some(
            self.min_response_time_ms
                .map_or(response_time_ms, |min| min.min(response_time_ms)),
        );
        self.max_response_time_ms = self.max_response_time_ms.max(response_time_ms);
        self.total_content_length += content_length;
        *self
            .response_times
            .entry(rounded_response_time(response_time_ms))
            .or_insert(0) += 1;
    }

    /// Fold another entry into this one.
    pub fn extend(&mut self, other: &StatsEntry) {
        self.num_requests += other.num_requests;
        self.num_failures += other.num_failures;
        self.total_response_time_ms += other.total_response_time_ms;
        self.min_response_time_ms = match (self.min_response_time_ms, other.min_response_time_ms) {
            (Some(a), Some(b)) => Some(a.min(b)),
            (a, b) => a.or(b),
        };
        self.max_response_time_ms = self.max_response_time_ms.max(other.max_response_time_ms);
        self.total_content_length += other.total_content_length;
        for (bucket, count) in &other.response_times {
            *self.response_times.entry(*bucket).or_insert(0) += count;
        }
    }

    pub fn avg_response_time_ms(&self) -> f64 {
        if self.num_requests == 0 {
            return 0.0;
        }
        self.total_response_time_ms as f64 / self.num_requests as f64
    }

    pub fn avg_content_length(&self) -> f64 {
        if self.num_requests == 0 {
            return 0.0;
        }
        self.total_content_length as f64 / self.num_requests as f64
    }

    pub fn fail_ratio(&self) -> f64 {
        if self.num_requests == 0 {
            return 0.0;
        }
        self.num_failures as f64 / self.num_requests as f64
    }

    /// Response time (bucketed) that `percent` of requests stayed at or under.
    pub fn percentile(&self, percent: f64) -> u64 {
        if self.num_requests == 0 {
            return 0;
        }
        let below = (self.num_requests as f64 * percent) as u64;
        let mut processed = 0u64;
        for (bucket, count) in self.response_times.iter().rev() {
            processed += count;
            if self.num_requests - processed <= below {
                return *bucket;
            }
        }
        0
    }

    pub fn median_response_time_ms(&self) -> u64 {
        self.percentile(0.5)
    }
}

/// Occurrences of one error message for one (type, name) pair.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorEntry {
    #[serde(rename = "type")]
    pub kind: RequestKind,
    pub name: String,
    pub error: String,
    pub occurrences: u64,
}

#[derive(Default)]
struct StatsInner {
    entries: HashMap<(RequestKind, String), StatsEntry>,
    errors: HashMap<(RequestKind, String, String), u64>,
    total: StatsEntry,
}

/// Thread-safe statistics sink.
pub struct RequestStats {
    started_at: DateTime<Utc>,
    inner: Mutex<StatsInner>,
}

impl RequestStats {
    pub fn new() -> Self {
        Self::starting_at(Utc::now())
    }

    pub fn starting_at(started_at: DateTime<Utc>) -> Self {
        Self {
            started_at,
            inner: Mutex::new(StatsInner::default()),
        }
    }

    /// Rebuild statistics from recorded events.
    pub fn from_events(events: &[RequestEvent]) -> Self {
        let started_at = events
            .iter()
            .map(|e| e.timestamp)
            .min()
            .unwrap_or_else(Utc::now);
        let stats = Self::starting_at(started_at);
        for event in events {
            stats.log_event(event);
        }
        stats
    }

    pub fn started_at(&self) -> DateTime<Utc> {
        self.started_at
    }

    /// Entry for one (type, name) pair.
    pub fn entry(&self, kind: RequestKind, name: &str) -> Option<StatsEntry> {
        self.inner()
            .entries
            .get(&(kind, name.to_string()))
            .cloned()
    }

    /// Every entry, sorted by type then name.
    pub fn entries(&self) -> Vec<(RequestKind, String, StatsEntry)> {
        let inner = self.inner();
        let mut entries: Vec<_> = inner
            .entries
            .iter()
            .map(|((kind, name), entry)| (*kind, name.clone(), entry.clone()))
            .collect();
        entries.sort_by(|a, b| (a.0.to_string(), &a.1).cmp(&(b.0.to_string(), &b.1)));
        entries
    }

    pub fn total(&self) -> StatsEntry {
        self.inner().total.clone()
    }

    /// Errors sorted by descending occurrences.
    pub fn errors(&self) -> Vec<ErrorEntry> {
        let inner = self.inner();
        let mut errors: Vec<ErrorEntry> = inner
            .errors
            .iter()
            .map(|((kind, name, error), occurrences)| ErrorEntry {
                kind: *kind,
                name: name.clone(),
                error: error.clone(),
                occurrences: *occurrences,
            })
            .collect();
        errors.sort_by(|a, b| {
            b.occurrences
                .cmp(&a.occurrences)
                .then_with(|| a.name.cmp(&b.name))
                .then_with(|| a.error.cmp(&b.error))
        });
        errors
    }

    pub fn reset(&self) {
        *self.inner() = StatsInner::default();
    }

    fn log_event(&self, event: &RequestEvent) {
        let mut inner = self.inner();
        let failed = event.is_failure();
        inner
            .entries
            .entry((event.kind, event.name.clone()))
            .or_default()
            .log(event.response_time_ms, event.response_length, failed);
        inner
            .total
            .log(event.response_time_ms, event.response_length, failed);
        if let Some(error) = &event.exception {
            *inner
                .errors
                .entry((event.kind, event.name.clone(), error.clone()))
                .or_insert(0) += 1;
        }
    }

    fn inner(&self) -> MutexGuard<'_, StatsInner> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl Default for RequestStats {
    fn default() -> Self {
        Self::new()
    }
}

impl MetricsSink for RequestStats {
    fn record(&self, event: RequestEvent) {
        self.log_event(&event);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use loadgen_core::EventContext;

    fn event(kind: RequestKind, name: &str, ms: u64, rows: u64, error: Option<&str>) -> RequestEvent {
        RequestEvent {
            kind,
            name: name.to_string(),
            response_time_ms: ms,
            response_length: rows,
            exception: error.map(str::to_string),
            context: EventContext {
                actor_id: "a".to_string(),
                client_id: "c".to_string(),
            },
            timestamp: Utc::now(),
        }
    }

    #[test]
    fn test_rounded_response_time() {
        assert_eq!(rounded_response_time(0), 0);
        assert_eq!(rounded_response_time(99), 99);
        assert_eq!(rounded_response_time(147), 150);
        assert_eq!(rounded_response_time(144), 140);
        assert_eq!(rounded_response_time(3432), 3400);
        assert_eq!(rounded_response_time(58760), 58800);
    }

    #[test]
    fn test_entry_counters() {
        let mut entry = StatsEntry::default();
        entry.log(10, 5, false);
        entry.log(30, 0, true);
        entry.log(20, 1, false);

        assert_eq!(entry.num_requests, 3);
        assert_eq!(entry.num_failures, 1);
        assert_eq!(entry.min_response_time_ms, Some(10));
        assert_eq!(entry.max_response_time_ms, 30);
        assert_eq!(entry.avg_response_time_ms(), 20.0);
        assert_eq!(entry.avg_content_length(), 2.0);
        assert_eq!(entry.median_response_time_ms(), 20);
    }

    #[test]
    fn test_percentiles() {
        let mut entry = StatsEntry::default();
        for ms in 1..=100 {
            entry.log(ms, 0, false);
        }
        assert_eq!(entry.percentile(0.5), 51);
        assert_eq!(entry.percentile(0.95), 96);
        assert_eq!(entry.percentile(0.99), 100);
        assert_eq!(entry.percentile(1.0), 100);
        assert_eq!(StatsEntry::default().percentile(0.5), 0);
    }

    #[test]
    fn test_extend_merges_histograms() {
        let mut a = StatsEntry::default();
        a.log(10, 1, false);
        let mut b = StatsEntry::default();
        b.log(5, 2, true);
        b.log(10, 0, false);

        a.extend(&b);
        assert_eq!(a.num_requests, 3);
        assert_eq!(a.num_failures, 1);
        assert_eq!(a.min_response_time_ms, Some(5));
        assert_eq!(a.response_times.get(&10), Some(&2));
    }

    #[test]
    fn test_sink_groups_by_kind_and_name() {
        let stats = RequestStats::new();
        stats.record(event(RequestKind::Read, "q1", 10, 5, None));
        stats.record(event(RequestKind::Read, "q1", 20, 5, None));
        stats.record(event(RequestKind::Write, "q1", 30, 0, Some("boom")));
        stats.record(event(RequestKind::Write, "q1", 40, 0, Some("boom")));

        let read = stats.entry(RequestKind::Read, "q1").unwrap();
        assert_eq!(read.num_requests, 2);
        assert_eq!(read.num_failures, 0);

        let write = stats.entry(RequestKind::Write, "q1").unwrap();
        assert_eq!(write.num_failures, 2);

        assert_eq!(stats.total().num_requests, 4);
        assert_eq!(
            stats.errors(),
            vec![ErrorEntry {
                kind: RequestKind::Write,
                name: "q1".to_string(),
                error: "boom".to_string(),
                occurrences: 2,
            }]
        );

        let entries = stats.entries();
        assert_eq!(entries[0].0, RequestKind::Read);
        assert_eq!(entries[1].0, RequestKind::Write);

        stats.reset();
        assert_eq!(stats.total().num_requests, 0);
        assert!(stats.errors().is_empty());
    }
}
