//! Request statistics and event sinks for graph-loadgen.
//!
//! - [`RequestStats`] aggregates events per (type, name) with a rounded
//!   response-time histogram for percentiles
//! - [`StatsReport`] is the serializable snapshot, rendered by
//!   [`format_table`], [`format_markdown`] and [`format_json`]
//! - [`JsonlSink`] keeps the raw events; [`read_events`] loads them back
//! - [`FanoutSink`] sends every event to several sinks

mod error;
mod fanout;
mod jsonl;
mod report;
mod stats;

pub use error::StatsError;
pub use fanout::FanoutSink;
pub use jsonl::{read_events, JsonlSink};
pub use report::{
    format_json, format_markdown, format_progress, format_table, EntryReport, StatsReport,
};
pub use stats::{rounded_response_time, ErrorEntry, RequestStats, StatsEntry, AGGREGATED_NAME};
