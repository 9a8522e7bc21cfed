//! Error types for event files.

use std::path::PathBuf;
use thiserror::Error;

/// Errors reading or writing JSONL event files.
#[derive(Error, Debug)]
pub enum StatsError {
    /// File could not be opened, read or written
    #[error("I/O error on {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// A line is not a valid request event
    #[error("Invalid event on line {line} of {path}: {source}")]
    Parse {
        path: PathBuf,
        line: usize,
        #[source]
        source: serde_json::Error,
    },
}
