//! Append request events to a JSON Lines file, and read them back.

use crate::error::StatsError;
use loadgen_core::{MetricsSink, RequestEvent};
use std::fs::{File, OpenOptions};
use std::io::{BufRead, BufReader, BufWriter, Write};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Mutex, PoisonError};
use tracing::warn;

/// Writes one JSON object per event.
pub struct JsonlSink {
    path: PathBuf,
    writer: Mutex<BufWriter<File>>,
    written: AtomicU64,
    failed: AtomicU64,
}

impl JsonlSink {
    /// Create (or truncate) `path`.
    pub fn create(path: impl AsRef<Path>) -> Result<Self, StatsError> {
        let path = path.as_ref().to_path_buf();
        let file = OpenOptions::new()
            .create(true)
            .write(true)
            .truncate(true)
            .open(&path)
            .map_err(|source| StatsError::Io {
                path: path.clone(),
                source,
            })?;
        Ok(Self {
            path,
            writer: Mutex::new(BufWriter::new(file)),
            written: AtomicU64::new(0),
            failed: AtomicU64::new(0),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn written(&self) -> u64 {
        self.written.load(Ordering::Relaxed)
    }

    /// Events that could not be written.
    pub fn failed(&self) -> u64 {
        self.failed.load(Ordering::Relaxed)
    }

    pub fn flush(&self) -> Result<(), StatsError> {
        self.writer
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .flush()
            .map_err(|source| StatsError::Io {
                path: self.path.clone(),
                source,
            })
    }

    fn write_event(&self, event: &RequestEvent) -> std::io::Result<()> {
        let line = serde_json::to_string(event)?;
        let mut writer = self.writer.lock().unwrap_or_else(PoisonError::into_inner);
        writer.write_all(line.as_bytes())?;
        writer.write_all(b"\n")
    }
}

impl MetricsSink for JsonlSink {
    fn record(&self, event: RequestEvent) {
        match self.write_event(&event) {
            Ok(()) => {
                self.written.fetch_add(1, Ordering::Relaxed);
            }
            Err(e) => {
                // Log the first failure only.
                if self.failed.fetch_add(1, Ordering::Relaxed) == 0 {
                    warn!("Failed to write event to {}: {}", self.path.display(), e);
                }
            }
        }
    }
}

/// Read every event from a JSONL file. Blank lines are skipped.
pub fn read_events(path: impl AsRef<Path>) -> Result<Vec<RequestEvent>, StatsError> {
    let path = path.as_ref();
    let io_err = |source| StatsError::Io {
        path: path.to_path_buf(),
        source,
    };
    let reader = BufReader::new(File::open(path).map_err(io_err)?);

    let mut events = Vec::new();
    for (index, line) in reader.lines().enumerate() {
        let line = line.map_err(io_err)?;
        if line.trim().is_empty() {
            continue;
        }
        let event = serde_json::from_str(&line).map_err(|source| StatsError::Parse {
            path: path.to_path_buf(),
            line: index + 1,
            source,
        })?;
        events.push(event);
    }
    Ok(events)
}
