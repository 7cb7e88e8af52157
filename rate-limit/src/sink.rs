//! Log sink — append-only, timestamped, best-effort
//!
//! Nothing that goes wrong here may abort the handler: `append` reports a
//! failed write through `tracing` and moves on.

use std::cell::RefCell;
use std::fs::OpenOptions;
use std::io::Write;
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::warn;

const TIMESTAMP_FORMAT: &str = "%Y-%m-%d %H:%M:%S%.6f";

#[derive(Debug, Error)]
#[error("failed to append to {path}: {source}")]
pub struct SinkError {
    pub path: String,
    #[source]
    pub source: std::io::Error,
}

pub trait LogSink {
    /// Append one entry, reporting failure to the caller
    fn try_append(&self, message: &str) -> Result<(), SinkError>;

    /// Append one entry; failures are swallowed
    fn append(&self, message: &str) {
        if let Err(e) = self.try_append(message) {
            warn!("Log sink unavailable: {e}");
        }
    }
}

/// Opens the file for append, writes one line and closes it, per entry
pub struct FileLogSink {
    path: PathBuf,
}

impl FileLogSink {
    pub fn new(path: impl AsRef<Path>) -> Self {
        Self {
            path: path.as_ref().to_path_buf(),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl LogSink for FileLogSink {
    fn try_append(&self, message: &str) -> Result<(), SinkError> {
        let line = format!(
            "[{}] {message}\n",
            chrono::Local::now().format(TIMESTAMP_FORMAT)
        );

        OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)
            .and_then(|mut file| file.write_all(line.as_bytes()))
            .map_err(|source| SinkError {
                path: self.path.display().to_string(),
                source,
            })
    }
}

/// Keeps entries in memory (without timestamps)
#[derive(Default)]
pub struct MemorySink {
    entries: RefCell<Vec<String>>,
}

impl MemorySink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn entries(&self) -> Vec<String> {
        self.entries.borrow().clone()
    }

    /// True if any entry contains `needle`
    pub fn contains(&self, needle: &str) -> bool {
        self.entries.borrow().iter().any(|e| e.contains(needle))
    }
}

impl LogSink for MemorySink {
    fn try_append(&self, message: &str) -> Result<(), SinkError> {
        self.entries.borrow_mut().push(message.to_string());
        Ok(())
    }
}
