//! Append-only JSON-lines sink.
//!
//! Every append takes an exclusive advisory lock on the day's file, so
//! concurrent writers (threads or processes) never interleave partial lines.

use std::{
    fs::{File, OpenOptions},
    io::{self, Write},
    path::{Path, PathBuf},
    sync::atomic::{AtomicU64, Ordering},
};

use beacon_common::LogEntry;
use chrono::{DateTime, Utc};
use fs2::FileExt;
use thiserror::Error;

use crate::partition::Partition;

#[derive(Debug, Error)]
pub enum SinkError {
    #[error("failed to create log directory {path}: {source}")]
    CreateDir {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("failed to open log file {path}: {source}")]
    Open {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("failed to lock log file {path}: {source}")]
    Lock {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("failed to append to log file {path}: {source}")]
    Write {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("failed to serialize log entry: {0}")]
    Serialize(#[from] serde_json::Error),
}

pub struct EventSink {
    root: PathBuf,
    write_failures: AtomicU64,
}

impl EventSink {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            write_failures: AtomicU64::new(0),
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Appends `entry` to the partition for `at`. Blocks on the file lock.
    pub fn append(&self, entry: &LogEntry, at: DateTime<Utc>) -> Result<PathBuf, SinkError> {
        let partition = Partition::for_date(&self.root, at);
        let line = entry.to_line()?;

        ensure_dir(&partition.dir)?;
        append_locked(&partition.file, line.as_bytes())?;

        Ok(partition.file)
    }

    pub fn record_failure(&self) {
        self.write_failures.fetch_add(1, Ordering::Relaxed);
    }

    pub fn write_failures(&self) -> u64 {
        self.write_failures.load(Ordering::Relaxed)
    }
}

#[cfg(unix)]
fn ensure_dir(path: &Path) -> Result<(), SinkError> {
    use std::os::unix::fs::DirBuilderExt;

    std::fs::DirBuilder::new()
        .recursive(true)
        .mode(0o755)
        .create(path)
        .map_err(|source| SinkError::CreateDir {
            path: path.to_path_buf(),
            source,
        })
}

#[cfg(not(unix))]
fn ensure_dir(path: &Path) -> Result<(), SinkError> {
    std::fs::create_dir_all(path).map_err(|source| SinkError::CreateDir {
        path: path.to_path_buf(),
        source,
    })
}

fn append_locked(path: &Path, line: &[u8]) -> Result<(), SinkError> {
    let mut file: File = OpenOptions::new()
        .create(true)
        .append(true)
        .open(path)
        .map_err(|source| SinkError::Open {
            path: path.to_path_buf(),
            source,
        })?;

    FileExt::lock_exclusive(&file).map_err(|source| SinkError::Lock {
        path: path.to_path_buf(),
        source,
    })?;

    let written = file.write_all(line).and_then(|_| file.flush());

    if let Err(err) = FileExt::unlock(&file) {
        tracing::debug!("failed to release lock on {}: {}", path.display(), err);
    }

    written.map_err(|source| SinkError::Write {
        path: path.to_path_buf(),
        source,
    })
}
