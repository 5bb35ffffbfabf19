//! # Event Queue
//!
//! A durable FIFO shared between processes through a single file.
//!
//! The file is an append-only sequence of JSON lines and is the only source
//! of truth for queue contents. Every read-modify-write cycle against it
//! holds an exclusive advisory lock on the whole file, which serializes all
//! queue mutations across processes.
//!
//! Two roles share the file:
//! - [`ProducerQueue`] lives in the ingestion process. It mirrors every event
//!   into an in-memory buffer (used only for approximate depth) and appends it
//!   to the file before returning.
//! - [`ConsumerQueue`] lives in the worker process. It pops the head line
//!   straight from the file on every call and polls while the file is empty.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

mod consumer;
mod durable_log;
mod lock;
mod producer;

pub use consumer::{ConsumerQueue, DequeueError};
pub use durable_log::{DurableLog, PopOutcome};
pub use lock::FileLock;
pub use producer::ProducerQueue;

/// Default location of the queue file, relative to the working directory
pub const DEFAULT_QUEUE_FILE: &str = "event_queue.jsonl";

/// Default delay between empty polls of the queue file
pub const DEFAULT_POLL_INTERVAL_MS: u64 = 100;

// ============================================================================
// Configuration
// ============================================================================

/// Queue configuration shared by producers and consumers.
///
/// Both sides must agree on `path`; the remaining settings are per process.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct QueueConfig {
    /// Path of the queue file
    pub path: PathBuf,

    /// Delay between polls while a blocking dequeue waits on an empty queue
    pub poll_interval_ms: u64,

    /// Call `fsync` after every append and rewrite
    pub sync_writes: bool,
}

impl Default for QueueConfig {
    fn default() -> Self {
        Self {
            path: PathBuf::from(DEFAULT_QUEUE_FILE),
            poll_interval_ms: DEFAULT_POLL_INTERVAL_MS,
            sync_writes: false,
        }
    }
}

impl QueueConfig {
    /// Create configuration for a specific queue file with default settings
    pub fn with_path(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            ..Self::default()
        }
    }

    /// Poll interval as a [`Duration`]
    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }
}

// ============================================================================
// Error Types
// ============================================================================

/// Errors raised by queue file operations
#[derive(Debug, thiserror::Error)]
pub enum QueueError {
    /// Appending to or rewriting the queue file failed (disk full,
    /// permissions, I/O error). Never retried internally.
    #[error("Failed to write to queue file {path}: {source}")]
    WriteFailure {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to read queue file {path}: {source}")]
    ReadFailure {
        path: String,
        #[source]
        source: std::io::Error,
    },

    /// The operating system refused the advisory lock on the queue file
    #[error("Advisory lock unavailable for queue file {path}: {source}")]
    LockUnavailable {
        path: String,
        #[source]
        source: std::io::Error,
    },
}

impl QueueError {
    /// Check if the failure may clear up on its own and is worth retrying
    pub fn is_transient(&self) -> bool {
        match self {
            Self::WriteFailure { .. } | Self::ReadFailure { .. } => true,
            Self::LockUnavailable { .. } => false,
        }
    }

    /// Path of the queue file involved
    pub fn path(&self) -> &str {
        match self {
            Self::WriteFailure { path, .. }
            | Self::ReadFailure { path, .. }
            | Self::LockUnavailable { path, .. } => path,
        }
    }
}

#[cfg(test)]
#[path = "mod_tests.rs"]
mod tests;
