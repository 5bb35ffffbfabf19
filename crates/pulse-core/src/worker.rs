//! # Event Worker
//!
//! Drains the on-disk queue into the [`EventStore`]. Runs as its own process
//! (see the `pulse worker` command) alongside the HTTP service, which only
//! appends to the queue.

use crate::queue::{ConsumerQueue, DequeueError, QueueError};
use crate::store::EventStore;
use crate::EventRecord;
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::Duration;
use tracing::{debug, error, info, warn};

/// Default wait for a queued event before re-checking the shutdown flag
pub const DEFAULT_DEQUEUE_TIMEOUT_MS: u64 = 1000;

/// Default pause after a queue read failure
pub const DEFAULT_ERROR_BACKOFF_MS: u64 = 1000;

// ============================================================================
// Configuration
// ============================================================================

/// Worker loop configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct WorkerConfig {
    /// Maximum time a single dequeue blocks
    pub dequeue_timeout_ms: u64,

    /// Pause after a failed queue read before trying again
    pub error_backoff_ms: u64,
}

impl Default for WorkerConfig {
    fn default() -> Self {
        Self {
            dequeue_timeout_ms: DEFAULT_DEQUEUE_TIMEOUT_MS,
            error_backoff_ms: DEFAULT_ERROR_BACKOFF_MS,
        }
    }
}

impl WorkerConfig {
    pub fn dequeue_timeout(&self) -> Duration {
        Duration::from_millis(self.dequeue_timeout_ms)
    }

    pub fn error_backoff(&self) -> Duration {
        Duration::from_millis(self.error_backoff_ms)
    }
}

// ============================================================================
// Statistics
// ============================================================================

/// Counters updated by the worker as it runs
#[derive(Debug, Default)]
pub struct WorkerStats {
    processed: AtomicU64,
    dropped: AtomicU64,
}

impl WorkerStats {
    /// Events written to the store
    pub fn processed(&self) -> u64 {
        self.processed.load(Ordering::Relaxed)
    }

    /// Events discarded for missing fields or failed inserts
    pub fn dropped(&self) -> u64 {
        self.dropped.load(Ordering::Relaxed)
    }

    fn record_processed(&self) {
        self.processed.fetch_add(1, Ordering::Relaxed);
    }

    fn record_dropped(&self) {
        self.dropped.fetch_add(1, Ordering::Relaxed);
    }
}

/// Result of one [`EventWorker::run_once`] step
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WorkOutcome {
    /// An event was stored under the given row id
    Processed { id: i64 },

    /// An event was dequeued but not stored
    Dropped,

    /// No event arrived within the dequeue timeout
    Idle,
}

// ============================================================================
// Worker
// ============================================================================

/// Moves events from the queue into the store, one at a time.
pub struct EventWorker {
    queue: ConsumerQueue,
    store: Arc<dyn EventStore>,
    config: WorkerConfig,
    stats: Arc<WorkerStats>,
}

impl EventWorker {
    pub fn new(queue: ConsumerQueue, store: Arc<dyn EventStore>, config: WorkerConfig) -> Self {
        Self {
            queue,
            store,
            config,
            stats: Arc::new(WorkerStats::default()),
        }
    }

    /// Shared handle to the worker's counters
    pub fn stats(&self) -> Arc<WorkerStats> {
        Arc::clone(&self.stats)
    }

    pub fn queue(&self) -> &ConsumerQueue {
        &self.queue
    }

    pub fn config(&self) -> &WorkerConfig {
        &self.config
    }

    /// Process until `shutdown` is set.
    ///
    /// The flag is checked between dequeues, so shutdown takes effect within
    /// one dequeue timeout. Queue read failures are logged and retried after
    /// the configured backoff.
    pub fn run(&self, shutdown: &AtomicBool) {
        info!(
            queue = %self.queue.log().path().display(),
            dequeue_timeout_ms = self.config.dequeue_timeout_ms,
            "Worker started"
        );

        while !shutdown.load(Ordering::SeqCst) {
            if let Err(e) = self.run_once() {
                error!(error = %e, "Error reading from queue");
                thread::sleep(self.config.error_backoff());
            }
        }

        info!(
            processed = self.stats.processed(),
            dropped = self.stats.dropped(),
            "Worker stopped"
        );
    }

    /// Wait up to the dequeue timeout for one event and process it.
    pub fn run_once(&self) -> Result<WorkOutcome, QueueError> {
        match self.queue.get(true, Some(self.config.dequeue_timeout())) {
            Ok(event) => Ok(self.handle(&event)),
            Err(DequeueError::Queue(e)) => Err(e),
            Err(e) => {
                debug!(reason = %e, "No event dequeued");
                Ok(WorkOutcome::Idle)
            }
        }
    }

    /// Store one event. Returns `false` when the event was dropped.
    pub fn process_event(&self, event: &EventRecord) -> bool {
        matches!(self.handle(event), WorkOutcome::Processed { .. })
    }

    fn handle(&self, event: &EventRecord) -> WorkOutcome {
        let (Some(site_id), Some(event_type)) = (event.site_id(), event.event_type()) else {
            warn!(event = %event, "Skipping event missing site_id or event_type");
            self.stats.record_dropped();
            return WorkOutcome::Dropped;
        };

        match self.store.insert(event) {
            Ok(id) => {
                info!(id, site_id, event_type, "Event stored");
                self.stats.record_processed();
                WorkOutcome::Processed { id }
            }
            Err(e) => {
                error!(error = %e, site_id, event_type, "Failed to store event");
                self.stats.record_dropped();
                WorkOutcome::Dropped
            }
        }
    }
}

impl std::fmt::Debug for EventWorker {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EventWorker")
            .field("queue", &self.queue)
            .field("config", &self.config)
            .field("stats", &self.stats)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
#[path = "worker_tests.rs"]
mod tests;
