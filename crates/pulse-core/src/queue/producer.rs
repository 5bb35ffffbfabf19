//! Producer side of the queue, used by the ingestion process.

use super::{DurableLog, QueueError};
use crate::EventRecord;
use std::collections::VecDeque;
use std::sync::{Mutex, MutexGuard, PoisonError};
use tracing::{debug, info, warn};

/// In-memory FIFO mirrored synchronously to the [`DurableLog`].
///
/// The file stays authoritative. The in-memory buffer only serves
/// [`ProducerQueue::size`], and since removals made by a consumer process
/// are never reflected back into it, that size drifts upwards once a
/// consumer is running. Treat it as a liveness signal, not a queue depth.
///
/// `ProducerQueue` is `Sync`: request handlers on many threads may call
/// [`ProducerQueue::put`] concurrently. The buffer has its own mutex,
/// independent of the file lock.
#[derive(Debug)]
pub struct ProducerQueue {
    log: DurableLog,
    buffer: Mutex<VecDeque<EventRecord>>,
}

impl ProducerQueue {
    /// Open the producer side, replaying the current log into memory.
    ///
    /// Malformed lines are skipped during replay. A missing file yields an
    /// empty buffer.
    ///
    /// # Errors
    ///
    /// Returns an error if an existing log cannot be read or locked.
    pub fn open(log: DurableLog) -> Result<Self, QueueError> {
        let replayed = log.read_all()?;

        info!(
            path = %log.path().display(),
            replayed = replayed.len(),
            "Opened producer queue"
        );

        Ok(Self {
            log,
            buffer: Mutex::new(VecDeque::from(replayed)),
        })
    }

    /// Enqueue one event.
    ///
    /// The event is pushed to memory first and then appended to the log.
    /// On error the in-memory push has already happened, so the caller must
    /// not assume the event is durable unless this returns `Ok`.
    pub fn put(&self, record: EventRecord) -> Result<(), QueueError> {
        self.buffer().push_back(record.clone());

        if let Err(e) = self.log.append(&record) {
            warn!(
                path = %self.log.path().display(),
                error = %e,
                "Failed to append event to queue file"
            );
            return Err(e);
        }

        debug!(path = %self.log.path().display(), "Event enqueued");
        Ok(())
    }

    /// Number of events in the in-memory buffer (approximate depth)
    pub fn size(&self) -> usize {
        self.buffer().len()
    }

    pub fn is_empty(&self) -> bool {
        self.buffer().is_empty()
    }

    /// The shared log this producer appends to
    pub fn log(&self) -> &DurableLog {
        &self.log
    }

    fn buffer(&self) -> MutexGuard<'_, VecDeque<EventRecord>> {
        self.buffer.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

#[cfg(test)]
#[path = "producer_tests.rs"]
mod tests;
