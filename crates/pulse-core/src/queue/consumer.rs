//! Consumer side of the queue, used by the worker process.

use super::{DurableLog, PopOutcome, QueueConfig, QueueError};
use crate::EventRecord;
use std::thread;
use std::time::{Duration, Instant};
use tracing::trace;

/// Outcome of a dequeue that produced no record
#[derive(Debug, thiserror::Error)]
pub enum DequeueError {
    /// Non-blocking dequeue found nothing
    #[error("Queue is empty")]
    Empty,

    /// Blocking dequeue waited the full timeout without a record arriving
    #[error("Timed out after {waited:?} waiting for a queued event")]
    TimedOut { waited: Duration },

    #[error(transparent)]
    Queue(#[from] QueueError),
}

impl DequeueError {
    /// `Empty` and `TimedOut` are normal control flow; callers loop and retry
    pub fn is_no_record(&self) -> bool {
        matches!(self, Self::Empty | Self::TimedOut { .. })
    }
}

/// Reads events straight from the [`DurableLog`].
///
/// There is no local buffering: every [`ConsumerQueue::get`] pops the head
/// of the file under the lock, so the consumer always sees the file's current
/// state. While the file is empty a blocking `get` polls at a fixed interval;
/// there is no cross-process wake-up, so dequeue latency is bounded by the
/// poll interval.
#[derive(Debug, Clone)]
pub struct ConsumerQueue {
    log: DurableLog,
    poll_interval: Duration,
}

impl ConsumerQueue {
    pub fn new(log: DurableLog, poll_interval: Duration) -> Self {
        Self { log, poll_interval }
    }

    pub fn from_config(config: &QueueConfig) -> Self {
        Self::new(DurableLog::from_config(config), config.poll_interval())
    }

    /// Remove and return the oldest event.
    ///
    /// - `block == false`: a single attempt; [`DequeueError::Empty`] if
    ///   nothing is queued.
    /// - `block == true`, `timeout == None`: poll until an event arrives.
    /// - `block == true`, `timeout == Some(t)`: poll until an event arrives
    ///   or `t` has elapsed, then [`DequeueError::TimedOut`]. The last sleep
    ///   is shortened to the time remaining.
    ///
    /// Malformed head lines are dropped by the log and skipped here without
    /// waiting, so they never show up as an empty queue.
    pub fn get(&self, block: bool, timeout: Option<Duration>) -> Result<EventRecord, DequeueError> {
        let started = Instant::now();

        loop {
            if let Some(record) = self.next_record()? {
                return Ok(record);
            }

            if !block {
                return Err(DequeueError::Empty);
            }

            let sleep_for = match timeout {
                Some(timeout) => {
                    let waited = started.elapsed();
                    if waited >= timeout {
                        return Err(DequeueError::TimedOut { waited });
                    }
                    self.poll_interval.min(timeout - waited)
                }
                None => self.poll_interval,
            };

            trace!(sleep_ms = sleep_for.as_millis() as u64, "Queue empty, polling");
            thread::sleep(sleep_for);
        }
    }

    /// Non-blocking dequeue
    pub fn try_get(&self) -> Result<EventRecord, DequeueError> {
        self.get(false, None)
    }

    /// Whether the queue file currently holds no lines (approximate)
    pub fn empty(&self) -> Result<bool, QueueError> {
        Ok(self.log.count()? == 0)
    }

    /// Number of lines in the queue file, read without the lock
    pub fn approximate_depth(&self) -> Result<usize, QueueError> {
        self.log.count()
    }

    pub fn poll_interval(&self) -> Duration {
        self.poll_interval
    }

    pub fn log(&self) -> &DurableLog {
        &self.log
    }

    fn next_record(&self) -> Result<Option<EventRecord>, QueueError> {
        loop {
            match self.log.pop_front_outcome()? {
                PopOutcome::Record(record) => return Ok(Some(record)),
                PopOutcome::Discarded { .. } => continue,
                PopOutcome::Empty => return Ok(None),
            }
        }
    }
}

#[cfg(test)]
#[path = "consumer_tests.rs"]
mod tests;
