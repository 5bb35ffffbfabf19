//! Append-only JSON-lines file holding the queue contents.

use super::{FileLock, QueueConfig, QueueError};
use crate::EventRecord;
use std::fs::{self, File, OpenOptions};
use std::io::{self, Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

/// Result of removing the head line of the log
#[derive(Debug, Clone, PartialEq)]
pub enum PopOutcome {
    /// The head line parsed and has been removed from the file
    Record(EventRecord),

    /// The head line did not parse and has been removed from the file
    /// without being returned
    Discarded { reason: String },

    /// The file is missing or holds no lines
    Empty,
}

/// The queue file.
///
/// One JSON object per line in insertion order. The head of the queue is
/// always the first non-blank line; removing it rewrites the file in place
/// without that line. Every mutation holds the [`FileLock`].
///
/// `DurableLog` holds no open handles: each operation opens the file, does
/// its work under the lock and closes it again, so any number of values may
/// point at the same path from any number of processes.
#[derive(Debug, Clone)]
pub struct DurableLog {
    path: PathBuf,
    sync_writes: bool,
}

impl DurableLog {
    /// Create a log over the file at `path`. The file is created on first append.
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            sync_writes: false,
        }
    }

    pub fn from_config(config: &QueueConfig) -> Self {
        Self {
            path: config.path.clone(),
            sync_writes: config.sync_writes,
        }
    }

    /// Call `fsync` after every append and rewrite
    pub fn with_sync_writes(mut self, sync_writes: bool) -> Self {
        self.sync_writes = sync_writes;
        self
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Append one record as a single line.
    ///
    /// The line and its terminator go out in one write while the lock is
    /// held, so readers never observe a partial line.
    ///
    /// # Errors
    ///
    /// [`QueueError::WriteFailure`] if the file cannot be opened or written,
    /// [`QueueError::LockUnavailable`] if the lock is refused.
    pub fn append(&self, record: &EventRecord) -> Result<(), QueueError> {
        let mut line = record.to_line();
        line.push('\n');

        self.ensure_parent_dir()?;

        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)
            .map_err(|e| self.write_failure(e))?;

        let mut lock = FileLock::acquire(&file, &self.path)?;

        let mut writer = &file;
        writer
            .write_all(line.as_bytes())
            .and_then(|()| writer.flush())
            .map_err(|e| self.write_failure(e))?;
        self.sync(&file)?;

        lock.release()
    }

    /// Remove and return the head record.
    ///
    /// Returns `Ok(None)` when the file is missing or empty, and also when
    /// the head line was malformed: such a line is dropped from the file and
    /// logged, but never returned and never retried.
    pub fn pop_front(&self) -> Result<Option<EventRecord>, QueueError> {
        match self.pop_front_outcome()? {
            PopOutcome::Record(record) => Ok(Some(record)),
            PopOutcome::Discarded { .. } | PopOutcome::Empty => Ok(None),
        }
    }

    /// Remove the head line, reporting whether it held a record, was
    /// discarded as malformed, or did not exist.
    pub fn pop_front_outcome(&self) -> Result<PopOutcome, QueueError> {
        let file = match OpenOptions::new().read(true).write(true).open(&self.path) {
            Ok(file) => file,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(PopOutcome::Empty),
            Err(e) => return Err(self.read_failure(e)),
        };

        let mut lock = FileLock::acquire(&file, &self.path)?;

        let contents = self.read_locked(&file)?;
        let lines = non_blank_lines(&contents);

        let Some((head, rest)) = lines.split_first() else {
            lock.release()?;
            return Ok(PopOutcome::Empty);
        };

        let outcome = match EventRecord::from_bytes(head) {
            Ok(record) => PopOutcome::Record(record),
            Err(e) => {
                warn!(
                    path = %self.path.display(),
                    error = %e,
                    line = %String::from_utf8_lossy(head),
                    "Discarding malformed queue record"
                );
                PopOutcome::Discarded {
                    reason: e.to_string(),
                }
            }
        };

        self.rewrite_locked(&file, rest)?;
        lock.release()?;

        debug!(
            path = %self.path.display(),
            remaining = rest.len(),
            "Removed head of queue file"
        );

        Ok(outcome)
    }

    /// Count non-blank lines without taking the lock.
    ///
    /// The count is approximate under concurrent writers and suitable only
    /// for health and metrics reporting. A missing file counts as zero.
    pub fn count(&self) -> Result<usize, QueueError> {
        match fs::read(&self.path) {
            Ok(contents) => Ok(non_blank_lines(&contents).len()),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(0),
            Err(e) => Err(self.read_failure(e)),
        }
    }

    /// Read every parseable record in file order, skipping malformed lines.
    ///
    /// The file is read under the lock so that no half-finished rewrite is
    /// observed. Nothing is removed.
    pub fn read_all(&self) -> Result<Vec<EventRecord>, QueueError> {
        let file = match File::open(&self.path) {
            Ok(file) => file,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(self.read_failure(e)),
        };

        let mut lock = FileLock::acquire(&file, &self.path)?;
        let contents = self.read_locked(&file)?;
        lock.release()?;

        let records = non_blank_lines(&contents)
            .into_iter()
            .filter_map(|line| match EventRecord::from_bytes(line) {
                Ok(record) => Some(record),
                Err(e) => {
                    debug!(
                        path = %self.path.display(),
                        error = %e,
                        "Skipping malformed queue record during replay"
                    );
                    None
                }
            })
            .collect();

        Ok(records)
    }

    fn read_locked(&self, file: &File) -> Result<Vec<u8>, QueueError> {
        let mut contents = Vec::new();
        let mut reader = file;
        reader
            .read_to_end(&mut contents)
            .map_err(|e| self.read_failure(e))?;
        Ok(contents)
    }

    fn rewrite_locked(&self, file: &File, lines: &[&[u8]]) -> Result<(), QueueError> {
        let mut buffer = Vec::with_capacity(lines.iter().map(|l| l.len() + 1).sum());
        for line in lines {
            buffer.extend_from_slice(line);
            buffer.push(b'\n');
        }

        let mut writer = file;
        file.set_len(0)
            .and_then(|()| writer.seek(SeekFrom::Start(0)).map(|_| ()))
            .and_then(|()| writer.write_all(&buffer))
            .and_then(|()| writer.flush())
            .map_err(|e| self.write_failure(e))?;

        self.sync(file)
    }

    fn sync(&self, file: &File) -> Result<(), QueueError> {
        if self.sync_writes {
            file.sync_data().map_err(|e| self.write_failure(e))?;
        }
        Ok(())
    }

    fn ensure_parent_dir(&self) -> Result<(), QueueError> {
        match self.path.parent() {
            Some(parent) if !parent.as_os_str().is_empty() => {
                fs::create_dir_all(parent).map_err(|e| self.write_failure(e))
            }
            _ => Ok(()),
        }
    }

    fn write_failure(&self, source: io::Error) -> QueueError {
        QueueError::WriteFailure {
            path: self.path.display().to_string(),
            source,
        }
    }

    fn read_failure(&self, source: io::Error) -> QueueError {
        QueueError::ReadFailure {
            path: self.path.display().to_string(),
            source,
        }
    }
}

/// Split file contents into lines, dropping blank ones.
fn non_blank_lines(contents: &[u8]) -> Vec<&[u8]> {
    contents
        .split(|b| *b == b'\n')
        .filter(|line| !line.trim_ascii().is_empty())
        .collect()
}

#[cfg(test)]
#[path = "durable_log_tests.rs"]
mod tests;
