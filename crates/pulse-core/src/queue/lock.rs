//! Advisory whole-file lock guarding queue mutations.

use super::QueueError;
use fs2::FileExt;
use std::fs::File;
use std::path::Path;
use tracing::{trace, warn};

/// Exclusive advisory lock over an open queue file.
///
/// Backed by `flock` on Unix and `LockFileEx` on Windows, so two handles on
/// the same file exclude each other whether they live in one process or in
/// different ones. The lock covers the whole file for the duration of one
/// read-modify-write cycle.
///
/// The lock is released by [`FileLock::release`] or, failing that, when the
/// guard is dropped. Releasing more than once is a no-op.
#[derive(Debug)]
pub struct FileLock<'a> {
    file: &'a File,
    path: &'a Path,
    released: bool,
}

impl<'a> FileLock<'a> {
    /// Block until the exclusive lock on `file` is held.
    ///
    /// # Errors
    ///
    /// Returns [`QueueError::LockUnavailable`] when the operating system
    /// refuses the lock, e.g. on a filesystem without lock support.
    pub fn acquire(file: &'a File, path: &'a Path) -> Result<Self, QueueError> {
        FileExt::lock_exclusive(file).map_err(|source| QueueError::LockUnavailable {
            path: path.display().to_string(),
            source,
        })?;

        trace!(path = %path.display(), "Acquired queue file lock");

        Ok(Self {
            file,
            path,
            released: false,
        })
    }

    /// Release the lock.
    pub fn release(&mut self) -> Result<(), QueueError> {
        if self.released {
            return Ok(());
        }
        self.released = true;

        FileExt::unlock(self.file).map_err(|source| QueueError::LockUnavailable {
            path: self.path.display().to_string(),
            source,
        })?;

        trace!(path = %self.path.display(), "Released queue file lock");
        Ok(())
    }

    pub fn is_released(&self) -> bool {
        self.released
    }
}

impl Drop for FileLock<'_> {
    fn drop(&mut self) {
        if !self.released {
            if let Err(e) = FileExt::unlock(self.file) {
                warn!(path = %self.path.display(), error = %e, "Failed to release queue file lock");
            }
        }
    }
}

#[cfg(test)]
#[path = "lock_tests.rs"]
mod tests;
