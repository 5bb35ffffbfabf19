//! Tests for the queue file lock

use super::*;
use std::fs::OpenOptions;
use tempfile::TempDir;

fn open(path: &Path) -> File {
    OpenOptions::new()
        .read(true)
        .write(true)
        .create(true)
        .truncate(false)
        .open(path)
        .unwrap()
}

/// Verify that a held lock excludes a second, independently opened handle
/// on the same file, and that releasing it lets the other handle in.
#[test]
fn test_lock_excludes_other_handles_until_released() {
    let temp_dir = TempDir::new().unwrap();
    let path = temp_dir.path().join("queue.jsonl");
    let first = open(&path);
    let second = open(&path);

    let mut lock = FileLock::acquire(&first, &path).expect("lock should be acquired");
    assert!(
        FileExt::try_lock_exclusive(&second).is_err(),
        "second handle must not get the lock while it is held"
    );

    lock.release().unwrap();
    assert!(lock.is_released());

    FileExt::try_lock_exclusive(&second).expect("lock should be free after release");
    FileExt::unlock(&second).unwrap();
}

#[test]
fn test_release_is_idempotent() {
    let temp_dir = TempDir::new().unwrap();
    let path = temp_dir.path().join("queue.jsonl");
    let file = open(&path);

    let mut lock = FileLock::acquire(&file, &path).unwrap();
    lock.release().unwrap();
    lock.release().unwrap();
    assert!(lock.is_released());
}

#[test]
fn test_drop_releases_lock() {
    let temp_dir = TempDir::new().unwrap();
    let path = temp_dir.path().join("queue.jsonl");
    let first = open(&path);
    let second = open(&path);

    {
        let _lock = FileLock::acquire(&first, &path).unwrap();
    }

    FileExt::try_lock_exclusive(&second).expect("dropped guard should release the lock");
    FileExt::unlock(&second).unwrap();
}
