//! Integration tests for several queue handles sharing one file
//!
//! Each handle opens the file independently, the same way the ingestion
//! service and the worker do from separate processes.

use pulse_core::{ConsumerQueue, DequeueError, DurableLog, EventRecord, FileLock, ProducerQueue};
use std::collections::HashMap;
use std::fs::File;
use std::thread;
use std::time::{Duration, Instant};
use tempfile::TempDir;

fn numbered(producer: usize, seq: usize) -> EventRecord {
    EventRecord::new()
        .with("site_id", format!("site-{producer}"))
        .with("event_type", "page_view")
        .with("seq", seq)
}

/// Concurrent producers and one consumer: every record arrives exactly once
/// and each producer's records arrive in the order they were put.
#[test]
fn test_concurrent_producers_and_consumer_lose_nothing() {
    const PRODUCERS: usize = 4;
    const PER_PRODUCER: usize = 50;

    let temp_dir = TempDir::new().unwrap();
    let path = temp_dir.path().join("event_queue.jsonl");

    let producers: Vec<_> = (0..PRODUCERS)
        .map(|p| {
            let path = path.clone();
            thread::spawn(move || {
                let queue = ProducerQueue::open(DurableLog::new(path)).unwrap();
                for seq in 0..PER_PRODUCER {
                    queue.put(numbered(p, seq)).unwrap();
                }
            })
        })
        .collect();

    let consumer = ConsumerQueue::new(DurableLog::new(&path), Duration::from_millis(5));
    let mut received: Vec<EventRecord> = Vec::new();
    let deadline = Instant::now() + Duration::from_secs(30);

    while received.len() < PRODUCERS * PER_PRODUCER && Instant::now() < deadline {
        match consumer.get(true, Some(Duration::from_millis(200))) {
            Ok(record) => received.push(record),
            Err(DequeueError::TimedOut { .. }) => continue,
            Err(e) => panic!("unexpected dequeue error: {e}"),
        }
    }

    for handle in producers {
        handle.join().unwrap();
    }

    assert_eq!(received.len(), PRODUCERS * PER_PRODUCER);

    let mut next_seq: HashMap<String, u64> = HashMap::new();
    for record in &received {
        let site = record.site_id().unwrap().to_string();
        let seq = record.get("seq").and_then(|v| v.as_u64()).unwrap();
        let expected = next_seq.entry(site.clone()).or_insert(0);
        assert_eq!(seq, *expected, "out of order for {site}");
        *expected += 1;
    }
    assert!(consumer.empty().unwrap());
}

/// Two consumers draining one file never hand out the same record.
#[test]
fn test_competing_consumers_never_duplicate() {
    let temp_dir = TempDir::new().unwrap();
    let path = temp_dir.path().join("event_queue.jsonl");
    let log = DurableLog::new(&path);
    for seq in 0..100 {
        log.append(&numbered(0, seq)).unwrap();
    }

    let consumers: Vec<_> = (0..2)
        .map(|_| {
            let consumer = ConsumerQueue::new(DurableLog::new(&path), Duration::from_millis(5));
            thread::spawn(move || {
                let mut seen = Vec::new();
                while let Ok(record) = consumer.try_get() {
                    seen.push(record.get("seq").and_then(|v| v.as_u64()).unwrap());
                }
                seen
            })
        })
        .collect();

    let mut all: Vec<u64> = consumers
        .into_iter()
        .flat_map(|handle| handle.join().unwrap())
        .collect();
    all.sort_unstable();

    assert_eq!(all, (0..100).collect::<Vec<_>>());
}

/// A writer waits while another handle holds the advisory lock.
#[test]
fn test_append_waits_for_lock_holder() {
    let temp_dir = TempDir::new().unwrap();
    let path = temp_dir.path().join("event_queue.jsonl");
    File::create(&path).unwrap();

    let holder_path = path.clone();
    let (locked_tx, locked_rx) = std::sync::mpsc::channel();
    let holder = thread::spawn(move || {
        let file = File::open(&holder_path).unwrap();
        let mut lock = FileLock::acquire(&file, &holder_path).unwrap();
        locked_tx.send(()).unwrap();
        thread::sleep(Duration::from_millis(300));
        lock.release().unwrap();
    });

    locked_rx.recv().unwrap();
    let started = Instant::now();
    DurableLog::new(&path).append(&numbered(0, 0)).unwrap();
    let waited = started.elapsed();

    holder.join().unwrap();

    assert!(waited >= Duration::from_millis(200), "append did not wait: {waited:?}");
    assert_eq!(DurableLog::new(&path).count().unwrap(), 1);
}

/// A restarted producer sees what the previous instance left unconsumed.
#[test]
fn test_producer_restart_replays_unconsumed_records() {
    let temp_dir = TempDir::new().unwrap();
    let path = temp_dir.path().join("event_queue.jsonl");

    {
        let queue = ProducerQueue::open(DurableLog::new(&path)).unwrap();
        for seq in 0..5 {
            queue.put(numbered(0, seq)).unwrap();
        }
    }

    let consumer = ConsumerQueue::new(DurableLog::new(&path), Duration::from_millis(5));
    consumer.try_get().unwrap();
    consumer.try_get().unwrap();

    let restarted = ProducerQueue::open(DurableLog::new(&path)).unwrap();
    assert_eq!(restarted.size(), 3);
}
