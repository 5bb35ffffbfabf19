//! Common test utilities for Pulse integration tests
//!
//! This module provides:
//! - A scratch pipeline (queue file, database, app state) in a temp directory
//! - Request builders and body readers for router tests
//! - Event builders

use axum::{
    body::Body,
    http::Request,
    response::Response,
};
use pulse_api::{AppState, ServiceConfig, ServiceMetrics};
use pulse_core::{
    ConsumerQueue, DurableLog, EventRecord, EventWorker, ProducerQueue, SqliteEventStore,
    WorkOutcome,
};
use serde_json::Value;
use std::path::PathBuf;
use std::sync::Arc;
use tempfile::TempDir;

// ============================================================================
// Pipeline Fixture
// ============================================================================

/// Queue file, store and service state rooted in one temp directory
#[allow(dead_code)]
pub struct TestPipeline {
    pub config: ServiceConfig,
    pub queue: Arc<ProducerQueue>,
    pub store: Arc<SqliteEventStore>,
    pub state: AppState,
    _temp_dir: TempDir,
}

#[allow(dead_code)]
impl TestPipeline {
    pub fn new() -> Self {
        let temp_dir = TempDir::new().expect("create temp dir");

        let mut config = ServiceConfig::default();
        config.queue.path = temp_dir.path().join("event_queue.jsonl");
        config.queue.poll_interval_ms = 10;
        config.store.path = temp_dir.path().join("analytics.db");
        config.worker.dequeue_timeout_ms = 50;
        config.worker.error_backoff_ms = 10;

        let queue = Arc::new(
            ProducerQueue::open(DurableLog::from_config(&config.queue)).expect("open queue"),
        );
        let store = Arc::new(SqliteEventStore::from_config(&config.store).expect("open store"));
        let metrics = ServiceMetrics::new().expect("create metrics");

        let state = AppState::new(config.clone(), queue.clone(), store.clone(), metrics);

        Self {
            config,
            queue,
            store,
            state,
            _temp_dir: temp_dir,
        }
    }

    pub fn queue_path(&self) -> PathBuf {
        self.config.queue.path.clone()
    }

    /// A worker reading this pipeline's queue file into its store
    pub fn worker(&self) -> EventWorker {
        EventWorker::new(
            ConsumerQueue::from_config(&self.config.queue),
            self.store.clone(),
            self.config.worker.clone(),
        )
    }

    /// Run a worker until the queue stays empty for one dequeue timeout
    pub fn drain(&self) -> usize {
        let worker = self.worker();
        let mut handled = 0;
        while worker.run_once().expect("worker step") != WorkOutcome::Idle {
            handled += 1;
        }
        handled
    }
}

// ============================================================================
// Request Helpers
// ============================================================================

#[allow(dead_code)]
pub fn post_json(uri: &str, body: &Value) -> Request<Body> {
    Request::builder()
        .method("POST")
        .uri(uri)
        .header("content-type", "application/json")
        .body(Body::from(body.to_string()))
        .expect("build request")
}

#[allow(dead_code)]
pub fn get(uri: &str) -> Request<Body> {
    Request::builder()
        .uri(uri)
        .body(Body::empty())
        .expect("build request")
}

#[allow(dead_code)]
pub async fn body_json(response: Response) -> Value {
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .expect("read body");
    serde_json::from_slice(&bytes).expect("JSON body")
}

// ============================================================================
// Event Builders
// ============================================================================

#[allow(dead_code)]
pub fn page_view(site_id: &str, path: &str, user_id: &str) -> EventRecord {
    EventRecord::new()
        .with("site_id", site_id)
        .with("event_type", "page_view")
        .with("path", path)
        .with("user_id", user_id)
}
