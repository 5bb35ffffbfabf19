//! Prometheus metrics for the ingestion and reporting service.

use prometheus::{
    HistogramOpts, HistogramVec, IntCounter, IntCounterVec, IntGauge, Opts, Registry,
    TextEncoder,
};
use std::sync::Arc;
use std::time::Duration;

/// Service metrics, registered on a registry owned by this instance
#[derive(Debug)]
pub struct ServiceMetrics {
    registry: Registry,

    // HTTP request metrics
    pub http_requests_total: IntCounterVec,
    pub http_request_duration: HistogramVec,

    // Ingestion metrics
    pub events_received_total: IntCounter,
    pub events_rejected_total: IntCounter,
    pub queue_write_failures_total: IntCounter,
    pub queue_buffer_size: IntGauge,

    // Reporting metrics
    pub stats_requests_total: IntCounter,
}

impl ServiceMetrics {
    pub fn new() -> Result<Arc<Self>, prometheus::Error> {
        let registry = Registry::new();

        let http_requests_total = IntCounterVec::new(
            Opts::new("http_requests_total", "Total number of HTTP requests"),
            &["method", "path", "status"],
        )?;
        let http_request_duration = HistogramVec::new(
            HistogramOpts::new(
                "http_request_duration_seconds",
                "HTTP request processing time",
            )
            .buckets(vec![0.001, 0.005, 0.01, 0.05, 0.1, 0.5, 1.0, 5.0]),
            &["method", "path"],
        )?;
        let events_received_total = IntCounter::new(
            "events_received_total",
            "Events accepted and queued",
        )?;
        let events_rejected_total = IntCounter::new(
            "events_rejected_total",
            "Events rejected as malformed or invalid",
        )?;
        let queue_write_failures_total = IntCounter::new(
            "queue_write_failures_total",
            "Events that could not be appended to the queue file",
        )?;
        let queue_buffer_size = IntGauge::new(
            "queue_buffer_size",
            "Events held in the ingestion process's queue buffer",
        )?;
        let stats_requests_total =
            IntCounter::new("stats_requests_total", "Site report requests served")?;

        registry.register(Box::new(http_requests_total.clone()))?;
        registry.register(Box::new(http_request_duration.clone()))?;
        registry.register(Box::new(events_received_total.clone()))?;
        registry.register(Box::new(events_rejected_total.clone()))?;
        registry.register(Box::new(queue_write_failures_total.clone()))?;
        registry.register(Box::new(queue_buffer_size.clone()))?;
        registry.register(Box::new(stats_requests_total.clone()))?;

        Ok(Arc::new(Self {
            registry,
            http_requests_total,
            http_request_duration,
            events_received_total,
            events_rejected_total,
            queue_write_failures_total,
            queue_buffer_size,
            stats_requests_total,
        }))
    }

    pub fn record_http_request(&self, method: &str, path: &str, status: u16, duration: Duration) {
        self.http_requests_total
            .with_label_values(&[method, path, &status.to_string()])
            .inc();
        self.http_request_duration
            .with_label_values(&[method, path])
            .observe(duration.as_secs_f64());
    }

    pub fn set_queue_buffer_size(&self, size: usize) {
        self.queue_buffer_size
            .set(i64::try_from(size).unwrap_or(i64::MAX));
    }

    /// Text exposition of every metric in this instance's registry
    pub fn render(&self) -> Result<String, prometheus::Error> {
        TextEncoder::new().encode_to_string(&self.registry.gather())
    }
}

#[cfg(test)]
#[path = "metrics_tests.rs"]
mod tests;
