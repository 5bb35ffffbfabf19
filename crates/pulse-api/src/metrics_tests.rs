//! Tests for service metrics.

use super::*;

#[test]
fn test_instances_do_not_share_a_registry() {
    let first = ServiceMetrics::new().unwrap();
    let second = ServiceMetrics::new().unwrap();

    first.events_received_total.inc();

    assert_eq!(first.events_received_total.get(), 1);
    assert_eq!(second.events_received_total.get(), 0);
}

#[test]
fn test_render_includes_recorded_requests() {
    let metrics = ServiceMetrics::new().unwrap();

    metrics.record_http_request("GET", "/stats", 200, Duration::from_millis(3));
    metrics.stats_requests_total.inc();
    metrics.set_queue_buffer_size(7);

    let text = metrics.render().unwrap();

    assert!(text.contains(r#"http_requests_total{method="GET",path="/stats",status="200"} 1"#));
    assert!(text.contains("http_request_duration_seconds_count"));
    assert!(text.contains("stats_requests_total 1"));
    assert!(text.contains("queue_buffer_size 7"));
}
