//! Tests for the pulse-core library module.

use super::*;
use serde_json::json;

#[test]
fn test_record_preserves_field_order() {
    let record = EventRecord::new()
        .with("site_id", "s1")
        .with("event_type", "view")
        .with("path", "/pricing");

    assert_eq!(
        record.to_line(),
        r#"{"site_id":"s1","event_type":"view","path":"/pricing"}"#
    );
}

#[test]
fn test_record_parses_line() {
    let record = EventRecord::from_line(r#"{"site_id":"s1","event_type":"click","user_id":"u-1"}"#)
        .expect("valid line should parse");

    assert_eq!(record.site_id(), Some("s1"));
    assert_eq!(record.event_type(), Some("click"));
    assert_eq!(record.user_id(), Some("u-1"));
    assert_eq!(record.path(), None);
}

#[test]
fn test_record_line_never_contains_newlines() {
    let record = EventRecord::new()
        .with("site_id", "s1")
        .with("event_type", "view")
        .with("path", "/a\nb\r\nc");

    let line = record.to_line();
    assert!(!line.contains('\n'));
    assert!(!line.contains('\r'));

    let parsed = EventRecord::from_line(&line).unwrap();
    assert_eq!(parsed.path(), Some("/a\nb\r\nc"));
}

#[test]
fn test_record_rejects_truncated_json() {
    let result = EventRecord::from_line(r#"{"site_id":"s1","event_ty"#);
    assert!(matches!(result, Err(ParseError::InvalidJson { .. })));
}

#[test]
fn test_record_rejects_non_object_json() {
    let result = EventRecord::from_line("42");
    assert_eq!(
        result,
        Err(ParseError::NotAnObject {
            actual: "number".to_string()
        })
    );

    let result = EventRecord::from_line(r#"["site_id"]"#);
    assert!(matches!(result, Err(ParseError::NotAnObject { .. })));
}

#[test]
fn test_record_rejects_invalid_utf8() {
    let result = EventRecord::from_bytes(&[b'{', 0xff, 0xfe, b'}']);
    assert!(matches!(result, Err(ParseError::InvalidJson { .. })));
}

#[test]
fn test_ensure_timestamp_fills_missing_value() {
    let mut record = EventRecord::new().with("site_id", "s1");

    assert!(record.ensure_timestamp());

    let timestamp = record.timestamp().expect("timestamp should be set");
    assert!(timestamp.ends_with('Z'));
    assert!(chrono::DateTime::parse_from_rfc3339(timestamp).is_ok());
}

#[test]
fn test_ensure_timestamp_keeps_existing_value() {
    let mut record = EventRecord::new().with("timestamp", "2025-11-12T19:30:01Z");

    assert!(!record.ensure_timestamp());
    assert_eq!(record.timestamp(), Some("2025-11-12T19:30:01Z"));
}

// ============================================================================
// Validation Tests
// ============================================================================

#[test]
fn test_validate_accepts_minimal_event() {
    let record = EventRecord::from_value(json!({
        "site_id": "site-abc-123",
        "event_type": "page_view"
    }))
    .unwrap();

    assert!(validate_event(&record).is_ok());
}

#[test]
fn test_validate_reports_missing_site_id_first() {
    let record = EventRecord::new();

    let err = validate_event(&record).unwrap_err();
    assert_eq!(err.field(), "site_id");
    assert_eq!(err.to_string(), "Missing required field: site_id");
}

#[test]
fn test_validate_reports_missing_event_type() {
    let record = EventRecord::new().with("site_id", "site-abc-123");

    let err = validate_event(&record).unwrap_err();
    assert_eq!(err.to_string(), "Missing required field: event_type");
}

#[test]
fn test_validate_rejects_blank_and_non_string_values() {
    let blank = EventRecord::new()
        .with("site_id", "   ")
        .with("event_type", "view");
    assert_eq!(
        validate_event(&blank).unwrap_err().to_string(),
        "site_id must be a non-empty string"
    );

    let numeric = EventRecord::new()
        .with("site_id", "s1")
        .with("event_type", 7);
    assert_eq!(
        validate_event(&numeric).unwrap_err().to_string(),
        "event_type must be a non-empty string"
    );

    let null = EventRecord::from_value(json!({"site_id": null, "event_type": "view"})).unwrap();
    assert!(matches!(
        validate_event(&null),
        Err(ValidationError::InvalidFormat { .. })
    ));
}
