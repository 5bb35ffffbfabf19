//! # Pulse Core
//!
//! Core logic for the Pulse analytics pipeline.
//!
//! Events accepted by the HTTP layer are buffered in a cross-process queue
//! backed by a single newline-delimited JSON file. A separate worker process
//! drains that file and persists events into a relational store, which the
//! reporting endpoint then aggregates.
//!
//! ## Architecture
//!
//! - [`queue`]: the durable log, its advisory file lock, and the two queue
//!   roles sharing it ([`ProducerQueue`] and [`ConsumerQueue`])
//! - [`store`]: the persistence store and per-site aggregate reports
//! - [`worker`]: the consumer loop moving events from the queue into the store
//!
//! ## Usage
//!
//! ```rust
//! use pulse_core::{validate_event, EventRecord};
//!
//! let event = EventRecord::new()
//!     .with("site_id", "site-abc-123")
//!     .with("event_type", "page_view");
//!
//! assert!(validate_event(&event).is_ok());
//! assert_eq!(event.to_line(), r#"{"site_id":"site-abc-123","event_type":"page_view"}"#);
//! ```

use chrono::{SecondsFormat, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::fmt;

// ============================================================================
// Event Record
// ============================================================================

/// Field carrying the site an event belongs to
pub const SITE_ID_FIELD: &str = "site_id";

/// Field carrying the kind of event (page_view, click, ...)
pub const EVENT_TYPE_FIELD: &str = "event_type";

/// Optional field carrying the page path
pub const PATH_FIELD: &str = "path";

/// Optional field carrying the visitor identifier
pub const USER_ID_FIELD: &str = "user_id";

/// Optional field carrying the RFC 3339 time the event occurred
pub const TIMESTAMP_FIELD: &str = "timestamp";

/// One analytics event as it travels through the queue.
///
/// The record is an insertion-ordered mapping of field name to JSON value and
/// is opaque to the queue: only [`validate_event`] looks at its shape.
/// Serialized form is a single JSON object on one line.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct EventRecord(Map<String, Value>);

impl EventRecord {
    /// Create an empty record
    pub fn new() -> Self {
        Self(Map::new())
    }

    /// Wrap an existing JSON object
    pub fn from_map(fields: Map<String, Value>) -> Self {
        Self(fields)
    }

    /// Convert a JSON value into a record, requiring it to be an object
    pub fn from_value(value: Value) -> Result<Self, ParseError> {
        match value {
            Value::Object(fields) => Ok(Self(fields)),
            other => Err(ParseError::NotAnObject {
                actual: json_type_name(&other).to_string(),
            }),
        }
    }

    /// Parse one queue line
    pub fn from_line(line: &str) -> Result<Self, ParseError> {
        Self::from_bytes(line.as_bytes())
    }

    /// Parse one queue line from raw bytes
    ///
    /// Invalid UTF-8 is reported the same way as invalid JSON.
    pub fn from_bytes(bytes: &[u8]) -> Result<Self, ParseError> {
        let value: Value =
            serde_json::from_slice(bytes).map_err(|e| ParseError::InvalidJson {
                message: e.to_string(),
            })?;
        Self::from_value(value)
    }

    /// Serialize to a single line (without the trailing line terminator)
    pub fn to_line(&self) -> String {
        self.to_string()
    }

    /// Builder-style field insertion
    pub fn with(mut self, field: impl Into<String>, value: impl Into<Value>) -> Self {
        self.0.insert(field.into(), value.into());
        self
    }

    /// Insert or replace a field, returning the previous value
    pub fn insert(&mut self, field: impl Into<String>, value: impl Into<Value>) -> Option<Value> {
        self.0.insert(field.into(), value.into())
    }

    /// Get a raw field value
    pub fn get(&self, field: &str) -> Option<&Value> {
        self.0.get(field)
    }

    /// Get a field only if it holds a string
    pub fn get_str(&self, field: &str) -> Option<&str> {
        self.0.get(field).and_then(Value::as_str)
    }

    pub fn site_id(&self) -> Option<&str> {
        self.get_str(SITE_ID_FIELD)
    }

    pub fn event_type(&self) -> Option<&str> {
        self.get_str(EVENT_TYPE_FIELD)
    }

    pub fn path(&self) -> Option<&str> {
        self.get_str(PATH_FIELD)
    }

    pub fn user_id(&self) -> Option<&str> {
        self.get_str(USER_ID_FIELD)
    }

    pub fn timestamp(&self) -> Option<&str> {
        self.get_str(TIMESTAMP_FIELD)
    }

    /// Fill in `timestamp` with the current UTC time when it is absent.
    ///
    /// Returns `true` if a timestamp was added.
    pub fn ensure_timestamp(&mut self) -> bool {
        if self.0.contains_key(TIMESTAMP_FIELD) {
            return false;
        }

        let now = Utc::now().to_rfc3339_opts(SecondsFormat::Micros, true);
        self.0.insert(TIMESTAMP_FIELD.to_string(), Value::String(now));
        true
    }

    /// Borrow all fields in insertion order
    pub fn fields(&self) -> &Map<String, Value> {
        &self.0
    }

    /// Consume the record, returning its fields
    pub fn into_fields(self) -> Map<String, Value> {
        self.0
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl fmt::Display for EventRecord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let line = serde_json::to_string(&self.0).map_err(|_| fmt::Error)?;
        f.write_str(&line)
    }
}

impl From<Map<String, Value>> for EventRecord {
    fn from(fields: Map<String, Value>) -> Self {
        Self::from_map(fields)
    }
}

impl TryFrom<Value> for EventRecord {
    type Error = ParseError;

    fn try_from(value: Value) -> Result<Self, Self::Error> {
        Self::from_value(value)
    }
}

fn json_type_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

// ============================================================================
// Validation
// ============================================================================

/// Validate the shape of an incoming event.
///
/// # Validation Rules
/// - `site_id` must be present and a non-blank string
/// - `event_type` must be present and a non-blank string
///
/// All other fields are passed through untouched.
pub fn validate_event(event: &EventRecord) -> Result<(), ValidationError> {
    require_non_empty_string(event, SITE_ID_FIELD)?;
    require_non_empty_string(event, EVENT_TYPE_FIELD)?;
    Ok(())
}

fn require_non_empty_string(event: &EventRecord, field: &str) -> Result<(), ValidationError> {
    match event.get(field) {
        None => Err(ValidationError::Required {
            field: field.to_string(),
        }),
        Some(Value::String(value)) if !value.trim().is_empty() => Ok(()),
        Some(_) => Err(ValidationError::InvalidFormat {
            field: field.to_string(),
            message: "must be a non-empty string".to_string(),
        }),
    }
}

// ============================================================================
// Error Types
// ============================================================================

/// Error type for event validation failures
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error, Serialize, Deserialize)]
pub enum ValidationError {
    #[error("Missing required field: {field}")]
    Required { field: String },

    #[error("{field} {message}")]
    InvalidFormat { field: String, message: String },
}

impl ValidationError {
    /// Name of the offending field
    pub fn field(&self) -> &str {
        match self {
            Self::Required { field } | Self::InvalidFormat { field, .. } => field,
        }
    }
}

/// Error type for queue line parsing failures
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ParseError {
    #[error("Invalid JSON: {message}")]
    InvalidJson { message: String },

    #[error("Expected a JSON object, got {actual}")]
    NotAnObject { actual: String },
}

// ============================================================================
// Module declarations
// ============================================================================

/// Cross-process file-backed event queue
pub mod queue;

/// Persistence store and aggregate reports
pub mod store;

/// Consumer loop persisting queued events
pub mod worker;

// Re-export key types for convenience
pub use queue::{
    ConsumerQueue, DequeueError, DurableLog, FileLock, PopOutcome, ProducerQueue, QueueConfig,
    QueueError,
};
pub use store::{
    EventStore, PathViews, SiteStats, SqliteEventStore, StatsQuery, StoreConfig, StoreError,
};
pub use worker::{EventWorker, WorkOutcome, WorkerConfig, WorkerStats};

#[cfg(test)]
#[path = "lib_tests.rs"]
mod tests;
