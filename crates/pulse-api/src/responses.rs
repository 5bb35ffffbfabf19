//! Response bodies and query parameters for the API.

use serde::{Deserialize, Serialize};

/// Service name reported by the health endpoint
pub const SERVICE_NAME: &str = "ingestion_api";

/// Body returned when an event has been queued
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EventAccepted {
    pub message: String,
}

impl EventAccepted {
    pub fn new() -> Self {
        Self {
            message: "Event received".to_string(),
        }
    }
}

impl Default for EventAccepted {
    fn default() -> Self {
        Self::new()
    }
}

/// Health check response
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthResponse {
    pub status: String,
    pub service: String,
    /// Events buffered by this process since it started
    pub queue_size: usize,
    pub version: String,
    pub timestamp: String,
}

/// Query parameters of `GET /stats`
#[derive(Debug, Clone, Default, Deserialize)]
pub struct StatsParams {
    pub site_id: Option<String>,
    pub date: Option<String>,
}
