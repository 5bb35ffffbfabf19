//! # Pulse Service
//!
//! Binary entry point for the Pulse ingestion and reporting HTTP service.
//!
//! This executable:
//! - Loads configuration from files and environment
//! - Initializes logging
//! - Opens the producer side of the event queue and the event store
//! - Starts the HTTP server from pulse-api
//!
//! Queued events are persisted by a separately running `pulse worker`.

use pulse_api::{init_logging, load_config, start_server, LoggingConfig, ServiceError};
use pulse_core::{DurableLog, ProducerQueue, SqliteEventStore};
use std::sync::Arc;
use tracing::{error, info};

#[tokio::main]
async fn main() {
    // -------------------------------------------------------------------------
    // Load configuration
    //
    // Sources (applied in order, later sources override earlier ones):
    //  1. /etc/pulse/pulse.yaml   system-wide defaults
    //  2. ./config/pulse.yaml     deployment-local override
    //  3. PULSE_CONFIG_FILE       operator-specified file
    //  4. PULSE__* variables      e.g. PULSE__SERVER__PORT=9090
    // -------------------------------------------------------------------------
    let config = match load_config(None) {
        Ok(config) => config,
        Err(e) => {
            let _ = init_logging(&LoggingConfig::default());
            error!(error = %e, "Service configuration is invalid; aborting");
            std::process::exit(ServiceError::Configuration(e).exit_code());
        }
    };

    if let Err(e) = init_logging(&config.logging) {
        eprintln!("Failed to initialize logging: {e}");
    }

    info!("Starting Pulse Service");

    if let Err(e) = run(config).await {
        error!(error = %e, "Service failed");
        std::process::exit(e.exit_code());
    }
}

async fn run(config: pulse_api::ServiceConfig) -> Result<(), ServiceError> {
    let queue = ProducerQueue::open(DurableLog::from_config(&config.queue))?;
    info!(
        path = %config.queue.path.display(),
        buffered = queue.size(),
        "Event queue ready"
    );

    let store = SqliteEventStore::from_config(&config.store)?;
    info!(database = %store.location(), "Event store ready");

    info!(
        host = %config.server.host,
        port = config.server.port,
        "Starting HTTP server"
    );

    start_server(config, Arc::new(queue), Arc::new(store)).await
}
