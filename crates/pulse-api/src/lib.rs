//! # Pulse HTTP Service
//!
//! HTTP server for ingesting analytics events and reporting per-site
//! aggregates.
//!
//! This service provides:
//! - `POST /event`: validate an event and append it to the on-disk queue
//! - `GET /stats`: aggregate report for one site, optionally for one day
//! - `GET /health`: liveness and in-process queue buffer size
//! - `GET /metrics`: Prometheus exposition
//!
//! Events are only queued here. A separate worker process (`pulse worker`)
//! moves them into the store that `/stats` reads from.

pub mod config;
pub mod errors;
pub mod logging;
pub mod metrics;
pub mod responses;

pub use config::{load_config, load_config_from, LoggingConfig, ServerConfig, ServiceConfig};
pub use errors::{ApiError, ConfigError, ServiceError};
pub use logging::init_logging;
pub use metrics::ServiceMetrics;
pub use responses::{EventAccepted, HealthResponse, StatsParams, SERVICE_NAME};

use axum::{
    extract::{DefaultBodyLimit, MatchedPath, Query, State},
    http::{header::CONTENT_TYPE, HeaderMap},
    middleware,
    response::{IntoResponse, Json, Response},
    routing::{get, post},
    Router,
};
use bytes::Bytes;
use chrono::NaiveDate;
use pulse_core::{validate_event, EventRecord, EventStore, ProducerQueue, SiteStats, StatsQuery};
use std::future::IntoFuture;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tower::ServiceBuilder;
use tower_http::{cors::CorsLayer, trace::TraceLayer};
use tracing::{error, info, instrument, warn};

// ============================================================================
// Application State
// ============================================================================

/// Shared application state
#[derive(Clone)]
pub struct AppState {
    /// Configuration for the service
    pub config: ServiceConfig,

    /// Producer side of the on-disk event queue
    pub queue: Arc<ProducerQueue>,

    /// Store read by the reporting endpoint
    pub store: Arc<dyn EventStore>,

    /// Metrics collector for observability
    pub metrics: Arc<ServiceMetrics>,
}

impl AppState {
    /// Create new application state
    pub fn new(
        config: ServiceConfig,
        queue: Arc<ProducerQueue>,
        store: Arc<dyn EventStore>,
        metrics: Arc<ServiceMetrics>,
    ) -> Self {
        Self {
            config,
            queue,
            store,
            metrics,
        }
    }
}

// ============================================================================
// HTTP Server
// ============================================================================

/// Create HTTP router with all endpoints
pub fn create_router(state: AppState) -> Router {
    let ingest_routes = Router::new().route("/event", post(handle_event));

    let report_routes = Router::new().route("/stats", get(handle_stats));

    let health_routes = Router::new().route("/health", get(handle_health_check));

    let observability_routes = Router::new().route("/metrics", get(metrics_endpoint));

    let mut router = Router::new()
        .merge(ingest_routes)
        .merge(report_routes)
        .merge(health_routes)
        .merge(observability_routes)
        .layer(
            ServiceBuilder::new()
                .layer(TraceLayer::new_for_http())
                .layer(middleware::from_fn(request_logging_middleware))
                .layer(middleware::from_fn_with_state(
                    Arc::clone(&state.metrics),
                    metrics_middleware,
                ))
                .layer(DefaultBodyLimit::max(state.config.server.max_body_size))
                .into_inner(),
        );

    if state.config.server.enable_cors {
        router = router.layer(CorsLayer::permissive());
    }

    router.with_state(state)
}

/// Start HTTP server and run until Ctrl+C or SIGTERM
pub async fn start_server(
    config: ServiceConfig,
    queue: Arc<ProducerQueue>,
    store: Arc<dyn EventStore>,
) -> Result<(), ServiceError> {
    let metrics = ServiceMetrics::new().map_err(|e| {
        ServiceError::Configuration(ConfigError::Invalid {
            message: format!("Failed to initialize metrics: {}", e),
        })
    })?;
    metrics.set_queue_buffer_size(queue.size());

    let address = format!("{}:{}", config.server.host, config.server.port);
    let shutdown_timeout = Duration::from_secs(config.server.shutdown_timeout_seconds);

    let state = AppState::new(config.clone(), queue, store, metrics);
    let app = create_router(state);

    let listener =
        tokio::net::TcpListener::bind((config.server.host.as_str(), config.server.port))
            .await
            .map_err(|e| ServiceError::BindFailed {
                address: address.clone(),
                message: e.to_string(),
            })?;

    info!(address = %address, "Starting HTTP server");

    // axum stops accepting connections when the signal fires and then waits
    // for in-flight requests; the deadline below bounds that wait.
    let (fired_tx, mut fired_rx) = tokio::sync::watch::channel(false);

    let server = axum::serve(listener, app)
        .with_graceful_shutdown(async move {
            shutdown_signal().await;
            info!(
                timeout_seconds = shutdown_timeout.as_secs(),
                "Initiating graceful shutdown"
            );
            let _ = fired_tx.send(true);
        })
        .into_future();

    let deadline = async move {
        if fired_rx.wait_for(|fired| *fired).await.is_ok() {
            tokio::time::sleep(shutdown_timeout).await;
        } else {
            std::future::pending::<()>().await;
        }
    };

    tokio::select! {
        result = server => {
            result.map_err(|e| ServiceError::ServerFailed {
                message: e.to_string(),
            })?;
        }
        _ = deadline => {
            warn!(
                timeout_seconds = shutdown_timeout.as_secs(),
                "Graceful shutdown timed out, dropping open connections"
            );
        }
    }

    info!("HTTP server shutdown complete");
    Ok(())
}

/// Resolve when the process receives Ctrl+C or, on Unix, SIGTERM
pub async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            error!(error = %e, "Failed to install Ctrl+C signal handler");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                error!(error = %e, "Failed to install SIGTERM signal handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => info!("Received SIGINT (Ctrl+C)"),
        _ = terminate => info!("Received SIGTERM"),
    }
}

// ============================================================================
// Ingestion Handlers
// ============================================================================

/// Accept one analytics event.
///
/// The event is validated, stamped with the current time when it carries no
/// `timestamp`, and appended to the queue. A 200 means the event is on disk;
/// it is stored later by the worker.
#[instrument(skip(state, headers, body))]
pub async fn handle_event(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<Json<EventAccepted>, ApiError> {
    let mut event = parse_event(&headers, &body).inspect_err(|e| {
        state.metrics.events_rejected_total.inc();
        warn!(error = %e, "Rejected event");
    })?;

    event.ensure_timestamp();

    let site_id = event.site_id().unwrap_or_default().to_string();
    let event_type = event.event_type().unwrap_or_default().to_string();

    let queue = Arc::clone(&state.queue);
    let (result, buffered) = tokio::task::spawn_blocking(move || {
        let result = queue.put(event);
        (result, queue.size())
    })
    .await
    .map_err(|e| ApiError::Internal {
        message: format!("Enqueue task failed: {}", e),
    })?;

    state.metrics.set_queue_buffer_size(buffered);

    match result {
        Ok(()) => {
            state.metrics.events_received_total.inc();
            info!(site_id = %site_id, event_type = %event_type, "Event queued");
            Ok(Json(EventAccepted::new()))
        }
        Err(e) => {
            state.metrics.queue_write_failures_total.inc();
            Err(ApiError::QueueUnavailable(e))
        }
    }
}

/// Parse and validate a request body as an event
pub fn parse_event(headers: &HeaderMap, body: &[u8]) -> Result<EventRecord, ApiError> {
    if !is_json_content_type(headers) {
        return Err(ApiError::UnsupportedContentType);
    }

    let event = EventRecord::from_bytes(body)?;
    validate_event(&event)?;
    Ok(event)
}

/// `application/json` or an `application/*+json` type, parameters ignored
fn is_json_content_type(headers: &HeaderMap) -> bool {
    let Some(content_type) = headers.get(CONTENT_TYPE).and_then(|v| v.to_str().ok()) else {
        return false;
    };

    let mime = content_type
        .split(';')
        .next()
        .unwrap_or_default()
        .trim()
        .to_ascii_lowercase();

    mime == "application/json" || (mime.starts_with("application/") && mime.ends_with("+json"))
}

// ============================================================================
// Reporting Handlers
// ============================================================================

/// Aggregate report for one site
#[instrument(skip(state))]
pub async fn handle_stats(
    State(state): State<AppState>,
    Query(params): Query<StatsParams>,
) -> Result<Json<SiteStats>, ApiError> {
    let query = stats_query(params)?;
    state.metrics.stats_requests_total.inc();

    let store = Arc::clone(&state.store);
    let stats = tokio::task::spawn_blocking(move || store.site_stats(&query))
        .await
        .map_err(|e| ApiError::Internal {
            message: format!("Stats task failed: {}", e),
        })??;

    Ok(Json(stats))
}

/// Build a [`StatsQuery`] from request parameters.
///
/// An empty `site_id` counts as missing and an empty `date` as absent.
pub fn stats_query(params: StatsParams) -> Result<StatsQuery, ApiError> {
    let site_id = params
        .site_id
        .filter(|s| !s.is_empty())
        .ok_or_else(|| ApiError::MissingParameter {
            name: "site_id".to_string(),
        })?;

    let mut query = StatsQuery::new(site_id);

    if let Some(date) = params.date.filter(|d| !d.is_empty()) {
        let parsed = NaiveDate::parse_from_str(&date, "%Y-%m-%d")
            .map_err(|_| ApiError::InvalidDate { value: date })?;
        query = query.on_date(parsed);
    }

    Ok(query)
}

// ============================================================================
// Health and Observability Handlers
// ============================================================================

/// Basic health check endpoint
#[instrument(skip(state))]
async fn handle_health_check(State(state): State<AppState>) -> Json<HealthResponse> {
    let queue_size = state.queue.size();
    state.metrics.set_queue_buffer_size(queue_size);

    Json(HealthResponse {
        status: "healthy".to_string(),
        service: SERVICE_NAME.to_string(),
        queue_size,
        version: env!("CARGO_PKG_VERSION").to_string(),
        timestamp: chrono::Utc::now().to_rfc3339(),
    })
}

/// Prometheus metrics endpoint
#[instrument(skip_all)]
async fn metrics_endpoint(State(state): State<AppState>) -> Result<Response, ApiError> {
    let body = state.metrics.render().map_err(|e| ApiError::Internal {
        message: format!("Failed to encode metrics: {}", e),
    })?;

    Ok(([(CONTENT_TYPE, "text/plain; version=0.0.4")], body).into_response())
}

// ============================================================================
// Middleware
// ============================================================================

/// Request logging middleware with correlation ID tracking
///
/// Reuses the caller's `x-correlation-id` or generates one, records it on
/// the span, and echoes it in the response headers.
#[instrument(skip(request, next), fields(
    method = %request.method(),
    uri = %request.uri(),
    correlation_id
))]
async fn request_logging_middleware(
    mut request: axum::extract::Request,
    next: axum::middleware::Next,
) -> Response {
    let method = request.method().clone();
    let uri = request.uri().clone();
    let start = Instant::now();

    let correlation_id = request
        .headers()
        .get("x-correlation-id")
        .and_then(|v| v.to_str().ok())
        .filter(|s| !s.is_empty())
        .map(|s| s.to_string())
        .unwrap_or_else(|| uuid::Uuid::new_v4().to_string());

    tracing::Span::current().record("correlation_id", correlation_id.as_str());

    request.extensions_mut().insert(correlation_id.clone());

    info!(
        correlation_id = %correlation_id,
        method = %method,
        uri = %uri,
        "Request started"
    );

    let mut response = next.run(request).await;
    let duration = start.elapsed();

    if let Ok(header_value) = correlation_id.parse() {
        response
            .headers_mut()
            .insert("x-correlation-id", header_value);
    }

    let status = response.status();

    if status.is_server_error() {
        error!(
            correlation_id = %correlation_id,
            method = %method,
            uri = %uri,
            status = %status,
            duration_ms = %duration.as_millis(),
            "Request completed with server error"
        );
    } else if status.is_client_error() {
        warn!(
            correlation_id = %correlation_id,
            method = %method,
            uri = %uri,
            status = %status,
            duration_ms = %duration.as_millis(),
            "Request completed with client error"
        );
    } else {
        info!(
            correlation_id = %correlation_id,
            method = %method,
            uri = %uri,
            status = %status,
            duration_ms = %duration.as_millis(),
            "Request completed successfully"
        );
    }

    response
}

/// Record request count and latency, labelled by route template
async fn metrics_middleware(
    State(metrics): State<Arc<ServiceMetrics>>,
    request: axum::extract::Request,
    next: axum::middleware::Next,
) -> Response {
    let start = Instant::now();
    let method = request.method().to_string();

    // Route templates keep label cardinality bounded
    let path = request
        .extensions()
        .get::<MatchedPath>()
        .map(|p| p.as_str().to_string())
        .unwrap_or_else(|| "unmatched".to_string());

    let response = next.run(request).await;

    metrics.record_http_request(&method, &path, response.status().as_u16(), start.elapsed());

    response
}

#[cfg(test)]
#[path = "lib_tests.rs"]
mod tests;
