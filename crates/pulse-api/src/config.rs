//! Configuration types for the HTTP service and worker
//!
//! Every section carries serde defaults, so a missing file or an entirely
//! unconfigured environment yields a usable configuration.

use crate::errors::ConfigError;
use pulse_core::{QueueConfig, StoreConfig, WorkerConfig};
use serde::{Deserialize, Serialize};
use std::path::Path;
use tracing::info;

/// Environment variable naming an explicit configuration file
pub const CONFIG_FILE_ENV: &str = "PULSE_CONFIG_FILE";

/// Prefix of configuration overrides in the environment, e.g.
/// `PULSE__SERVER__PORT=9090`
pub const ENV_PREFIX: &str = "PULSE";

const SYSTEM_CONFIG_FILE: &str = "/etc/pulse/pulse";
const LOCAL_CONFIG_FILE: &str = "config/pulse";

const LOG_LEVELS: [&str; 5] = ["trace", "debug", "info", "warn", "error"];

/// Service configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct ServiceConfig {
    /// HTTP server settings
    pub server: ServerConfig,

    /// On-disk queue shared by the service and the worker
    pub queue: QueueConfig,

    /// Event database
    pub store: StoreConfig,

    /// Worker loop settings
    pub worker: WorkerConfig,

    /// Logging configuration
    pub logging: LoggingConfig,
}

impl ServiceConfig {
    /// Reject configurations the service cannot run with.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.server.host.trim().is_empty() {
            return Err(invalid("server.host must not be empty"));
        }
        if self.server.port == 0 {
            return Err(invalid("server.port must be non-zero"));
        }
        if self.server.max_body_size == 0 {
            return Err(invalid("server.max_body_size must be non-zero"));
        }
        if self.queue.path.as_os_str().is_empty() {
            return Err(invalid("queue.path must not be empty"));
        }
        if self.queue.poll_interval_ms == 0 {
            return Err(invalid("queue.poll_interval_ms must be non-zero"));
        }
        if self.store.path.as_os_str().is_empty() {
            return Err(invalid("store.path must not be empty"));
        }
        if !LOG_LEVELS.contains(&self.logging.level.to_ascii_lowercase().as_str()) {
            return Err(invalid(format!(
                "logging.level '{}' is not one of {}",
                self.logging.level,
                LOG_LEVELS.join(", ")
            )));
        }
        Ok(())
    }
}

fn invalid(message: impl Into<String>) -> ConfigError {
    ConfigError::Invalid {
        message: message.into(),
    }
}

/// HTTP server configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    /// Host to bind to
    pub host: String,

    /// Port to listen on
    pub port: u16,

    /// Graceful shutdown timeout in seconds
    pub shutdown_timeout_seconds: u64,

    /// Maximum request size in bytes
    pub max_body_size: usize,

    /// Enable CORS
    pub enable_cors: bool,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 5000,
            shutdown_timeout_seconds: 30,
            max_body_size: 1024 * 1024, // 1MB
            enable_cors: true,
        }
    }
}

/// Logging configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Logging level
    pub level: String,

    /// Enable JSON structured logging
    pub json_format: bool,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            json_format: false,
        }
    }
}

// ============================================================================
// Loading
// ============================================================================

/// Load and validate the configuration.
///
/// Sources, later ones overriding earlier ones:
///  1. `/etc/pulse/pulse.yaml` (optional)
///  2. `./config/pulse.yaml` (optional)
///  3. `explicit`, or the file named by `PULSE_CONFIG_FILE` (required when given)
///  4. environment variables prefixed `PULSE__`, `__` separating sections
pub fn load_config(explicit: Option<&Path>) -> Result<ServiceConfig, ConfigError> {
    let from_env = std::env::var(CONFIG_FILE_ENV)
        .ok()
        .filter(|path| !path.is_empty());

    let explicit = explicit
        .map(|p| p.display().to_string())
        .or(from_env);

    load_config_from(
        &[SYSTEM_CONFIG_FILE, LOCAL_CONFIG_FILE],
        explicit.as_deref(),
        ENV_PREFIX,
    )
}

/// [`load_config`] with the file locations and environment prefix supplied
/// by the caller.
pub fn load_config_from(
    optional_files: &[&str],
    explicit: Option<&str>,
    env_prefix: &str,
) -> Result<ServiceConfig, ConfigError> {
    let mut builder = config::Config::builder();

    for name in optional_files {
        builder = builder.add_source(
            config::File::with_name(name)
                .required(false)
                .format(config::FileFormat::Yaml),
        );
    }

    if let Some(path) = explicit {
        info!(path = %path, "Loading configuration from explicit path");
        builder = builder.add_source(
            config::File::with_name(path)
                .required(true)
                .format(config::FileFormat::Yaml),
        );
    }

    let service_config: ServiceConfig = builder
        .add_source(
            config::Environment::with_prefix(env_prefix)
                .separator("__")
                .try_parsing(true),
        )
        .build()?
        .try_deserialize()?;

    service_config.validate()?;
    Ok(service_config)
}

#[cfg(test)]
#[path = "config_tests.rs"]
mod tests;
