//! # Pulse CLI
//!
//! Command-line interface for the Pulse analytics pipeline.
//!
//! This module provides CLI commands for:
//! - Running the worker that moves queued events into the store
//! - Inspecting the on-disk queue
//! - Reading site reports straight from the local store
//! - Showing the resolved configuration

use clap::{CommandFactory, Parser, Subcommand};
use pulse_api::{init_logging, load_config, ServiceConfig};
use pulse_core::{
    ConsumerQueue, EventStore, EventWorker, QueueError, SiteStats, SqliteEventStore, StatsQuery,
    StoreError, WorkOutcome,
};
use std::io::Write;
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tracing::info;

// ============================================================================
// CLI Structure
// ============================================================================

/// Pulse CLI - website analytics event pipeline
#[derive(Parser)]
#[command(name = "pulse")]
#[command(version = env!("CARGO_PKG_VERSION"))]
#[command(about = "Website analytics event pipeline")]
#[command(
    long_about = "Pulse queues analytics events on disk and persists them into a reporting store"
)]
pub struct Cli {
    /// Configuration file path
    #[arg(short, long, env = "PULSE_CONFIG_FILE")]
    pub config: Option<PathBuf>,

    /// Logging level, overriding the configured one
    #[arg(short, long)]
    pub log_level: Option<String>,

    /// Enable JSON logging
    #[arg(long)]
    pub json_logs: bool,

    /// Subcommand to execute
    #[command(subcommand)]
    pub command: Commands,
}

/// Available CLI commands
#[derive(Subcommand)]
pub enum Commands {
    /// Run the worker that persists queued events
    Worker {
        /// Process at most one event and exit
        #[arg(long)]
        once: bool,
    },

    /// Queue inspection commands
    Queue {
        #[command(subcommand)]
        action: QueueCommands,
    },

    /// Show the report for one site from the local store
    Stats {
        /// Site identifier
        #[arg(short, long)]
        site_id: String,

        /// Restrict to one day (YYYY-MM-DD)
        #[arg(short, long)]
        date: Option<String>,

        /// Output format
        #[arg(short, long, default_value = "text")]
        format: OutputFormat,
    },

    /// Show the resolved configuration
    Config {
        /// Output format for configuration
        #[arg(short = 'f', long, default_value = "yaml")]
        format: ConfigFormat,
    },

    /// Generate shell completions
    Completions {
        /// Shell to generate completions for
        #[arg(value_enum)]
        shell: clap_complete::Shell,
    },
}

/// Queue inspection subcommands
#[derive(Subcommand)]
pub enum QueueCommands {
    /// Number of events currently in the queue file
    Depth {
        /// Output format
        #[arg(short, long, default_value = "text")]
        format: OutputFormat,
    },
}

/// Output format options
#[derive(Clone, Copy, Debug, PartialEq, Eq, clap::ValueEnum, serde::Serialize, serde::Deserialize)]
pub enum OutputFormat {
    /// Human-readable text
    Text,
    /// JSON output
    Json,
}

/// Configuration format options
#[derive(Clone, Copy, Debug, PartialEq, Eq, clap::ValueEnum)]
pub enum ConfigFormat {
    /// YAML format
    Yaml,
    /// JSON format
    Json,
}

// ============================================================================
// CLI Error Types
// ============================================================================

/// CLI errors
#[derive(Debug, thiserror::Error)]
pub enum CliError {
    #[error("Configuration error: {0}")]
    Configuration(#[from] pulse_api::ConfigError),

    #[error("Queue error: {0}")]
    Queue(#[from] QueueError),

    #[error("Store error: {0}")]
    Store(#[from] StoreError),

    #[error("Invalid argument: {arg} - {message}")]
    InvalidArgument { arg: String, message: String },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Command failed: {message}")]
    CommandFailed { message: String },
}

impl CliError {
    /// Process exit code for this failure
    pub fn exit_code(&self) -> i32 {
        match self {
            Self::Configuration(_) => 1,
            Self::Queue(_) => 2,
            Self::Store(_) => 3,
            Self::InvalidArgument { .. } => 4,
            Self::Io(_) => 5,
            Self::CommandFailed { .. } => 6,
        }
    }
}

// ============================================================================
// Main Entry Point
// ============================================================================

/// Parse the command line and run the selected command
pub async fn run_cli() -> Result<(), CliError> {
    run(Cli::parse()).await
}

/// Run an already parsed command line
pub async fn run(cli: Cli) -> Result<(), CliError> {
    if let Commands::Completions { shell } = cli.command {
        return execute_completions_command(shell, &mut std::io::stdout());
    }

    let config = load_configuration(&cli)?;

    if let Err(e) = init_logging(&config.logging) {
        eprintln!("Failed to initialize logging: {e}");
    }

    let mut stdout = std::io::stdout();

    match cli.command {
        Commands::Worker { once } => execute_worker_command(&config, once, &mut stdout).await,
        Commands::Queue {
            action: QueueCommands::Depth { format },
        } => execute_queue_depth_command(&config, format, &mut stdout),
        Commands::Stats {
            site_id,
            date,
            format,
        } => execute_stats_command(&config, site_id, date, format, &mut stdout).await,
        Commands::Config { format } => execute_config_command(&config, format, &mut stdout),
        Commands::Completions { .. } => Ok(()),
    }
}

/// Load configuration and apply command-line logging overrides
pub fn load_configuration(cli: &Cli) -> Result<ServiceConfig, CliError> {
    let mut config = load_config(cli.config.as_deref())?;

    if let Some(level) = &cli.log_level {
        config.logging.level = level.clone();
    }
    if cli.json_logs {
        config.logging.json_format = true;
    }

    config.validate()?;
    Ok(config)
}

// ============================================================================
// Command Implementations
// ============================================================================

async fn execute_worker_command(
    config: &ServiceConfig,
    once: bool,
    out: &mut impl Write,
) -> Result<(), CliError> {
    let store = SqliteEventStore::from_config(&config.store)?;
    let queue = ConsumerQueue::from_config(&config.queue);
    let worker = Arc::new(EventWorker::new(
        queue,
        Arc::new(store),
        config.worker.clone(),
    ));

    info!(
        queue = %config.queue.path.display(),
        database = %config.store.path.display(),
        once = once,
        "Starting Pulse worker"
    );

    if once {
        let outcome = tokio::task::spawn_blocking(move || worker.run_once())
            .await
            .map_err(|e| CliError::CommandFailed {
                message: format!("Worker task failed: {}", e),
            })??;

        match outcome {
            WorkOutcome::Processed { id } => writeln!(out, "Stored event {}", id)?,
            WorkOutcome::Dropped => writeln!(out, "Dropped one event")?,
            WorkOutcome::Idle => writeln!(out, "Queue is empty")?,
        }
        return Ok(());
    }

    let shutdown = Arc::new(AtomicBool::new(false));

    let signal_task = {
        let shutdown = Arc::clone(&shutdown);
        tokio::spawn(async move {
            pulse_api::shutdown_signal().await;
            info!("Stopping worker after the current event");
            shutdown.store(true, Ordering::SeqCst);
        })
    };

    let stats = worker.stats();
    let run = tokio::task::spawn_blocking(move || worker.run(&shutdown)).await;
    signal_task.abort();

    run.map_err(|e| CliError::CommandFailed {
        message: format!("Worker task failed: {}", e),
    })?;

    writeln!(
        out,
        "Processed {} events, dropped {}",
        stats.processed(),
        stats.dropped()
    )?;
    Ok(())
}

fn execute_queue_depth_command(
    config: &ServiceConfig,
    format: OutputFormat,
    out: &mut impl Write,
) -> Result<(), CliError> {
    let depth = ConsumerQueue::from_config(&config.queue).approximate_depth()?;

    match format {
        OutputFormat::Text => writeln!(out, "{}: {} events", config.queue.path.display(), depth)?,
        OutputFormat::Json => {
            let body = serde_json::json!({
                "path": config.queue.path.display().to_string(),
                "depth": depth,
            });
            writeln!(out, "{}", body)?;
        }
    }
    Ok(())
}

async fn execute_stats_command(
    config: &ServiceConfig,
    site_id: String,
    date: Option<String>,
    format: OutputFormat,
    out: &mut impl Write,
) -> Result<(), CliError> {
    let query = build_stats_query(site_id, date)?;

    let store_config = config.store.clone();
    let stats = tokio::task::spawn_blocking(move || {
        let store = SqliteEventStore::from_config(&store_config)?;
        store.site_stats(&query)
    })
    .await
    .map_err(|e| CliError::CommandFailed {
        message: format!("Stats task failed: {}", e),
    })??;

    write_stats(&stats, format, out)
}

/// Validate `stats` arguments
pub fn build_stats_query(site_id: String, date: Option<String>) -> Result<StatsQuery, CliError> {
    if site_id.trim().is_empty() {
        return Err(CliError::InvalidArgument {
            arg: "site-id".to_string(),
            message: "must not be empty".to_string(),
        });
    }

    let mut query = StatsQuery::new(site_id);
    if let Some(date) = date {
        let parsed = chrono::NaiveDate::parse_from_str(&date, "%Y-%m-%d").map_err(|_| {
            CliError::InvalidArgument {
                arg: "date".to_string(),
                message: format!("'{}' is not a YYYY-MM-DD date", date),
            }
        })?;
        query = query.on_date(parsed);
    }
    Ok(query)
}

fn write_stats(stats: &SiteStats, format: OutputFormat, out: &mut impl Write) -> Result<(), CliError> {
    match format {
        OutputFormat::Json => {
            let body = serde_json::to_string_pretty(stats).map_err(|e| CliError::CommandFailed {
                message: format!("Failed to encode report: {}", e),
            })?;
            writeln!(out, "{}", body)?;
        }
        OutputFormat::Text => {
            writeln!(out, "Site:         {}", stats.site_id)?;
            match stats.date {
                Some(date) => writeln!(out, "Date:         {}", date)?,
                None => writeln!(out, "Date:         all")?,
            }
            writeln!(out, "Total views:  {}", stats.total_views)?;
            writeln!(out, "Unique users: {}", stats.unique_users)?;
            writeln!(out, "Top paths:")?;
            if stats.top_paths.is_empty() {
                writeln!(out, "  (none)")?;
            }
            for entry in &stats.top_paths {
                writeln!(out, "  {:>6}  {}", entry.views, entry.path)?;
            }
        }
    }
    Ok(())
}

fn execute_config_command(
    config: &ServiceConfig,
    format: ConfigFormat,
    out: &mut impl Write,
) -> Result<(), CliError> {
    let rendered = match format {
        ConfigFormat::Yaml => serde_yaml::to_string(config).map_err(|e| e.to_string()),
        ConfigFormat::Json => serde_json::to_string_pretty(config).map_err(|e| e.to_string()),
    }
    .map_err(|message| CliError::CommandFailed { message })?;

    writeln!(out, "{}", rendered.trim_end())?;
    Ok(())
}

fn execute_completions_command(
    shell: clap_complete::Shell,
    out: &mut impl Write,
) -> Result<(), CliError> {
    let mut command = Cli::command();
    let name = command.get_name().to_string();
    clap_complete::generate(shell, &mut command, name, out);
    Ok(())
}

#[cfg(test)]
#[path = "lib_tests.rs"]
mod tests;
