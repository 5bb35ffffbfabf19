//! # Event Store
//!
//! Relational persistence for processed events and the per-site aggregate
//! report served by the reporting endpoint.

use crate::{EventRecord, EVENT_TYPE_FIELD, PATH_FIELD, SITE_ID_FIELD, TIMESTAMP_FIELD, USER_ID_FIELD};
use chrono::NaiveDate;
use rusqlite::{params, Connection};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::path::{Path, PathBuf};
use std::sync::{Mutex, MutexGuard, PoisonError};
use tracing::{debug, info};

/// Default location of the SQLite database, relative to the working directory
pub const DEFAULT_DATABASE_FILE: &str = "analytics.db";

/// Maximum number of entries in [`SiteStats::top_paths`]
pub const TOP_PATHS_LIMIT: usize = 3;

const SCHEMA: &str = "
    CREATE TABLE IF NOT EXISTS events (
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        site_id TEXT NOT NULL,
        event_type TEXT NOT NULL,
        path TEXT,
        user_id TEXT,
        timestamp TEXT
    );
    CREATE INDEX IF NOT EXISTS idx_events_site_id ON events (site_id);
";

// Rows for one site, optionally restricted to timestamps starting with a date.
const SITE_FILTER: &str = "site_id = ?1 AND (?2 IS NULL OR timestamp LIKE ?2)";

// ============================================================================
// Configuration
// ============================================================================

/// Event store configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct StoreConfig {
    /// Path of the SQLite database file
    pub path: PathBuf,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            path: PathBuf::from(DEFAULT_DATABASE_FILE),
        }
    }
}

// ============================================================================
// Report Types
// ============================================================================

/// Parameters of a site report
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StatsQuery {
    pub site_id: String,
    pub date: Option<NaiveDate>,
}

impl StatsQuery {
    pub fn new(site_id: impl Into<String>) -> Self {
        Self {
            site_id: site_id.into(),
            date: None,
        }
    }

    /// Restrict the report to events whose timestamp falls on `date`
    pub fn on_date(mut self, date: NaiveDate) -> Self {
        self.date = Some(date);
        self
    }

    fn date_pattern(&self) -> Option<String> {
        self.date.map(|d| format!("{}%", d.format("%Y-%m-%d")))
    }
}

/// View count for one page path
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PathViews {
    pub path: String,
    pub views: u64,
}

/// Aggregate report for one site
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SiteStats {
    pub site_id: String,
    pub date: Option<NaiveDate>,
    /// Number of stored events of any type
    pub total_views: u64,
    /// Distinct non-empty user identifiers
    pub unique_users: u64,
    /// Most viewed non-empty paths, most views first, ties in order of first
    /// appearance
    pub top_paths: Vec<PathViews>,
}

impl SiteStats {
    /// Report with no matching events
    pub fn empty(query: &StatsQuery) -> Self {
        Self {
            site_id: query.site_id.clone(),
            date: query.date,
            total_views: 0,
            unique_users: 0,
            top_paths: Vec::new(),
        }
    }
}

// ============================================================================
// Store Interface
// ============================================================================

/// Errors raised by the event store
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("Failed to open database {path}: {source}")]
    Open {
        path: String,
        #[source]
        source: rusqlite::Error,
    },

    #[error("Database error: {0}")]
    Query(#[from] rusqlite::Error),

    #[error("Event is missing required field '{field}'")]
    MissingField { field: String },
}

/// Persistence for processed events.
///
/// Implementations are synchronous; async callers run them on a blocking
/// thread.
pub trait EventStore: Send + Sync {
    /// Persist one event, returning its row id
    fn insert(&self, event: &EventRecord) -> Result<i64, StoreError>;

    /// Aggregate report for one site
    fn site_stats(&self, query: &StatsQuery) -> Result<SiteStats, StoreError>;

    /// Total number of stored events
    fn count(&self) -> Result<u64, StoreError>;
}

// ============================================================================
// SQLite Implementation
// ============================================================================

/// SQLite-backed [`EventStore`].
///
/// The connection is shared behind a mutex; statements are short, so
/// callers serialize on it rather than pooling connections.
#[derive(Debug)]
pub struct SqliteEventStore {
    conn: Mutex<Connection>,
    location: String,
}

impl SqliteEventStore {
    /// Open (or create) the database at `path` and ensure the schema exists.
    pub fn open(path: impl AsRef<Path>) -> Result<Self, StoreError> {
        let path = path.as_ref();
        let location = path.display().to_string();

        let conn = Connection::open(path).map_err(|source| StoreError::Open {
            path: location.clone(),
            source,
        })?;

        Self::initialize(conn, location)
    }

    pub fn from_config(config: &StoreConfig) -> Result<Self, StoreError> {
        Self::open(&config.path)
    }

    /// Open a private in-memory database
    pub fn open_in_memory() -> Result<Self, StoreError> {
        let location = ":memory:".to_string();
        let conn = Connection::open_in_memory().map_err(|source| StoreError::Open {
            path: location.clone(),
            source,
        })?;

        Self::initialize(conn, location)
    }

    /// Where the database lives, for logging
    pub fn location(&self) -> &str {
        &self.location
    }

    fn initialize(conn: Connection, location: String) -> Result<Self, StoreError> {
        conn.execute_batch(SCHEMA)
            .map_err(|source| StoreError::Open {
                path: location.clone(),
                source,
            })?;

        info!(database = %location, "Event store initialized");

        Ok(Self {
            conn: Mutex::new(conn),
            location,
        })
    }

    fn conn(&self) -> MutexGuard<'_, Connection> {
        self.conn.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl EventStore for SqliteEventStore {
    fn insert(&self, event: &EventRecord) -> Result<i64, StoreError> {
        let site_id = required_column(event, SITE_ID_FIELD)?;
        let event_type = required_column(event, EVENT_TYPE_FIELD)?;

        let conn = self.conn();
        conn.execute(
            "INSERT INTO events (site_id, event_type, path, user_id, timestamp)
             VALUES (?1, ?2, ?3, ?4, ?5)",
            params![
                site_id,
                event_type,
                column_text(event.get(PATH_FIELD)),
                column_text(event.get(USER_ID_FIELD)),
                column_text(event.get(TIMESTAMP_FIELD)),
            ],
        )?;

        Ok(conn.last_insert_rowid())
    }

    fn site_stats(&self, query: &StatsQuery) -> Result<SiteStats, StoreError> {
        let pattern = query.date_pattern();
        let conn = self.conn();

        let (total_views, unique_users): (i64, i64) = conn.query_row(
                &format!(
                    "SELECT COUNT(*),
                            COUNT(DISTINCT CASE WHEN user_id IS NOT NULL AND user_id != ''
                                                THEN user_id END)
                     FROM events
                     WHERE {SITE_FILTER}"
                ),
                params![query.site_id, pattern],
                |row| Ok((row.get(0)?, row.get(1)?)),
            )?;

        if total_views == 0 {
            debug!(site_id = %query.site_id, "No events for site");
            return Ok(SiteStats::empty(query));
        }

        let mut stmt = conn.prepare(&format!(
            "SELECT path, COUNT(*) AS views
             FROM events
             WHERE {SITE_FILTER} AND path IS NOT NULL AND path != ''
             GROUP BY path
             ORDER BY views DESC, MIN(id) ASC
             LIMIT ?3"
        ))?;

        let top_paths = stmt
            .query_map(
                params![query.site_id, pattern, TOP_PATHS_LIMIT as i64],
                |row| {
                    Ok(PathViews {
                        path: row.get(0)?,
                        views: row.get::<_, i64>(1)?.max(0) as u64,
                    })
                },
            )?
            .collect::<Result<Vec<_>, _>>()?;

        Ok(SiteStats {
            site_id: query.site_id.clone(),
            date: query.date,
            total_views: total_views.max(0) as u64,
            unique_users: unique_users.max(0) as u64,
            top_paths,
        })
    }

    fn count(&self) -> Result<u64, StoreError> {
        let count: i64 = self
            .conn()
            .query_row("SELECT COUNT(*) FROM events", [], |row| row.get(0))?;
        Ok(count.max(0) as u64)
    }
}

/// Text for a nullable column: strings as-is, other scalars in JSON form,
/// null and missing as NULL.
fn column_text(value: Option<&Value>) -> Option<String> {
    match value? {
        Value::Null => None,
        Value::String(s) => Some(s.clone()),
        other => Some(other.to_string()),
    }
}

fn required_column(event: &EventRecord, field: &str) -> Result<String, StoreError> {
    column_text(event.get(field)).ok_or_else(|| StoreError::MissingField {
        field: field.to_string(),
    })
}

#[cfg(test)]
#[path = "store_tests.rs"]
mod tests;
