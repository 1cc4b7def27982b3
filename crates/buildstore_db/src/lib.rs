//! Build record store for buildstore
//!
//! This crate owns the `build_records` table. Every write goes through
//! [`BuildStoreDb::upsert`], which merges field by field so that start events,
//! completion events and artifact downloads can arrive in any order and still
//! converge on one row per build.
//!
//! # Usage
//!
//! ```rust,ignore
//! use buildstore_db::{BuildKey, BuildStoreDb, PartialBuild};
//!
//! let db = BuildStoreDb::open("~/.buildstore/buildstore.sqlite3").await?;
//!
//! let key = BuildKey::new("prod", "nightly", 42);
//! db.upsert(&key, &PartialBuild::new().with_status("SUCCESS")).await?;
//!
//! let latest = db.get_latest().await?;
//! ```

mod error;
mod records;
mod schema;
mod types;
pub mod xml;

pub use error::{Result, StoreError};
pub use types::*;

use sqlx::sqlite::{SqlitePool, SqlitePoolOptions};
use std::path::Path;
use tracing::info;

/// Connection settings for the record store.
#[derive(Debug, Clone)]
pub struct DbConfig {
    /// Database connection URL
    pub url: String,
    /// Maximum connections in the pool
    pub max_connections: u32,
}

impl DbConfig {
    /// SQLite database at `path`, created if missing.
    pub fn sqlite(path: impl AsRef<Path>) -> Self {
        Self {
            url: format!("sqlite:{}?mode=rwc", path.as_ref().display()),
            max_connections: 5,
        }
    }

    /// In-memory SQLite database (for testing).
    ///
    /// Each connection to `sqlite::memory:` is a separate database, so the pool
    /// is limited to a single connection.
    pub fn sqlite_memory() -> Self {
        Self {
            url: "sqlite::memory:".to_string(),
            max_connections: 1,
        }
    }

    /// Set maximum connections.
    pub fn with_max_connections(mut self, max: u32) -> Self {
        self.max_connections = max;
        self
    }

    fn is_memory(&self) -> bool {
        self.url.contains(":memory:") || self.url.contains("mode=memory")
    }

    /// Pool options for this configuration.
    ///
    /// An in-memory database lives only as long as its connection, so memory
    /// pools never expire idle or old connections.
    fn pool_options(&self) -> SqlitePoolOptions {
        let options = SqlitePoolOptions::new().max_connections(self.max_connections);
        if self.is_memory() {
            options.idle_timeout(None).max_lifetime(None)
        } else {
            options
        }
    }
}

/// Handle to the build record store.
///
/// Cheap to clone; clones share the same pool. Construct one per process and
/// pass it to whatever needs it.
#[derive(Clone)]
pub struct BuildStoreDb {
    pool: SqlitePool,
}

impl std::fmt::Debug for BuildStoreDb {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BuildStoreDb")
            .field("connections", &self.pool.size())
            .finish()
    }
}

impl BuildStoreDb {
    /// Open or create a database at the given path.
    ///
    /// Creates all tables if they don't exist.
    pub async fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();

        // Ensure parent directory exists
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }

        Self::connect(&DbConfig::sqlite(path)).await
    }

    /// Open an in-memory database (for testing).
    pub async fn open_memory() -> Result<Self> {
        Self::connect(&DbConfig::sqlite_memory()).await
    }

    /// Connect using an explicit configuration and ensure the schema exists.
    pub async fn connect(config: &DbConfig) -> Result<Self> {
        let pool = config.pool_options().connect(&config.url).await?;

        let db = Self { pool };
        db.ensure_schema().await?;

        info!(url = %config.url, "Build store opened");
        Ok(db)
    }

    /// Get the underlying connection pool (escape hatch for diagnostics).
    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    /// Close the database connection.
    pub async fn close(self) {
        self.pool.close().await;
    }
}

// Timestamp utilities
impl BuildStoreDb {
    /// Current time as milliseconds since Unix epoch.
    pub fn now_millis() -> i64 {
        chrono::Utc::now().timestamp_millis()
    }

    /// Convert milliseconds to DateTime.
    pub fn millis_to_datetime(millis: i64) -> chrono::DateTime<chrono::Utc> {
        chrono::DateTime::from_timestamp_millis(millis).unwrap_or_default()
    }
}
