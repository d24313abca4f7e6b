//! # Database Connection Pool Module
//!
//! SQLite connection pooling for the offline store.
//!
//! ## Features
//!
//! - **WAL Mode**: Enabled for better concurrency (multiple readers, one writer)
//! - **Foreign Keys**: Enforced
//! - **Busy Timeout**: Writers wait instead of failing immediately
//! - **Automatic Migrations**: Run on initialization
//!
//! ## Usage
//!
//! ```rust,ignore
//! use core_offline::db::{create_pool, DatabaseConfig};
//!
//! let pool = create_pool(DatabaseConfig::new("/data/offline.db")).await?;
//! ```
//!
//! For tests, use [`create_test_pool`], which returns a migrated in-memory
//! database on a single connection.

use crate::error::{OfflineError, Result};
use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePoolOptions, SqliteSynchronous};
use sqlx::SqlitePool;
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;
use tracing::{debug, info, warn};

/// Database configuration for the SQLite connection pool
#[derive(Debug, Clone)]
pub struct DatabaseConfig {
    /// Database URL (`sqlite:<path>` or `sqlite::memory:`)
    pub database_url: String,

    /// Minimum number of connections in the pool
    pub min_connections: u32,

    /// Maximum number of connections in the pool
    pub max_connections: u32,

    /// Maximum time to wait for a connection from the pool
    pub acquire_timeout: Duration,

    /// How long a writer waits on a locked database
    pub busy_timeout: Duration,
}

impl DatabaseConfig {
    /// Create a configuration for the database file at `database_path`.
    pub fn new(database_path: impl Into<PathBuf>) -> Self {
        let path = database_path.into();

        Self {
            database_url: format!("sqlite:{}", path.display()),
            min_connections: 1,
            max_connections: 5,
            acquire_timeout: Duration::from_secs(30),
            busy_timeout: Duration::from_secs(5),
        }
    }

    /// In-memory database. Every SQLite connection to `:memory:` opens a
    /// separate database, so the pool is pinned to one connection.
    pub fn in_memory() -> Self {
        Self {
            database_url: "sqlite::memory:".to_string(),
            min_connections: 1,
            max_connections: 1,
            acquire_timeout: Duration::from_secs(30),
            busy_timeout: Duration::from_secs(5),
        }
    }

    pub fn max_connections(mut self, max: u32) -> Self {
        self.max_connections = max;
        self
    }

    pub fn busy_timeout(mut self, timeout: Duration) -> Self {
        self.busy_timeout = timeout;
        self
    }
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self::in_memory()
    }
}

/// Create a configured SQLite connection pool and apply migrations.
///
/// # Errors
///
/// Returns an error if the database cannot be opened, the pool cannot be
/// created, or a migration fails.
pub async fn create_pool(config: DatabaseConfig) -> Result<SqlitePool> {
    info!(
        database_url = %config.database_url,
        max_connections = config.max_connections,
        "Creating offline store connection pool"
    );

    let connect_options = SqliteConnectOptions::from_str(&config.database_url)?
        .journal_mode(SqliteJournalMode::Wal)
        .synchronous(SqliteSynchronous::Normal)
        .foreign_keys(true)
        .create_if_missing(true)
        .busy_timeout(config.busy_timeout);

    let pool = SqlitePoolOptions::new()
        .min_connections(config.min_connections)
        .max_connections(config.max_connections)
        .acquire_timeout(config.acquire_timeout)
        .connect_with(connect_options)
        .await
        .map_err(|e| {
            warn!(error = %e, "Failed to create connection pool");
            OfflineError::Database(e)
        })?;

    run_migrations(&pool).await?;

    Ok(pool)
}

/// Migrated in-memory pool for tests.
pub async fn create_test_pool() -> Result<SqlitePool> {
    create_pool(DatabaseConfig::in_memory()).await
}

async fn run_migrations(pool: &SqlitePool) -> Result<()> {
    debug!("Running offline store migrations");

    sqlx::migrate!("./migrations").run(pool).await.map_err(|e| {
        warn!(error = %e, "Migration failed");
        OfflineError::Migration(e.to_string())
    })?;

    debug!("Offline store migrations completed");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_create_test_pool_has_tables() {
        let pool = create_test_pool().await.unwrap();

        for table in ["offline_resources", "priority_urls", "download_requests"] {
            let count: i64 = sqlx::query_scalar(
                "SELECT COUNT(*) FROM sqlite_master WHERE type = 'table' AND name = ?",
            )
            .bind(table)
            .fetch_one(&pool)
            .await
            .unwrap();
            assert_eq!(count, 1, "missing table {table}");
        }
    }

    #[tokio::test]
    async fn test_file_pool_persists_between_pools() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("offline.db");

        let pool = create_pool(DatabaseConfig::new(&path)).await.unwrap();
        sqlx::query("INSERT INTO priority_urls (url, marked_at) VALUES ('https://a/x.jpg', 1)")
            .execute(&pool)
            .await
            .unwrap();
        pool.close().await;

        let reopened = create_pool(DatabaseConfig::new(&path)).await.unwrap();
        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM priority_urls")
            .fetch_one(&reopened)
            .await
            .unwrap();
        assert_eq!(count, 1);
    }

    #[test]
    fn test_config_builder() {
        let config = DatabaseConfig::new("/tmp/offline.db")
            .max_connections(8)
            .busy_timeout(Duration::from_secs(1));

        assert_eq!(config.database_url, "sqlite:/tmp/offline.db");
        assert_eq!(config.max_connections, 8);
        assert_eq!(config.busy_timeout, Duration::from_secs(1));
        assert_eq!(DatabaseConfig::in_memory().max_connections, 1);
    }
}
