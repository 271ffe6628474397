//! # Cache Database Pool
//!
//! SQLite connection pool for the remote file cache.
//!
//! - **WAL mode** so status reads never wait for a sync writing its row
//! - **Embedded migrations** from `core-sync/migrations`, applied on open
//! - **Health check** before the pool is handed out
//!
//! ```rust,ignore
//! use core_sync::db::{create_pool, DatabaseConfig};
//!
//! let pool = create_pool(DatabaseConfig::new("vault-cache.db")).await?;
//! ```

use crate::{Result, SyncError};
use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePoolOptions, SqliteSynchronous};
use sqlx::SqlitePool;
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;
use tracing::{debug, info, warn};

#[derive(Debug, Clone)]
pub struct DatabaseConfig {
    /// `sqlite:<path>` or `sqlite::memory:`
    pub database_url: String,
    pub min_connections: u32,
    pub max_connections: u32,
    pub acquire_timeout: Duration,
    pub idle_timeout: Option<Duration>,
}

impl DatabaseConfig {
    pub fn new(database_path: impl Into<PathBuf>) -> Self {
        let path = database_path.into();
        Self {
            database_url: format!("sqlite:{}", path.display()),
            min_connections: 1,
            max_connections: 4,
            acquire_timeout: Duration::from_secs(30),
            idle_timeout: Some(Duration::from_secs(600)),
        }
    }

    /// In-memory database. Every SQLite connection opens its own in-memory
    /// database, so the pool is pinned to a single connection that is never
    /// recycled.
    pub fn in_memory() -> Self {
        Self {
            database_url: "sqlite::memory:".to_string(),
            min_connections: 1,
            max_connections: 1,
            acquire_timeout: Duration::from_secs(30),
            idle_timeout: None,
        }
    }

    pub fn max_connections(mut self, max: u32) -> Self {
        self.max_connections = max;
        self
    }

    pub fn acquire_timeout(mut self, timeout: Duration) -> Self {
        self.acquire_timeout = timeout;
        self
    }
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self::in_memory()
    }
}

/// Open the pool, apply migrations and verify the connection.
pub async fn create_pool(config: DatabaseConfig) -> Result<SqlitePool> {
    info!(
        database_url = %config.database_url,
        max_connections = config.max_connections,
        "Opening cache database"
    );

    let connect_options = SqliteConnectOptions::from_str(&config.database_url)?
        .journal_mode(SqliteJournalMode::Wal)
        .synchronous(SqliteSynchronous::Normal)
        .create_if_missing(true)
        .busy_timeout(Duration::from_secs(5));

    let pool = SqlitePoolOptions::new()
        .min_connections(config.min_connections)
        .max_connections(config.max_connections)
        .acquire_timeout(config.acquire_timeout)
        .idle_timeout(config.idle_timeout)
        .max_lifetime(None)
        .connect_with(connect_options)
        .await
        .map_err(|e| {
            warn!(error = %e, "Failed to open cache database");
            SyncError::Database(e)
        })?;

    run_migrations(&pool).await?;
    health_check(&pool).await?;

    Ok(pool)
}

/// In-memory pool with migrations applied.
pub async fn create_test_pool() -> Result<SqlitePool> {
    create_pool(DatabaseConfig::in_memory()).await
}

async fn run_migrations(pool: &SqlitePool) -> Result<()> {
    sqlx::migrate!("./migrations")
        .run(pool)
        .await
        .map_err(|e| {
            warn!(error = %e, "Migration failed");
            SyncError::Migration(e.to_string())
        })?;

    debug!("Cache database migrations applied");
    Ok(())
}

async fn health_check(pool: &SqlitePool) -> Result<()> {
    sqlx::query("SELECT 1").fetch_one(pool).await?;
    Ok(())
}
