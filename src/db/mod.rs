/// Database layer for Credit Meter
///
/// Owns the process-wide connection pool. SQLite is used for development
/// and tests, PostgreSQL for production; both get their schema from the
/// embedded migrations.

pub mod postgres;

use crate::{
    config::{StorageBackend, StorageConfig},
    error::{MeterError, MeterResult},
};
use sqlx::{
    postgres::PgPool,
    sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePool, SqlitePoolOptions},
};
use std::{path::Path, time::Duration};
use tracing::info;

/// Connection pool for the configured backend
#[derive(Debug, Clone)]
pub enum DbPool {
    Sqlite(SqlitePool),
    Postgres(PgPool),
}

impl DbPool {
    /// Connect to the configured backend and bring the schema up to date
    pub async fn connect(config: &StorageConfig) -> MeterResult<Self> {
        let pool = match &config.backend {
            StorageBackend::Sqlite { path } => DbPool::Sqlite(
                create_sqlite_pool(path, config.max_connections, config.acquire_timeout).await?,
            ),
            StorageBackend::Postgres { url } => DbPool::Postgres(
                postgres::create_pool(&postgres::PostgresConfig::from_storage(url, config)).await?,
            ),
        };

        pool.run_migrations().await?;
        pool.test_connection().await?;

        Ok(pool)
    }

    /// Run migrations for the active backend
    /// Migrations are embedded at compile time from ./migrations
    pub async fn run_migrations(&self) -> MeterResult<()> {
        match self {
            DbPool::Sqlite(pool) => sqlx::migrate!("./migrations/sqlite")
                .run(pool)
                .await
                .map_err(|e| MeterError::Internal(format!("Migration failed: {}", e)))?,
            DbPool::Postgres(pool) => postgres::run_migrations(pool).await?,
        }

        Ok(())
    }

    /// Test database connection
    pub async fn test_connection(&self) -> MeterResult<()> {
        match self {
            DbPool::Sqlite(pool) => {
                sqlx::query("SELECT 1").execute(pool).await?;
            }
            DbPool::Postgres(pool) => {
                sqlx::query("SELECT 1").execute(pool).await?;
            }
        }

        Ok(())
    }

    /// Close every pooled connection, waiting for in-flight queries
    pub async fn close(&self) {
        match self {
            DbPool::Sqlite(pool) => pool.close().await,
            DbPool::Postgres(pool) => pool.close().await,
        }
        info!("Database pool closed");
    }

    pub fn backend_name(&self) -> &'static str {
        match self {
            DbPool::Sqlite(_) => "sqlite",
            DbPool::Postgres(_) => "postgres",
        }
    }
}

/// Create a SQLite connection pool
pub async fn create_sqlite_pool(
    path: &Path,
    max_connections: u32,
    acquire_timeout: u64,
) -> MeterResult<SqlitePool> {
    // Ensure parent directory exists
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            tokio::fs::create_dir_all(parent).await?;
        }
    }

    info!("Opening SQLite database at {}", path.display());

    let timeout = Duration::from_secs(acquire_timeout);
    let pool = SqlitePoolOptions::new()
        .max_connections(max_connections)
        .acquire_timeout(timeout)
        .connect_with(
            SqliteConnectOptions::new()
                .filename(path)
                .create_if_missing(true)
                .journal_mode(SqliteJournalMode::Wal)
                .foreign_keys(true)
                .busy_timeout(timeout),
        )
        .await?;

    Ok(pool)
}
