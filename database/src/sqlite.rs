use sqlx::{
    migrate::MigrateDatabase,
    sqlite::{SqliteConnectOptions, SqlitePoolOptions},
    Sqlite, SqlitePool, Transaction,
};
use taskflow_core::{Result, TaskflowError};

use crate::common::db_err;

/// SQLite-backed database handle for TaskFlow.
///
/// Wraps a bounded connection pool with WAL journaling and foreign keys
/// enforced. In-memory databases are pinned to a single connection so every
/// caller sees the same store.
#[derive(Debug, Clone)]
pub struct Database {
    pool: SqlitePool,
}

impl Database {
    /// Connect to the given SQLite database URL (file path or `:memory:`),
    /// creating the file when missing.
    pub async fn connect(database_url: &str) -> Result<Self> {
        let db_url = if database_url.contains(":memory:") || database_url.starts_with("sqlite://")
        {
            database_url.to_string()
        } else {
            format!("sqlite://{database_url}")
        };

        let in_memory = db_url.contains(":memory:");

        if !in_memory && !Sqlite::database_exists(&db_url).await.unwrap_or(false) {
            Sqlite::create_database(&db_url).await.map_err(|e| {
                TaskflowError::Database(format!("Failed to create database: {e}"))
            })?;
            tracing::info!("Database created");
        }

        let connect_options = if in_memory {
            SqliteConnectOptions::new()
                .filename(":memory:")
                .create_if_missing(true)
                .journal_mode(sqlx::sqlite::SqliteJournalMode::Memory)
                .busy_timeout(std::time::Duration::from_secs(5))
                .foreign_keys(true)
        } else {
            SqliteConnectOptions::new()
                .filename(db_url.replace("sqlite://", ""))
                .create_if_missing(true)
                .journal_mode(sqlx::sqlite::SqliteJournalMode::Wal)
                .busy_timeout(std::time::Duration::from_secs(5))
                .foreign_keys(true)
        };

        let mut pool_options = SqlitePoolOptions::new();
        if in_memory {
            // Each pooled connection to :memory: would otherwise get its own
            // empty database.
            pool_options = pool_options.max_connections(1);
        } else {
            // Pre-ping plus periodic recycle for managed databases that drop
            // idle connections
            pool_options = pool_options
                .max_connections(10)
                .test_before_acquire(true)
                .max_lifetime(std::time::Duration::from_secs(300));
        }

        let pool = pool_options
            .connect_with(connect_options)
            .await
            .map_err(db_err)?;

        Ok(Self { pool })
    }

    /// Apply pending migrations. Call once after connecting.
    pub async fn migrate(&self) -> Result<()> {
        sqlx::migrate!("./migrations/sqlite")
            .run(&self.pool)
            .await
            .map_err(|e| TaskflowError::Database(format!("Migration failed: {e}")))?;
        tracing::info!("Database migrations completed");
        Ok(())
    }

    /// Begin a transaction. The caller commits or rolls back.
    pub async fn begin(&self) -> Result<Transaction<'_, Sqlite>> {
        self.pool.begin().await.map_err(db_err)
    }

    /// Acquire a pooled connection for reads.
    pub async fn acquire(&self) -> Result<sqlx::pool::PoolConnection<Sqlite>> {
        self.pool.acquire().await.map_err(db_err)
    }

    /// Lightweight connectivity probe for readiness checks.
    pub async fn ping(&self) -> Result<()> {
        sqlx::query("SELECT 1")
            .execute(&self.pool)
            .await
            .map_err(db_err)?;
        Ok(())
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }
}
