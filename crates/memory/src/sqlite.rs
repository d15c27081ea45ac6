//! SQLite backend.
//!
//! A single `kv` table keyed by string with an `updated_at` timestamp,
//! so operators can see when a user last talked to the assistant.

use async_trait::async_trait;
use chrono::Utc;
use deskpilot_core::error::MemoryError;
use deskpilot_core::memory::MemoryBackend;
use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePoolOptions, SqliteSynchronous};
use sqlx::{Row, SqlitePool};
use std::str::FromStr;
use tracing::{debug, info};

pub struct SqliteBackend {
    pool: SqlitePool,
}

impl SqliteBackend {
    /// Open a database from a connection string (e.g. `sqlite://memory.db`).
    ///
    /// The table is created automatically. In-memory databases use a single
    /// connection so every query sees the same data.
    pub async fn new(url: &str) -> Result<Self, MemoryError> {
        let options = SqliteConnectOptions::from_str(url)
            .map_err(|e| MemoryError::Storage(format!("Invalid SQLite path: {e}")))?
            .create_if_missing(true)
            .journal_mode(SqliteJournalMode::Wal)
            .synchronous(SqliteSynchronous::Normal);

        let max_connections = if url.contains(":memory:") { 1 } else { 4 };
        let pool = SqlitePoolOptions::new()
            .max_connections(max_connections)
            .connect_with(options)
            .await
            .map_err(|e| MemoryError::Storage(format!("Failed to open SQLite: {e}")))?;

        let backend = Self { pool };
        backend.run_migrations().await?;
        info!("SQLite memory backend initialized at {url}");
        Ok(backend)
    }

    /// Create from an existing pool (useful for testing).
    pub async fn from_pool(pool: SqlitePool) -> Result<Self, MemoryError> {
        let backend = Self { pool };
        backend.run_migrations().await?;
        Ok(backend)
    }

    async fn run_migrations(&self) -> Result<(), MemoryError> {
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS kv (
                key        TEXT PRIMARY KEY NOT NULL,
                value      TEXT NOT NULL,
                updated_at TEXT NOT NULL
            )
            "#,
        )
        .execute(&self.pool)
        .await
        .map_err(|e| MemoryError::MigrationFailed(format!("kv table: {e}")))?;

        debug!("SQLite migrations complete");
        Ok(())
    }

    /// When a key was last written (RFC 3339).
    pub async fn updated_at(&self, key: &str) -> Result<Option<String>, MemoryError> {
        let row = sqlx::query("SELECT updated_at FROM kv WHERE key = ?1")
            .bind(key)
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| MemoryError::QueryFailed(format!("select updated_at: {e}")))?;
        row.map(|r| {
            r.try_get::<String, _>("updated_at")
                .map_err(|e| MemoryError::QueryFailed(format!("updated_at column: {e}")))
        })
        .transpose()
    }
}

#[async_trait]
impl MemoryBackend for SqliteBackend {
    fn name(&self) -> &str {
        "sqlite"
    }

    async fn get(&self, key: &str) -> Result<Option<String>, MemoryError> {
        let row = sqlx::query("SELECT value FROM kv WHERE key = ?1")
            .bind(key)
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| MemoryError::QueryFailed(format!("select: {e}")))?;
        row.map(|r| {
            r.try_get::<String, _>("value")
                .map_err(|e| MemoryError::QueryFailed(format!("value column: {e}")))
        })
        .transpose()
    }

    async fn put(&self, key: &str, value: String) -> Result<(), MemoryError> {
        sqlx::query(
            r#"
            INSERT INTO kv (key, value, updated_at) VALUES (?1, ?2, ?3)
            ON CONFLICT(key) DO UPDATE SET value = excluded.value, updated_at = excluded.updated_at
            "#,
        )
        .bind(key)
        .bind(value)
        .bind(Utc::now().to_rfc3339())
        .execute(&self.pool)
        .await
        .map_err(|e| MemoryError::Storage(format!("upsert: {e}")))?;
        Ok(())
    }

    async fn delete(&self, key: &str) -> Result<(), MemoryError> {
        sqlx::query("DELETE FROM kv WHERE key = ?1")
            .bind(key)
            .execute(&self.pool)
            .await
            .map_err(|e| MemoryError::Storage(format!("delete: {e}")))?;
        Ok(())
    }

    async fn keys(&self, prefix: &str) -> Result<Vec<String>, MemoryError> {
        let rows = sqlx::query("SELECT key FROM kv WHERE substr(key, 1, length(?1)) = ?1 ORDER BY key")
            .bind(prefix)
            .fetch_all(&self.pool)
            .await
            .map_err(|e| MemoryError::QueryFailed(format!("select keys: {e}")))?;
        rows.iter()
            .map(|r| {
                r.try_get::<String, _>("key")
                    .map_err(|e| MemoryError::QueryFailed(format!("key column: {e}")))
            })
            .collect()
    }
}
