use chrono::Utc;
use libsql::Connection;

use crate::error::{BrainError, Result};

const EMBEDDING_DIMENSIONS_KEY: &str = "embedding_dimensions";
const LAST_RUN_KEY: &str = "last_run_id";

/// Key/value facts about the store itself, kept in `brain_meta`.
pub struct MetadataRepository;

impl MetadataRepository {
    pub async fn get(conn: &Connection, key: &str) -> Result<Option<String>> {
        let mut rows = conn
            .query("SELECT value FROM brain_meta WHERE key = ?1", [key])
            .await?;

        match rows.next().await? {
            Some(row) => Ok(Some(row.get::<String>(0)?)),
            None => Ok(None),
        }
    }

    pub async fn set(conn: &Connection, key: &str, value: &str) -> Result<()> {
        let now = Utc::now().to_rfc3339();
        conn.execute(
            "INSERT INTO brain_meta (key, value, updated_at) VALUES (?1, ?2, ?3)
             ON CONFLICT(key) DO UPDATE SET value = excluded.value, updated_at = excluded.updated_at",
            [key, value, &now],
        )
        .await?;
        Ok(())
    }

    /// Pin the embedding width on first use and refuse to mix widths later.
    ///
    /// The `F32_BLOB` column is typed at creation, so a store built for one
    /// embedding model cannot take vectors from another.
    pub async fn ensure_embedding_dimensions(conn: &Connection, dims: usize) -> Result<()> {
        let stored = Self::get(conn, EMBEDDING_DIMENSIONS_KEY)
            .await?
            .and_then(|s| s.parse::<usize>().ok());

        match stored {
            None => {
                tracing::info!(dimensions = dims, "Fresh store, recording embedding dimensions");
                Self::set(conn, EMBEDDING_DIMENSIONS_KEY, &dims.to_string()).await
            }
            Some(existing) if existing == dims => {
                tracing::debug!(dimensions = dims, "Embedding dimensions match");
                Ok(())
            }
            Some(existing) => Err(BrainError::Config(format!(
                "store was built with {existing}-dimension embeddings but EMBEDDING_DIMENSIONS is {dims}"
            ))),
        }
    }

    pub async fn record_run(conn: &Connection, run_id: &str) -> Result<()> {
        Self::set(conn, LAST_RUN_KEY, run_id).await
    }

    pub async fn last_run(conn: &Connection) -> Result<Option<String>> {
        Self::get(conn, LAST_RUN_KEY).await
    }
}
