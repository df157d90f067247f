use async_trait::async_trait;

use crate::error::Result;
use crate::models::{GiftQueryHit, NewGiftQuery, NewSnowmanResponse, PersonaProfile};

/// Row totals per table, optionally scoped to one run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RowCounts {
    pub personas: u64,
    pub queries: u64,
    pub responses: u64,
}

/// Append-only inserts over one held connection.
///
/// A writer lives for one write chunk; dropping it returns the connection.
#[async_trait]
pub trait RowWriter: Send + Sync {
    async fn insert_persona(&self, run_id: &str, profile: &PersonaProfile) -> Result<i64>;
    async fn insert_query(&self, run_id: &str, query: &NewGiftQuery) -> Result<i64>;
    async fn insert_response(&self, run_id: &str, response: &NewSnowmanResponse) -> Result<i64>;
}

/// The vector store the brain is built into.
#[async_trait]
pub trait BrainStore: Send + Sync {
    /// Create tables and indexes if missing and pin the embedding width.
    async fn ensure_schema(&self, dimensions: usize) -> Result<()>;

    async fn open_writer(&self) -> Result<Box<dyn RowWriter>>;

    async fn record_run(&self, run_id: &str) -> Result<()>;

    /// Id of the most recently started run, if any.
    async fn last_run(&self) -> Result<Option<String>>;

    async fn count_rows(&self, run_id: Option<&str>) -> Result<RowCounts>;

    /// Number of rows whose foreign keys point nowhere.
    async fn integrity_violations(&self) -> Result<u64>;

    async fn search_similar_queries(
        &self,
        embedding: &[f32],
        limit: u32,
        threshold: f32,
    ) -> Result<Vec<GiftQueryHit>>;

    /// Sync with remote (e.g. Turso replication). No-op for local-only backends.
    async fn sync(&self) -> Result<()>;
}
