use async_trait::async_trait;
use libsql::Connection;

use crate::db::connection::Database;
use crate::db::repository::{PersonaRepository, QueryRepository, ResponseRepository};
use crate::db::schema;
use crate::db::traits::{BrainStore, RowCounts, RowWriter};
use crate::db::MetadataRepository;
use crate::error::Result;
use crate::models::{GiftQueryHit, NewGiftQuery, NewSnowmanResponse, PersonaProfile};

pub struct LibSqlBackend {
    db: Database,
}

impl LibSqlBackend {
    pub fn new(db: Database) -> Self {
        Self { db }
    }

    pub fn database(&self) -> &Database {
        &self.db
    }
}

/// One connection held for the duration of a write chunk.
pub struct LibSqlRowWriter {
    conn: Connection,
}

#[async_trait]
impl RowWriter for LibSqlRowWriter {
    async fn insert_persona(&self, run_id: &str, profile: &PersonaProfile) -> Result<i64> {
        PersonaRepository::insert(&self.conn, run_id, profile).await
    }
    async fn insert_query(&self, run_id: &str, query: &NewGiftQuery) -> Result<i64> {
        QueryRepository::insert(&self.conn, run_id, query).await
    }
    async fn insert_response(&self, run_id: &str, response: &NewSnowmanResponse) -> Result<i64> {
        ResponseRepository::insert(&self.conn, run_id, response).await
    }
}

#[async_trait]
impl BrainStore for LibSqlBackend {
    async fn ensure_schema(&self, dimensions: usize) -> Result<()> {
        let conn = self.db.connect().await?;
        schema::init_schema(&conn, dimensions).await?;
        MetadataRepository::ensure_embedding_dimensions(&conn, dimensions).await
    }

    async fn open_writer(&self) -> Result<Box<dyn RowWriter>> {
        let conn = self.db.connect().await?;
        Ok(Box::new(LibSqlRowWriter { conn }))
    }

    async fn record_run(&self, run_id: &str) -> Result<()> {
        let conn = self.db.connect().await?;
        MetadataRepository::record_run(&conn, run_id).await
    }

    async fn last_run(&self) -> Result<Option<String>> {
        let conn = self.db.connect().await?;
        MetadataRepository::last_run(&conn).await
    }

    async fn count_rows(&self, run_id: Option<&str>) -> Result<RowCounts> {
        let conn = self.db.connect().await?;
        Ok(RowCounts {
            personas: PersonaRepository::count(&conn, run_id).await?,
            queries: QueryRepository::count(&conn, run_id).await?,
            responses: ResponseRepository::count(&conn, run_id).await?,
        })
    }

    async fn integrity_violations(&self) -> Result<u64> {
        let conn = self.db.connect().await?;
        let queries = QueryRepository::count_orphans(&conn).await?;
        let responses = ResponseRepository::count_orphans(&conn).await?;
        Ok(queries + responses)
    }

    async fn search_similar_queries(
        &self,
        embedding: &[f32],
        limit: u32,
        threshold: f32,
    ) -> Result<Vec<GiftQueryHit>> {
        let conn = self.db.connect().await?;
        QueryRepository::search_similar(&conn, embedding, limit, threshold).await
    }

    async fn sync(&self) -> Result<()> {
        self.db.sync().await
    }
}
