use std::sync::Arc;
use std::time::{Duration, Instant};

use async_trait::async_trait;

use crate::db::{BrainStore, RowWriter};
use crate::error::{BrainError, Result};
use crate::models::{
    GiftQuery, NewGiftQuery, NewSnowmanResponse, Persona, PersonaProfile, SnowmanResponse,
};
use crate::pipeline::retry::RetryPolicy;

/// Rows that made it into the store, plus how many did not.
#[derive(Debug)]
pub struct WriteOutcome<T> {
    pub records: Vec<T>,
    pub lost: usize,
    pub elapsed: Duration,
}

/// A new row the writer knows how to insert.
#[async_trait]
pub trait PersistRow: Send + Sync {
    type Stored: Send;

    const KIND: &'static str;

    async fn insert(&self, writer: &dyn RowWriter, run_id: &str) -> Result<i64>;

    fn stored(self, id: i64) -> Self::Stored;
}

#[async_trait]
impl PersistRow for PersonaProfile {
    type Stored = Persona;
    const KIND: &'static str = "persona";

    async fn insert(&self, writer: &dyn RowWriter, run_id: &str) -> Result<i64> {
        writer.insert_persona(run_id, self).await
    }

    fn stored(self, id: i64) -> Persona {
        Persona::new(id, self)
    }
}

#[async_trait]
impl PersistRow for NewGiftQuery {
    type Stored = GiftQuery;
    const KIND: &'static str = "gift query";

    async fn insert(&self, writer: &dyn RowWriter, run_id: &str) -> Result<i64> {
        writer.insert_query(run_id, self).await
    }

    fn stored(self, id: i64) -> GiftQuery {
        GiftQuery::new(id, self)
    }
}

#[async_trait]
impl PersistRow for NewSnowmanResponse {
    type Stored = SnowmanResponse;
    const KIND: &'static str = "response";

    async fn insert(&self, writer: &dyn RowWriter, run_id: &str) -> Result<i64> {
        writer.insert_response(run_id, self).await
    }

    fn stored(self, id: i64) -> SnowmanResponse {
        SnowmanResponse::new(id, self)
    }
}

/// Appends generated rows to the store in bounded chunks.
///
/// Each chunk holds one connection for its duration. A row whose insert
/// keeps failing is counted as lost and the chunk moves on; a chunk whose
/// connection cannot be opened loses all of its rows.
pub struct PersistenceWriter {
    store: Arc<dyn BrainStore>,
    run_id: String,
    batch_size: usize,
    policy: RetryPolicy,
}

impl PersistenceWriter {
    pub fn new(
        store: Arc<dyn BrainStore>,
        run_id: impl Into<String>,
        batch_size: usize,
        policy: RetryPolicy,
    ) -> Self {
        Self {
            store,
            run_id: run_id.into(),
            batch_size: batch_size.max(1),
            policy,
        }
    }

    pub fn run_id(&self) -> &str {
        &self.run_id
    }

    pub async fn write_personas(&self, rows: Vec<PersonaProfile>) -> WriteOutcome<Persona> {
        self.write(rows).await
    }

    pub async fn write_queries(&self, rows: Vec<NewGiftQuery>) -> WriteOutcome<GiftQuery> {
        self.write(rows).await
    }

    pub async fn write_responses(
        &self,
        rows: Vec<NewSnowmanResponse>,
    ) -> WriteOutcome<SnowmanResponse> {
        self.write(rows).await
    }

    pub async fn write<R: PersistRow>(&self, rows: Vec<R>) -> WriteOutcome<R::Stored> {
        let started = Instant::now();
        let total = rows.len();
        let mut records = Vec::with_capacity(total);
        let mut lost = 0;

        let mut rows = rows.into_iter().peekable();
        while rows.peek().is_some() {
            let chunk: Vec<R> = rows.by_ref().take(self.batch_size).collect();

            let writer = match self
                .policy
                .run_if("open writer", is_retryable_write, || self.store.open_writer())
                .await
            {
                Ok(opened) => opened.value,
                Err(e) => {
                    tracing::warn!(
                        run_id = %self.run_id(),
                        kind = R::KIND,
                        rows = chunk.len(),
                        error = %e,
                        "Could not open writer, chunk lost"
                    );
                    lost += chunk.len();
                    continue;
                }
            };

            for row in chunk {
                let inserted = self
                    .policy
                    .run_if(R::KIND, is_retryable_write, || {
                        row.insert(writer.as_ref(), &self.run_id)
                    })
                    .await;

                match inserted {
                    Ok(id) => records.push(row.stored(id.value)),
                    Err(e) => {
                        tracing::warn!(run_id = %self.run_id(), kind = R::KIND, error = %e, "Row lost");
                        lost += 1;
                    }
                }
            }
        }

        let elapsed = started.elapsed();
        tracing::info!(
            run_id = %self.run_id(),
            kind = R::KIND,
            written = records.len(),
            lost,
            elapsed_ms = elapsed.as_millis() as u64,
            "Rows written"
        );

        WriteOutcome {
            records,
            lost,
            elapsed,
        }
    }
}

/// Constraint violations fail the same way every time; anything else may clear.
fn is_retryable_write(error: &BrainError) -> bool {
    match error {
        BrainError::Validation(_) | BrainError::Config(_) => false,
        BrainError::Database(e) => !e.to_string().to_lowercase().contains("constraint"),
        _ => true,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_constraint_errors_are_not_retried() {
        let fk = BrainError::Database(libsql::Error::SqliteFailure(
            787,
            "FOREIGN KEY constraint failed".to_string(),
        ));
        assert!(!is_retryable_write(&fk));
        assert!(is_retryable_write(&BrainError::Internal("locked".to_string())));
        assert!(!is_retryable_write(&BrainError::Validation("bad".to_string())));
    }
}
