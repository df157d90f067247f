#![allow(dead_code)]

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use libsql::Builder;
use tempfile::NamedTempFile;

use snowbrain::config::BrainConfig;
use snowbrain::db::{BrainStore, Database, LibSqlBackend, RowCounts, RowWriter};
use snowbrain::error::{BrainError, Result};
use snowbrain::models::{
    BudgetRange, GiftQuery, GiftQueryHit, GiftRecipient, NewGiftQuery, NewSnowmanResponse,
    Persona, PersonaProfile, ShoppingPreferences,
};
use snowbrain::pipeline::BrainGenerator;

pub const DIMS: usize = 8;

// ── Store ─────────────────────────────────────────────────────────────────

/// File-backed libSQL store. Keep the temp file alive for the test's duration.
pub async fn temp_store() -> (LibSqlBackend, NamedTempFile) {
    let temp = NamedTempFile::new().expect("create temp db file");
    let db = Builder::new_local(temp.path())
        .build()
        .await
        .expect("open libsql database");
    (LibSqlBackend::new(Database::from_libsql(db)), temp)
}

pub fn brain_config(personas: usize, queries_per_persona: usize) -> BrainConfig {
    BrainConfig {
        num_personas: personas,
        queries_per_persona,
        max_concurrent_personas: 2,
        max_concurrent_queries: 2,
        max_concurrent_responses: 2,
        retry_max_attempts: 2,
        retry_base_delay_ms: 1,
        retry_max_delay_ms: 5,
        write_batch_size: 4,
        write_max_attempts: 3,
        show_progress: false,
    }
}

pub fn profile(name: &str) -> PersonaProfile {
    PersonaProfile {
        name: name.to_string(),
        age: 38,
        description: "Teaches grade four in Saskatoon and loves the outdoors.".to_string(),
        shopping_preferences: ShoppingPreferences {
            style: "researches online, buys local".to_string(),
            priorities: vec!["made in Canada".to_string()],
        },
        budget_range: BudgetRange::new(25, 150),
        gift_recipients: vec![GiftRecipient {
            relation: "brother".to_string(),
            traits: "cross-country skier".to_string(),
        }],
    }
}

/// Wraps a real store; the first `failures` query inserts fail before
/// touching the database.
pub struct FlakyStore {
    inner: LibSqlBackend,
    remaining: Arc<AtomicUsize>,
    attempts: Arc<AtomicUsize>,
}

impl FlakyStore {
    pub fn new(inner: LibSqlBackend, failures: usize) -> Self {
        Self {
            inner,
            remaining: Arc::new(AtomicUsize::new(failures)),
            attempts: Arc::new(AtomicUsize::new(0)),
        }
    }

    pub fn query_insert_attempts(&self) -> usize {
        self.attempts.load(Ordering::SeqCst)
    }
}

struct FlakyWriter {
    inner: Box<dyn RowWriter>,
    remaining: Arc<AtomicUsize>,
    attempts: Arc<AtomicUsize>,
}

#[async_trait]
impl RowWriter for FlakyWriter {
    async fn insert_persona(&self, run_id: &str, profile: &PersonaProfile) -> Result<i64> {
        self.inner.insert_persona(run_id, profile).await
    }

    async fn insert_query(&self, run_id: &str, query: &NewGiftQuery) -> Result<i64> {
        self.attempts.fetch_add(1, Ordering::SeqCst);
        let should_fail = self
            .remaining
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok();
        if should_fail {
            return Err(BrainError::Database(libsql::Error::SqliteFailure(
                5,
                "database is locked".to_string(),
            )));
        }
        self.inner.insert_query(run_id, query).await
    }

    async fn insert_response(&self, run_id: &str, response: &NewSnowmanResponse) -> Result<i64> {
        self.inner.insert_response(run_id, response).await
    }
}

#[async_trait]
impl BrainStore for FlakyStore {
    async fn ensure_schema(&self, dimensions: usize) -> Result<()> {
        self.inner.ensure_schema(dimensions).await
    }

    async fn open_writer(&self) -> Result<Box<dyn RowWriter>> {
        Ok(Box::new(FlakyWriter {
            inner: self.inner.open_writer().await?,
            remaining: self.remaining.clone(),
            attempts: self.attempts.clone(),
        }))
    }

    async fn record_run(&self, run_id: &str) -> Result<()> {
        self.inner.record_run(run_id).await
    }

    async fn last_run(&self) -> Result<Option<String>> {
        self.inner.last_run().await
    }

    async fn count_rows(&self, run_id: Option<&str>) -> Result<RowCounts> {
        self.inner.count_rows(run_id).await
    }

    async fn integrity_violations(&self) -> Result<u64> {
        self.inner.integrity_violations().await
    }

    async fn search_similar_queries(
        &self,
        embedding: &[f32],
        limit: u32,
        threshold: f32,
    ) -> Result<Vec<GiftQueryHit>> {
        self.inner
            .search_similar_queries(embedding, limit, threshold)
            .await
    }

    async fn sync(&self) -> Result<()> {
        self.inner.sync().await
    }
}

// ── Generator ─────────────────────────────────────────────────────────────

/// Deterministic generator. Personas are named "Persona <n>" and every query
/// starts with its persona's name, so failures can target one persona.
#[derive(Default)]
pub struct MockGenerator {
    pub fail_responses_for: Option<String>,
    pub malformed_persona: Option<usize>,
    /// Overrides the embedding width; `DIMS` when unset.
    pub embedding_width: Option<usize>,
    pub response_calls: AtomicUsize,
    active_responses: AtomicUsize,
    peak_responses: AtomicUsize,
}

impl MockGenerator {
    pub fn failing_responses_for(name: &str) -> Self {
        Self {
            fail_responses_for: Some(name.to_string()),
            ..Self::default()
        }
    }

    pub fn malformed_persona(ordinal: usize) -> Self {
        Self {
            malformed_persona: Some(ordinal),
            ..Self::default()
        }
    }

    pub fn embedding_width(width: usize) -> Self {
        Self {
            embedding_width: Some(width),
            ..Self::default()
        }
    }

    pub fn peak_responses(&self) -> usize {
        self.peak_responses.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl BrainGenerator for MockGenerator {
    async fn generate_persona(&self, ordinal: usize) -> Result<PersonaProfile> {
        if self.malformed_persona == Some(ordinal) {
            return Err(BrainError::MalformedOutput("not json".to_string()));
        }
        Ok(profile(&format!("Persona {ordinal}")))
    }

    async fn generate_query(&self, persona: &Persona, ordinal: usize) -> Result<String> {
        Ok(format!(
            "{} needs gift idea {ordinal} for a brother who skis",
            persona.profile.name
        ))
    }

    async fn embed(&self, text: &str) -> Result<Vec<f32>> {
        let seed = text.len() as f32;
        let width = self.embedding_width.unwrap_or(DIMS);
        Ok((0..width).map(|i| (seed + i as f32) / 100.0).collect())
    }

    async fn respond(&self, query: &GiftQuery) -> Result<String> {
        self.response_calls.fetch_add(1, Ordering::SeqCst);
        let now = self.active_responses.fetch_add(1, Ordering::SeqCst) + 1;
        self.peak_responses.fetch_max(now, Ordering::SeqCst);
        tokio::time::sleep(Duration::from_millis(5)).await;
        self.active_responses.fetch_sub(1, Ordering::SeqCst);

        if let Some(name) = &self.fail_responses_for {
            if query.text.starts_with(&format!("{name} ")) {
                return Err(BrainError::Transient("503 from mock".to_string()));
            }
        }
        Ok(format!("Try a Canadian-made option for: {}", query.text))
    }
}
