use std::fmt;
use std::sync::Arc;
use std::time::{Duration, Instant};

use crate::config::BrainConfig;
use crate::db::BrainStore;
use crate::error::{BrainError, Result};
use crate::models::{GiftQuery, NewGiftQuery, NewSnowmanResponse, Persona};
use crate::pipeline::generator::BrainGenerator;
use crate::pipeline::phase::{PhaseRunner, PhaseStats};
use crate::pipeline::retry::RetryPolicy;
use crate::pipeline::writer::{PersistenceWriter, WriteOutcome};

/// Requested, generated and stored counts for one entity kind.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Tally {
    pub requested: usize,
    pub generated: usize,
    pub failed: usize,
    pub persisted: usize,
    pub lost: usize,
}

impl Tally {
    fn from_phase<T>(requested: usize, stats: &PhaseStats, written: &WriteOutcome<T>) -> Self {
        Self {
            requested,
            generated: stats.succeeded,
            failed: stats.failed,
            persisted: written.records.len(),
            lost: written.lost,
        }
    }

    pub fn shortfall(&self) -> usize {
        self.requested.saturating_sub(self.persisted)
    }
}

/// Everything a finished run reports.
#[derive(Debug, Clone)]
pub struct RunSummary {
    pub run_id: String,
    pub personas: Tally,
    pub queries: Tally,
    pub responses: Tally,
    pub phases: Vec<PhaseStats>,
    pub elapsed: Duration,
    pub average_response_secs: Option<f64>,
}

impl RunSummary {
    /// Generation failures plus rows lost on write.
    pub fn total_failures(&self) -> usize {
        [self.personas, self.queries, self.responses]
            .iter()
            .map(|t| t.failed + t.lost)
            .sum()
    }

    pub fn is_complete(&self) -> bool {
        self.personas.shortfall() == 0
            && self.queries.shortfall() == 0
            && self.responses.shortfall() == 0
    }

    pub fn log(&self) {
        tracing::info!(run_id = %self.run_id, "Brain build finished");
        for (kind, tally) in [
            ("personas", self.personas),
            ("queries", self.queries),
            ("responses", self.responses),
        ] {
            tracing::info!(
                kind,
                requested = tally.requested,
                generated = tally.generated,
                persisted = tally.persisted,
                failed = tally.failed,
                lost = tally.lost,
                shortfall = tally.shortfall(),
                "Entity totals"
            );
        }
        for phase in &self.phases {
            tracing::info!(
                phase = %phase.name,
                elapsed_secs = phase.elapsed.as_secs_f64(),
                avg_item_secs = phase.average_latency().map(|d| d.as_secs_f64()),
                "Phase timing"
            );
        }
        tracing::info!(
            total_failures = self.total_failures(),
            elapsed_secs = self.elapsed.as_secs_f64(),
            avg_response_secs = self.average_response_secs,
            "Totals"
        );
    }
}

impl fmt::Display for RunSummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "Run {}", self.run_id)?;
        for (kind, tally) in [
            ("Personas", self.personas),
            ("Queries", self.queries),
            ("Responses", self.responses),
        ] {
            writeln!(
                f,
                "  {kind:<10} {persisted}/{requested} stored ({failed} failed, {lost} lost)",
                persisted = tally.persisted,
                requested = tally.requested,
                failed = tally.failed,
                lost = tally.lost,
            )?;
        }
        if let Some(avg) = self.average_response_secs {
            writeln!(f, "  Average response time: {avg:.2}s")?;
        }
        write!(f, "  Total time: {:.1}s", self.elapsed.as_secs_f64())
    }
}

#[derive(Debug, Clone, Copy)]
struct PersonaSlot(usize);

impl fmt::Display for PersonaSlot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "persona #{}", self.0)
    }
}

#[derive(Debug, Clone)]
struct QueryTask {
    persona: Persona,
    ordinal: usize,
}

impl fmt::Display for QueryTask {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "persona {} query #{}", self.persona.id, self.ordinal)
    }
}

#[derive(Debug, Clone)]
struct ResponseTask(GiftQuery);

impl fmt::Display for ResponseTask {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "query {}", self.0.id)
    }
}

/// Builds one brain: personas, then their queries, then Snowman's answers.
///
/// Phases run strictly in order and each phase's output is written before
/// the next one starts; the next phase only sees rows that were stored.
pub struct BrainBuilder {
    config: BrainConfig,
    dimensions: usize,
    generator: Arc<dyn BrainGenerator>,
    store: Arc<dyn BrainStore>,
}

impl BrainBuilder {
    pub fn new(
        config: BrainConfig,
        dimensions: usize,
        generator: Arc<dyn BrainGenerator>,
        store: Arc<dyn BrainStore>,
    ) -> Self {
        Self {
            config,
            dimensions,
            generator,
            store,
        }
    }

    pub async fn run(&self) -> Result<RunSummary> {
        let started = Instant::now();
        let run_id = uuid::Uuid::new_v4().to_string();

        self.store.ensure_schema(self.dimensions).await?;
        if let Some(previous) = self.store.last_run().await? {
            tracing::debug!(previous_run = %previous, "Appending to an existing brain");
        }
        self.store.record_run(&run_id).await?;
        tracing::info!(
            run_id = %run_id,
            personas = self.config.num_personas,
            queries_per_persona = self.config.queries_per_persona,
            "Building brain"
        );

        let calls = RetryPolicy::for_calls(&self.config);
        let writer = PersistenceWriter::new(
            self.store.clone(),
            run_id.clone(),
            self.config.write_batch_size,
            RetryPolicy::for_writes(&self.config),
        );
        let mut phases = Vec::with_capacity(3);

        // Personas
        let runner = PhaseRunner::new(
            "personas",
            self.config.max_concurrent_personas,
            calls,
            self.config.show_progress,
        );
        let slots = (1..=self.config.num_personas).map(PersonaSlot).collect();
        let generated = runner
            .run(slots, |slot: PersonaSlot| {
                let generator = self.generator.clone();
                async move { generator.generate_persona(slot.0).await }
            })
            .await;
        let profiles = generated.completed.into_iter().map(|c| c.value).collect();
        let stored_personas = writer.write_personas(profiles).await;
        let personas = Tally::from_phase(self.config.num_personas, &generated.stats, &stored_personas);
        phases.push(generated.stats);

        // Queries
        let runner = PhaseRunner::new(
            "queries",
            self.config.max_concurrent_queries,
            calls,
            self.config.show_progress,
        );
        let tasks = stored_personas
            .records
            .iter()
            .flat_map(|persona| {
                (1..=self.config.queries_per_persona).map(move |ordinal| QueryTask {
                    persona: persona.clone(),
                    ordinal,
                })
            })
            .collect();
        let generated = runner
            .run(tasks, |task: QueryTask| {
                let generator = self.generator.clone();
                let dimensions = self.dimensions;
                async move {
                    let text = generator.generate_query(&task.persona, task.ordinal).await?;
                    let embedding = generator.embed(&text).await?;
                    if embedding.len() != dimensions {
                        return Err(BrainError::MalformedOutput(format!(
                            "Embedding has {} dimensions, store expects {dimensions}",
                            embedding.len()
                        )));
                    }
                    Ok(NewGiftQuery {
                        persona_id: task.persona.id,
                        context: NewGiftQuery::context_for(&task.persona.profile),
                        text,
                        embedding,
                    })
                }
            })
            .await;
        let new_queries = generated.completed.into_iter().map(|c| c.value).collect();
        let stored_queries = writer.write_queries(new_queries).await;
        let queries = Tally::from_phase(self.config.total_queries(), &generated.stats, &stored_queries);
        phases.push(generated.stats);

        // Responses
        let runner = PhaseRunner::new(
            "responses",
            self.config.max_concurrent_responses,
            calls,
            self.config.show_progress,
        );
        let tasks = stored_queries.records.into_iter().map(ResponseTask).collect();
        let generated = runner
            .run(tasks, |task: ResponseTask| {
                let generator = self.generator.clone();
                async move { generator.respond(&task.0).await }
            })
            .await;
        let new_responses: Vec<NewSnowmanResponse> = generated
            .completed
            .into_iter()
            .map(|c| NewSnowmanResponse {
                persona_id: c.item.0.persona_id,
                query_id: c.item.0.id,
                query: c.item.0.text,
                response: c.value,
                response_time_secs: c.elapsed.as_secs_f64(),
            })
            .collect();
        let stored_responses = writer.write_responses(new_responses).await;
        let responses = Tally::from_phase(self.config.total_queries(), &generated.stats, &stored_responses);
        phases.push(generated.stats);

        let average_response_secs = if stored_responses.records.is_empty() {
            None
        } else {
            let total: f64 = stored_responses
                .records
                .iter()
                .map(|r| r.response_time_secs)
                .sum();
            Some(total / stored_responses.records.len() as f64)
        };

        if let Err(e) = self.store.sync().await {
            tracing::warn!(error = %e, "Sync after build failed");
        }

        Ok(RunSummary {
            run_id,
            personas,
            queries,
            responses,
            phases,
            elapsed: started.elapsed(),
            average_response_secs,
        })
    }
}
