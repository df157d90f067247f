use async_trait::async_trait;

use crate::embeddings::EmbeddingProvider;
use crate::error::{BrainError, Result};
use crate::llm::prompts::{gift_query_prompt, persona_prompt, PERSONA_SYSTEM_PROMPT};
use crate::llm::LlmProvider;
use crate::models::{clean_query_text, GiftQuery, Persona, PersonaProfile};
use crate::snowman::SnowmanAgent;

/// The outbound calls a brain build makes, one method per call site.
///
/// Each call is a single attempt; retries belong to the phase that drives it.
#[async_trait]
pub trait BrainGenerator: Send + Sync {
    async fn generate_persona(&self, ordinal: usize) -> Result<PersonaProfile>;

    async fn generate_query(&self, persona: &Persona, ordinal: usize) -> Result<String>;

    async fn embed(&self, text: &str) -> Result<Vec<f32>>;

    async fn respond(&self, query: &GiftQuery) -> Result<String>;
}

/// Generator backed by the configured chat model, embedding model and Snowman.
pub struct LlmBrainGenerator {
    llm: LlmProvider,
    embeddings: EmbeddingProvider,
    agent: SnowmanAgent,
}

impl LlmBrainGenerator {
    pub fn new(llm: LlmProvider, embeddings: EmbeddingProvider, agent: SnowmanAgent) -> Self {
        Self {
            llm,
            embeddings,
            agent,
        }
    }
}

#[async_trait]
impl BrainGenerator for LlmBrainGenerator {
    async fn generate_persona(&self, ordinal: usize) -> Result<PersonaProfile> {
        let value = self
            .llm
            .complete_json(&persona_prompt(ordinal), Some(PERSONA_SYSTEM_PROMPT))
            .await?;
        PersonaProfile::from_llm_json(&value)
    }

    async fn generate_query(&self, persona: &Persona, ordinal: usize) -> Result<String> {
        let raw = self
            .llm
            .complete(&gift_query_prompt(&persona.profile, ordinal), None)
            .await?;

        let text = clean_query_text(&raw);
        if text.is_empty() {
            return Err(BrainError::MalformedOutput(
                "Model returned an empty query".to_string(),
            ));
        }
        Ok(text)
    }

    async fn embed(&self, text: &str) -> Result<Vec<f32>> {
        self.embeddings.embed_single(text).await
    }

    async fn respond(&self, query: &GiftQuery) -> Result<String> {
        self.agent.answer(&query.text, &[]).await
    }
}
