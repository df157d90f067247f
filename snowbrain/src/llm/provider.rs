use serde::de::DeserializeOwned;
use serde_json::Value;

use crate::config::{parse_llm_provider_model, LlmConfig};
use crate::error::{BrainError, Result};
use crate::llm::api::LlmApiClient;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LlmBackend {
    OpenAI,
    OpenRouter,
    Ollama,
    LmStudio,
    Cohere,
    OpenAICompatible { base_url: String },
}

#[derive(Debug, Clone, Default)]
pub struct CompletionOptions {
    pub temperature: Option<f32>,
    pub max_tokens: Option<u32>,
    pub stop: Option<Vec<String>>,
}

/// One earlier turn of a conversation, replayed as context.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PriorExchange {
    pub question: String,
    pub answer: String,
}

/// The configured chat model. Built once at startup and shared.
#[derive(Clone)]
pub struct LlmProvider {
    backend: LlmBackend,
    client: LlmApiClient,
    defaults: CompletionOptions,
}

impl LlmProvider {
    pub fn new(config: &LlmConfig) -> Result<Self> {
        let (provider, _model) = parse_llm_provider_model(&config.model);

        let backend = match provider.to_lowercase().as_str() {
            "openai" => LlmBackend::OpenAI,
            "openrouter" => LlmBackend::OpenRouter,
            "ollama" => LlmBackend::Ollama,
            "lmstudio" => LlmBackend::LmStudio,
            "cohere" => LlmBackend::Cohere,
            _ => match &config.base_url {
                Some(base_url) => LlmBackend::OpenAICompatible {
                    base_url: base_url.clone(),
                },
                None => {
                    return Err(BrainError::Config(format!(
                        "Unknown provider in model '{}' and no LLM_BASE_URL set",
                        config.model
                    )))
                }
            },
        };

        let client = LlmApiClient::new(config)?;
        tracing::debug!(backend = ?backend, model = client.model(), "LLM provider ready");

        Ok(Self {
            backend,
            client,
            defaults: CompletionOptions {
                temperature: config.temperature,
                ..CompletionOptions::default()
            },
        })
    }

    pub fn backend(&self) -> &LlmBackend {
        &self.backend
    }

    pub fn model(&self) -> &str {
        self.client.model()
    }

    pub async fn complete(&self, prompt: &str, system_prompt: Option<&str>) -> Result<String> {
        self.client
            .complete(prompt, system_prompt, Some(&self.defaults))
            .await
    }

    pub async fn complete_conversation(
        &self,
        system_prompt: &str,
        history: &[PriorExchange],
        prompt: &str,
    ) -> Result<String> {
        self.client
            .complete_conversation(Some(system_prompt), history, prompt, Some(&self.defaults))
            .await
    }

    pub async fn complete_json(&self, prompt: &str, system_prompt: Option<&str>) -> Result<Value> {
        self.client
            .complete_json(prompt, system_prompt, Some(&self.defaults))
            .await
    }

    pub async fn complete_structured<T: DeserializeOwned>(
        &self,
        prompt: &str,
        system_prompt: Option<&str>,
    ) -> Result<T> {
        let json_value = self.complete_json(prompt, system_prompt).await?;

        serde_json::from_value(json_value)
            .map_err(|e| BrainError::MalformedOutput(format!("Failed to deserialize response: {e}")))
    }
}
