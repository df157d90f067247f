use crate::config::{parse_provider_model, EmbeddingsConfig};
use crate::embeddings::api::{default_base_url, ApiConfig, EmbeddingApiClient, WireFormat};
use crate::error::{BrainError, Result};

/// Document embeddings at a fixed width.
#[derive(Clone)]
pub struct EmbeddingProvider {
    client: EmbeddingApiClient,
    dimensions: usize,
}

impl EmbeddingProvider {
    pub fn new(config: &EmbeddingsConfig) -> Result<Self> {
        let (provider, model_name) = parse_provider_model(&config.model);
        let provider = provider.to_lowercase();

        let wire_format = if provider == "cohere" {
            WireFormat::Cohere
        } else {
            WireFormat::OpenAI
        };

        let api_config = ApiConfig {
            base_url: config
                .base_url
                .clone()
                .unwrap_or_else(|| default_base_url(&provider).to_string()),
            api_key: config.api_key.clone(),
            model: model_name.to_string(),
            timeout_secs: config.timeout_secs,
            wire_format,
            output_dimensions: requested_dimensions(&provider, model_name, config.dimensions),
        };

        tracing::debug!(
            provider = %provider,
            model = %model_name,
            dimensions = config.dimensions,
            "Embedding provider ready"
        );

        Ok(Self {
            client: EmbeddingApiClient::new(api_config)?,
            dimensions: config.dimensions,
        })
    }

    pub async fn embed(&self, texts: &[&str]) -> Result<Vec<Vec<f32>>> {
        let embeddings = self.client.embed(texts).await?;
        for embedding in &embeddings {
            self.check_width(embedding)?;
        }
        Ok(embeddings)
    }

    pub async fn embed_single(&self, text: &str) -> Result<Vec<f32>> {
        self.embed(&[text])
            .await?
            .into_iter()
            .next()
            .ok_or_else(|| BrainError::MalformedOutput("No embedding generated".to_string()))
    }

    pub fn dimensions(&self) -> usize {
        self.dimensions
    }

    fn check_width(&self, embedding: &[f32]) -> Result<()> {
        if embedding.len() != self.dimensions {
            return Err(BrainError::MalformedOutput(format!(
                "Embedding has {} dimensions, expected {}",
                embedding.len(),
                self.dimensions
            )));
        }
        Ok(())
    }
}

/// Only Cohere embed-v4 and OpenAI `text-embedding-3-*` accept an explicit width.
fn requested_dimensions(provider: &str, model: &str, dimensions: usize) -> Option<usize> {
    match provider {
        "cohere" if model.starts_with("embed-v4") => Some(dimensions),
        "openai" if model.starts_with("text-embedding-3") => Some(dimensions),
        _ => None,
    }
}
