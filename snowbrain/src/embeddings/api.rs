use reqwest::{
    header::{HeaderMap, HeaderValue, AUTHORIZATION, CONTENT_TYPE},
    Client, Response, StatusCode,
};
use serde::{Deserialize, Serialize};
use std::time::Duration;

use crate::error::{BrainError, Result};

/// Provider-specific default base URLs
pub fn default_base_url(provider: &str) -> &'static str {
    match provider.to_lowercase().as_str() {
        "openai" => "https://api.openai.com/v1",
        "openrouter" => "https://openrouter.ai/api/v1",
        "ollama" => "http://localhost:11434/v1",
        "lmstudio" => "http://localhost:1234/v1",
        "cohere" => "https://api.cohere.com/v2",
        _ => "https://api.openai.com/v1",
    }
}

/// Wire shape spoken by the embedding endpoint.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WireFormat {
    /// `POST {base}/embeddings` with `{model, input}`
    OpenAI,
    /// `POST {base}/embed` with Cohere v2 `{model, texts, input_type, ...}`
    Cohere,
}

#[derive(Debug, Clone)]
pub struct ApiConfig {
    pub base_url: String,
    pub api_key: Option<String>,
    pub model: String,
    pub timeout_secs: u64,
    pub wire_format: WireFormat,
    /// Requested output width, sent only to endpoints that accept it.
    pub output_dimensions: Option<usize>,
}

#[derive(Debug, Serialize)]
struct OpenAIEmbeddingRequest<'a> {
    model: &'a str,
    input: Vec<&'a str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    dimensions: Option<usize>,
}

#[derive(Debug, Deserialize)]
struct OpenAIEmbeddingResponse {
    data: Vec<OpenAIEmbeddingData>,
}

#[derive(Debug, Deserialize)]
struct OpenAIEmbeddingData {
    embedding: Vec<f32>,
}

#[derive(Debug, Serialize)]
struct CohereEmbedRequest<'a> {
    model: &'a str,
    texts: Vec<&'a str>,
    input_type: &'static str,
    embedding_types: [&'static str; 1],
    #[serde(skip_serializing_if = "Option::is_none")]
    output_dimension: Option<usize>,
}

#[derive(Debug, Deserialize)]
struct CohereEmbedResponse {
    embeddings: CohereEmbeddings,
}

#[derive(Debug, Deserialize)]
struct CohereEmbeddings {
    float: Vec<Vec<f32>>,
}

/// Embedding HTTP client. One attempt per call; retries belong to the caller.
#[derive(Clone)]
pub struct EmbeddingApiClient {
    client: Client,
    config: ApiConfig,
}

impl EmbeddingApiClient {
    pub fn new(config: ApiConfig) -> Result<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .map_err(|e| BrainError::Embedding(format!("Failed to create HTTP client: {e}")))?;

        Ok(Self { client, config })
    }

    pub async fn embed(&self, texts: &[&str]) -> Result<Vec<Vec<f32>>> {
        if texts.is_empty() {
            return Ok(Vec::new());
        }

        let headers = self.headers()?;
        let base_url = self.config.base_url.trim_end_matches('/');

        let request = match self.config.wire_format {
            WireFormat::OpenAI => self
                .client
                .post(format!("{base_url}/embeddings"))
                .headers(headers)
                .json(&OpenAIEmbeddingRequest {
                    model: &self.config.model,
                    input: texts.to_vec(),
                    dimensions: self.config.output_dimensions,
                }),
            WireFormat::Cohere => self
                .client
                .post(format!("{base_url}/embed"))
                .headers(headers)
                .json(&CohereEmbedRequest {
                    model: &self.config.model,
                    texts: texts.to_vec(),
                    input_type: "search_document",
                    embedding_types: ["float"],
                    output_dimension: self.config.output_dimensions,
                }),
        };

        let response = request.send().await.map_err(|e| {
            if e.is_timeout() {
                BrainError::Timeout(format!("Embedding request timed out: {e}"))
            } else {
                BrainError::Transient(format!("Embedding request failed: {e}"))
            }
        })?;

        let response = Self::check_status(response).await?;

        let embeddings = match self.config.wire_format {
            WireFormat::OpenAI => {
                let body: OpenAIEmbeddingResponse = response.json().await.map_err(|e| {
                    BrainError::MalformedOutput(format!("Failed to parse embedding response: {e}"))
                })?;
                body.data.into_iter().map(|d| d.embedding).collect::<Vec<_>>()
            }
            WireFormat::Cohere => {
                let body: CohereEmbedResponse = response.json().await.map_err(|e| {
                    BrainError::MalformedOutput(format!("Failed to parse embedding response: {e}"))
                })?;
                body.embeddings.float
            }
        };

        if embeddings.len() != texts.len() {
            return Err(BrainError::MalformedOutput(format!(
                "Expected {} embeddings, got {}",
                texts.len(),
                embeddings.len()
            )));
        }

        Ok(embeddings)
    }

    fn headers(&self) -> Result<HeaderMap> {
        let mut headers = HeaderMap::new();
        headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));

        if let Some(ref api_key) = self.config.api_key {
            headers.insert(
                AUTHORIZATION,
                HeaderValue::from_str(&format!("Bearer {api_key}"))
                    .map_err(|e| BrainError::Config(format!("Invalid API key header: {e}")))?,
            );
        }

        Ok(headers)
    }

    async fn check_status(resp: Response) -> Result<Response> {
        let status = resp.status();

        if status.is_success() {
            return Ok(resp);
        }

        if status == StatusCode::TOO_MANY_REQUESTS {
            let retry_after = resp
                .headers()
                .get("retry-after")
                .and_then(|v| v.to_str().ok())
                .and_then(|s| s.trim().parse().ok());
            return Err(BrainError::ApiRateLimit { retry_after });
        }

        let body = resp.text().await.unwrap_or_default();

        if status == StatusCode::UNAUTHORIZED || status == StatusCode::FORBIDDEN {
            return Err(BrainError::Auth(body));
        }

        if status.is_server_error() {
            return Err(BrainError::Transient(format!(
                "Embedding server error {status}: {body}"
            )));
        }

        Err(BrainError::Embedding(format!("API error {status}: {body}")))
    }
}
