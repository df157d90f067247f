use std::time::Duration;

use reqwest::{Client, Response, StatusCode};
use serde::Deserialize;
use serde_json::Value;

use async_openai::{
    error::ApiError,
    types::{
        ChatCompletionRequestAssistantMessageArgs, ChatCompletionRequestMessage,
        ChatCompletionRequestSystemMessageArgs, ChatCompletionRequestUserMessageArgs,
        CreateChatCompletionRequest, CreateChatCompletionRequestArgs, CreateChatCompletionResponse,
        Stop,
    },
};

use crate::{
    config::{parse_llm_provider_model, LlmConfig},
    error::{BrainError, Result},
    llm::provider::{CompletionOptions, PriorExchange},
};

const OPENAI_BASE_URL: &str = "https://api.openai.com/v1";
const OPENROUTER_BASE_URL: &str = "https://openrouter.ai/api/v1";
const OLLAMA_BASE_URL: &str = "http://localhost:11434/v1";
const LMSTUDIO_BASE_URL: &str = "http://localhost:1234/v1";
const COHERE_BASE_URL: &str = "https://api.cohere.ai/compatibility/v1";

#[derive(Debug, Clone)]
struct ApiConfig {
    base_url: String,
    api_key: Option<String>,
    model: String,
    timeout_secs: u64,
}

#[derive(Debug, Deserialize)]
struct ErrorEnvelope {
    error: ApiError,
}

/// Chat completions against any OpenAI-compatible endpoint.
///
/// Every call is a single attempt. Failures are classified by HTTP status
/// into the crate error taxonomy so the caller's retry policy decides what
/// happens next.
#[derive(Clone)]
pub struct LlmApiClient {
    http: Client,
    config: ApiConfig,
}

impl LlmApiClient {
    pub fn new(config: &LlmConfig) -> Result<Self> {
        let api_config = ApiConfig::from_llm_config(config);

        let (provider, _) = parse_llm_provider_model(&config.model);
        let needs_api_key = !matches!(
            provider.to_lowercase().as_str(),
            "ollama" | "local" | "lmstudio"
        );

        if needs_api_key && api_config.api_key.is_none() {
            return Err(BrainError::Config(format!(
                "API key required for LLM provider '{provider}'"
            )));
        }

        let http = Client::builder()
            .timeout(Duration::from_secs(api_config.timeout_secs))
            .build()
            .map_err(|error| BrainError::Llm(format!("Failed to create LLM HTTP client: {error}")))?;

        Ok(Self {
            http,
            config: api_config,
        })
    }

    pub fn model(&self) -> &str {
        &self.config.model
    }

    pub async fn complete(
        &self,
        prompt: &str,
        system_prompt: Option<&str>,
        options: Option<&CompletionOptions>,
    ) -> Result<String> {
        self.complete_conversation(system_prompt, &[], prompt, options)
            .await
    }

    /// Complete with earlier question/answer pairs replayed ahead of `prompt`.
    pub async fn complete_conversation(
        &self,
        system_prompt: Option<&str>,
        history: &[PriorExchange],
        prompt: &str,
        options: Option<&CompletionOptions>,
    ) -> Result<String> {
        if prompt.trim().is_empty() {
            return Err(BrainError::Validation("Prompt cannot be empty".to_string()));
        }

        let request = self.build_request(system_prompt, history, prompt, options)?;
        let response = self.send(&request).await?;

        let body = response.bytes().await.map_err(|error| {
            BrainError::Transient(format!("Failed to read LLM response: {error}"))
        })?;
        let completion: CreateChatCompletionResponse =
            serde_json::from_slice(&body).map_err(|error| {
                BrainError::MalformedOutput(format!("Failed to parse LLM response: {error}"))
            })?;

        Self::extract_content(completion)
    }

    /// Complete and parse the reply as JSON. Markdown code fences are stripped
    /// first; anything that still fails to parse is malformed output.
    pub async fn complete_json(
        &self,
        prompt: &str,
        system_prompt: Option<&str>,
        options: Option<&CompletionOptions>,
    ) -> Result<Value> {
        let content = self.complete(prompt, system_prompt, options).await?;
        tracing::debug!(response_len = content.len(), "LLM JSON response received");

        parse_json_reply(&content)
    }

    async fn send(&self, request: &CreateChatCompletionRequest) -> Result<Response> {
        let url = format!(
            "{}/chat/completions",
            self.config.base_url.trim_end_matches('/')
        );
        let mut builder = self.http.post(url).json(request);
        if let Some(api_key) = self.config.api_key.as_deref().filter(|key| !key.is_empty()) {
            builder = builder.bearer_auth(api_key);
        }

        let response = builder.send().await.map_err(|error| {
            if error.is_timeout() {
                BrainError::Timeout(format!("LLM request timed out: {error}"))
            } else {
                BrainError::Transient(format!("LLM request failed: {error}"))
            }
        })?;

        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }

        let retry_after = response
            .headers()
            .get("retry-after")
            .and_then(|value| value.to_str().ok())
            .and_then(|value| value.trim().parse().ok());
        let body = response.text().await.unwrap_or_default();

        Err(Self::classify_status(status, retry_after, &body))
    }

    fn build_request(
        &self,
        system_prompt: Option<&str>,
        history: &[PriorExchange],
        prompt: &str,
        options: Option<&CompletionOptions>,
    ) -> Result<CreateChatCompletionRequest> {
        let mut messages: Vec<ChatCompletionRequestMessage> = Vec::new();

        if let Some(system_prompt) = system_prompt.filter(|value| !value.trim().is_empty()) {
            messages.push(
                ChatCompletionRequestSystemMessageArgs::default()
                    .content(system_prompt)
                    .build()
                    .map_err(|error| {
                        BrainError::Validation(format!("Invalid system prompt: {error}"))
                    })?
                    .into(),
            );
        }

        for exchange in history {
            messages.push(
                ChatCompletionRequestUserMessageArgs::default()
                    .content(exchange.question.as_str())
                    .build()
                    .map_err(|error| BrainError::Validation(format!("Invalid history: {error}")))?
                    .into(),
            );
            messages.push(
                ChatCompletionRequestAssistantMessageArgs::default()
                    .content(exchange.answer.as_str())
                    .build()
                    .map_err(|error| BrainError::Validation(format!("Invalid history: {error}")))?
                    .into(),
            );
        }

        messages.push(
            ChatCompletionRequestUserMessageArgs::default()
                .content(prompt)
                .build()
                .map_err(|error| BrainError::Validation(format!("Invalid user prompt: {error}")))?
                .into(),
        );

        let mut request = CreateChatCompletionRequestArgs::default();
        request.model(self.config.model.clone()).messages(messages);
        Self::apply_completion_options(&mut request, options);

        request.build().map_err(|error| {
            BrainError::Validation(format!("Invalid LLM completion request: {error}"))
        })
    }

    fn apply_completion_options(
        request: &mut CreateChatCompletionRequestArgs,
        options: Option<&CompletionOptions>,
    ) {
        let Some(options) = options else {
            return;
        };

        if let Some(temperature) = options.temperature {
            request.temperature(temperature);
        }

        if let Some(max_tokens) = options.max_tokens {
            request.max_completion_tokens(max_tokens);
        }

        if let Some(stop) = options.stop.as_ref().filter(|values| !values.is_empty()) {
            request.stop(Stop::StringArray(stop.clone()));
        }
    }

    fn extract_content(response: CreateChatCompletionResponse) -> Result<String> {
        let message = response
            .choices
            .into_iter()
            .next()
            .ok_or_else(|| {
                BrainError::MalformedOutput("LLM response contained no choices".to_string())
            })?
            .message
            .content
            .unwrap_or_default();

        if message.trim().is_empty() {
            return Err(BrainError::MalformedOutput(
                "LLM response contained empty content".to_string(),
            ));
        }

        Ok(message)
    }

    /// Only rate limits, timeouts and 5xx answers are transient. Any other
    /// 4xx is permanent: the same request would fail the same way.
    fn classify_status(status: StatusCode, retry_after: Option<u64>, body: &str) -> BrainError {
        let api_error = serde_json::from_str::<ErrorEnvelope>(body)
            .ok()
            .map(|envelope| envelope.error);
        let detail = match &api_error {
            Some(api_error) => api_error.to_string(),
            None => body.trim().chars().take(200).collect(),
        };

        if status == StatusCode::TOO_MANY_REQUESTS {
            let out_of_quota = api_error
                .as_ref()
                .and_then(|api_error| api_error.r#type.as_deref())
                == Some("insufficient_quota");
            if !out_of_quota {
                return BrainError::LlmRateLimit { retry_after };
            }
        }

        if status == StatusCode::UNAUTHORIZED
            || status == StatusCode::FORBIDDEN
            || api_error.as_ref().is_some_and(Self::is_auth_api_error)
        {
            return BrainError::Auth(format!("LLM authentication failed: {detail}"));
        }

        if status == StatusCode::REQUEST_TIMEOUT {
            return BrainError::Timeout(format!("LLM request timed out: {detail}"));
        }

        if status.is_server_error() {
            return BrainError::Transient(format!("LLM server error {status}: {detail}"));
        }

        BrainError::Llm(format!("LLM API error {status}: {detail}"))
    }

    fn is_auth_api_error(api_error: &ApiError) -> bool {
        let error_type = api_error.r#type.clone().unwrap_or_default().to_lowercase();
        let code = api_error.code.clone().unwrap_or_default().to_lowercase();

        code.contains("invalid_api_key")
            || code.contains("authentication")
            || error_type.contains("authentication")
    }
}

/// Parse a model reply as JSON, tolerating ```json fences around it.
pub fn parse_json_reply(content: &str) -> Result<Value> {
    let cleaned = strip_code_fences(content);

    serde_json::from_str(cleaned).map_err(|e| {
        tracing::warn!(
            response_len = content.len(),
            response_preview = %content.chars().take(100).collect::<String>(),
            error = %e,
            "Failed to parse JSON response"
        );
        BrainError::MalformedOutput(format!("Failed to parse JSON response: {e}"))
    })
}

fn strip_code_fences(content: &str) -> &str {
    let trimmed = content.trim();
    let Some(rest) = trimmed.strip_prefix("```") else {
        return trimmed;
    };
    let rest = rest
        .strip_prefix("json")
        .or_else(|| rest.strip_prefix("JSON"))
        .unwrap_or(rest);
    rest.strip_suffix("```").unwrap_or(rest).trim()
}

impl ApiConfig {
    fn from_llm_config(config: &LlmConfig) -> Self {
        let (provider, model) = parse_llm_provider_model(&config.model);

        let base_url = config
            .base_url
            .clone()
            .unwrap_or_else(|| default_base_url(provider).to_string());

        let normalized_model = if provider.eq_ignore_ascii_case("local") {
            config.model.clone()
        } else {
            model.to_string()
        };

        Self {
            base_url,
            api_key: config.api_key.clone(),
            model: normalized_model,
            timeout_secs: config.timeout_secs,
        }
    }
}

fn default_base_url(provider: &str) -> &'static str {
    match provider.to_lowercase().as_str() {
        "openai" => OPENAI_BASE_URL,
        "openrouter" => OPENROUTER_BASE_URL,
        "ollama" => OLLAMA_BASE_URL,
        "lmstudio" => LMSTUDIO_BASE_URL,
        "cohere" => COHERE_BASE_URL,
        _ => OPENAI_BASE_URL,
    }
}
