use serde::Deserialize;
use std::env;

use crate::error::{BrainError, Result};

fn parse_env_or<T: std::str::FromStr>(var: &str, default: T) -> T
where
    T::Err: std::fmt::Display,
{
    match env::var(var) {
        Ok(val) => match val.parse() {
            Ok(parsed) => parsed,
            Err(e) => {
                tracing::warn!("Invalid value '{}' for {}: {}. Using default.", val, var, e);
                default
            }
        },
        Err(_) => default,
    }
}

fn parse_env_opt<T: std::str::FromStr>(var: &str) -> Option<T>
where
    T::Err: std::fmt::Display,
{
    match env::var(var) {
        Ok(val) => match val.parse() {
            Ok(parsed) => Some(parsed),
            Err(e) => {
                tracing::warn!("Invalid value '{}' for {}: {}. Ignoring.", val, var, e);
                None
            }
        },
        Err(_) => None,
    }
}

/// Resolve an API key: the explicit variable wins, then the provider's
/// conventional variable (`OPENAI_API_KEY`, `COHERE_API_KEY`, ...).
fn api_key_for(explicit_var: &str, provider: &str) -> Option<String> {
    env::var(explicit_var)
        .ok()
        .filter(|key| !key.trim().is_empty())
        .or_else(|| {
            let fallback = format!("{}_API_KEY", provider.to_uppercase());
            env::var(fallback).ok().filter(|key| !key.trim().is_empty())
        })
}

#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    pub database: DatabaseConfig,
    pub llm: LlmConfig,
    pub embeddings: EmbeddingsConfig,
    pub brain: BrainConfig,
    pub content: ContentConfig,
    pub snowman: SnowmanConfig,
}

#[derive(Debug, Clone, Deserialize)]
pub struct DatabaseConfig {
    pub url: String,
    pub auth_token: Option<String>,
    pub local_path: Option<String>,
    pub busy_timeout_ms: u64,
    pub journal_mode: String,
    pub synchronous: String,
}

/// LLM configuration for chat/completion models
#[derive(Debug, Clone, Deserialize)]
pub struct LlmConfig {
    pub model: String,
    pub api_key: Option<String>,
    pub base_url: Option<String>,
    pub timeout_secs: u64,
    pub temperature: Option<f32>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct EmbeddingsConfig {
    pub model: String,
    pub api_key: Option<String>,
    pub base_url: Option<String>,
    pub dimensions: usize,
    pub timeout_secs: u64,
}

/// Batch sizes, concurrency ceilings and retry knobs for the build pipeline.
#[derive(Debug, Clone, Deserialize)]
pub struct BrainConfig {
    pub num_personas: usize,
    pub queries_per_persona: usize,
    pub max_concurrent_personas: usize,
    pub max_concurrent_queries: usize,
    pub max_concurrent_responses: usize,
    pub retry_max_attempts: u32,
    pub retry_base_delay_ms: u64,
    pub retry_max_delay_ms: u64,
    pub write_batch_size: usize,
    pub write_max_attempts: u32,
    pub show_progress: bool,
}

/// pure.md content extraction settings
#[derive(Debug, Clone, Deserialize)]
pub struct ContentConfig {
    pub base_url: String,
    pub api_key: Option<String>,
    pub timeout_secs: u64,
    pub max_parallel: usize,
    pub max_chars_per_result: usize,
    pub cache_ttl_secs: u64,
    pub cache_size: usize,
}

#[derive(Debug, Clone, Deserialize)]
pub struct SnowmanConfig {
    pub web_search: bool,
    pub history_runs: usize,
}

impl Default for BrainConfig {
    fn default() -> Self {
        Self {
            num_personas: 2,
            queries_per_persona: 2,
            max_concurrent_personas: 10,
            max_concurrent_queries: 5,
            max_concurrent_responses: 3,
            retry_max_attempts: 4,
            retry_base_delay_ms: 500,
            retry_max_delay_ms: 30_000,
            write_batch_size: 50,
            write_max_attempts: 3,
            show_progress: true,
        }
    }
}

impl Default for ContentConfig {
    fn default() -> Self {
        Self {
            base_url: "https://pure.md".to_string(),
            api_key: None,
            timeout_secs: 5,
            max_parallel: 5,
            max_chars_per_result: 4000,
            cache_ttl_secs: 3600,
            cache_size: 512,
        }
    }
}

impl Default for SnowmanConfig {
    fn default() -> Self {
        Self {
            web_search: true,
            history_runs: 5,
        }
    }
}

impl Default for Config {
    fn default() -> Self {
        let brain_defaults = BrainConfig::default();
        let content_defaults = ContentConfig::default();
        let snowman_defaults = SnowmanConfig::default();

        let llm_model = env::var("LLM_MODEL").unwrap_or_else(|_| "openai/gpt-5-nano".to_string());
        let (llm_provider, _) = parse_llm_provider_model(&llm_model);
        let llm_api_key = api_key_for("LLM_API_KEY", llm_provider);

        let embedding_model =
            env::var("EMBEDDING_MODEL").unwrap_or_else(|_| "cohere/embed-v4.0".to_string());
        let (embedding_provider, _) = parse_provider_model(&embedding_model);
        let embedding_api_key = api_key_for("EMBEDDING_API_KEY", embedding_provider);

        Self {
            database: DatabaseConfig {
                url: env::var("DATABASE_URL").unwrap_or_else(|_| "file:snowbrain.db".to_string()),
                auth_token: env::var("DATABASE_AUTH_TOKEN").ok(),
                local_path: env::var("DATABASE_LOCAL_PATH").ok(),
                busy_timeout_ms: parse_env_or("DATABASE_BUSY_TIMEOUT_MS", 5000),
                journal_mode: env::var("DATABASE_JOURNAL_MODE")
                    .unwrap_or_else(|_| "WAL".to_string()),
                synchronous: env::var("DATABASE_SYNCHRONOUS")
                    .unwrap_or_else(|_| "NORMAL".to_string()),
            },
            llm: LlmConfig {
                model: llm_model,
                api_key: llm_api_key,
                base_url: env::var("LLM_BASE_URL").ok(),
                timeout_secs: parse_env_or("LLM_TIMEOUT", 60),
                temperature: parse_env_opt("LLM_TEMPERATURE"),
            },
            embeddings: EmbeddingsConfig {
                model: embedding_model,
                api_key: embedding_api_key,
                base_url: env::var("EMBEDDING_BASE_URL").ok(),
                dimensions: parse_env_or("EMBEDDING_DIMENSIONS", 1536),
                timeout_secs: parse_env_or("EMBEDDING_TIMEOUT", 30),
            },
            brain: BrainConfig {
                num_personas: parse_env_or("NUM_PERSONAS", brain_defaults.num_personas),
                queries_per_persona: parse_env_or(
                    "QUERIES_PER_PERSONA",
                    brain_defaults.queries_per_persona,
                ),
                max_concurrent_personas: parse_env_or(
                    "MAX_CONCURRENT_PERSONAS",
                    brain_defaults.max_concurrent_personas,
                ),
                max_concurrent_queries: parse_env_or(
                    "MAX_CONCURRENT_QUERIES",
                    brain_defaults.max_concurrent_queries,
                ),
                max_concurrent_responses: parse_env_or(
                    "MAX_CONCURRENT_RESPONSES",
                    brain_defaults.max_concurrent_responses,
                ),
                retry_max_attempts: parse_env_or(
                    "RETRY_MAX_ATTEMPTS",
                    brain_defaults.retry_max_attempts,
                ),
                retry_base_delay_ms: parse_env_or(
                    "RETRY_BASE_DELAY_MS",
                    brain_defaults.retry_base_delay_ms,
                ),
                retry_max_delay_ms: parse_env_or(
                    "RETRY_MAX_DELAY_MS",
                    brain_defaults.retry_max_delay_ms,
                ),
                write_batch_size: parse_env_or("WRITE_BATCH_SIZE", brain_defaults.write_batch_size),
                write_max_attempts: parse_env_or(
                    "WRITE_MAX_ATTEMPTS",
                    brain_defaults.write_max_attempts,
                ),
                show_progress: parse_env_or("SHOW_PROGRESS", brain_defaults.show_progress),
            },
            content: ContentConfig {
                base_url: env::var("PUREMD_API_URL").unwrap_or(content_defaults.base_url),
                api_key: env::var("PUREMD_API_KEY").ok().filter(|k| !k.is_empty()),
                timeout_secs: parse_env_or("PUREMD_TIMEOUT", content_defaults.timeout_secs),
                max_parallel: parse_env_or("PUREMD_MAX_PARALLEL", content_defaults.max_parallel),
                max_chars_per_result: parse_env_or(
                    "PUREMD_MAX_CHARS",
                    content_defaults.max_chars_per_result,
                ),
                cache_ttl_secs: parse_env_or("PUREMD_CACHE_TTL", content_defaults.cache_ttl_secs),
                cache_size: parse_env_or("PUREMD_CACHE_SIZE", content_defaults.cache_size),
            },
            snowman: SnowmanConfig {
                web_search: parse_env_or("SNOWMAN_WEB_SEARCH", snowman_defaults.web_search),
                history_runs: parse_env_or("SNOWMAN_HISTORY_RUNS", snowman_defaults.history_runs),
            },
        }
    }
}

impl Config {
    pub fn from_env() -> Self {
        Self::default()
    }

    /// Reject configurations that cannot run. Called once at startup, before
    /// any connection is opened.
    pub fn validate(&self) -> Result<()> {
        self.brain.validate()?;

        if self.embeddings.dimensions == 0 {
            return Err(BrainError::Config(
                "EMBEDDING_DIMENSIONS must be greater than zero".to_string(),
            ));
        }

        let (llm_provider, _) = parse_llm_provider_model(&self.llm.model);
        if provider_needs_api_key(llm_provider) && self.llm.api_key.is_none() {
            return Err(BrainError::Config(format!(
                "LLM provider '{llm_provider}' requires LLM_API_KEY or {}_API_KEY",
                llm_provider.to_uppercase()
            )));
        }

        let (embedding_provider, _) = parse_provider_model(&self.embeddings.model);
        if provider_needs_api_key(embedding_provider) && self.embeddings.api_key.is_none() {
            return Err(BrainError::Config(format!(
                "Embedding provider '{embedding_provider}' requires EMBEDDING_API_KEY or {}_API_KEY",
                embedding_provider.to_uppercase()
            )));
        }

        if self.content.max_parallel == 0 {
            return Err(BrainError::Config(
                "PUREMD_MAX_PARALLEL must be greater than zero".to_string(),
            ));
        }

        Ok(())
    }
}

impl BrainConfig {
    pub fn validate(&self) -> Result<()> {
        let ceilings = [
            ("MAX_CONCURRENT_PERSONAS", self.max_concurrent_personas),
            ("MAX_CONCURRENT_QUERIES", self.max_concurrent_queries),
            ("MAX_CONCURRENT_RESPONSES", self.max_concurrent_responses),
            ("WRITE_BATCH_SIZE", self.write_batch_size),
        ];
        for (name, value) in ceilings {
            if value == 0 {
                return Err(BrainError::Config(format!(
                    "{name} must be greater than zero"
                )));
            }
        }

        if self.retry_max_attempts == 0 || self.write_max_attempts == 0 {
            return Err(BrainError::Config(
                "RETRY_MAX_ATTEMPTS and WRITE_MAX_ATTEMPTS must be at least 1".to_string(),
            ));
        }

        if self
            .num_personas
            .checked_mul(self.queries_per_persona)
            .is_none()
        {
            return Err(BrainError::Config(format!(
                "NUM_PERSONAS ({}) times QUERIES_PER_PERSONA ({}) is too large",
                self.num_personas, self.queries_per_persona
            )));
        }

        Ok(())
    }

    pub fn total_queries(&self) -> usize {
        self.num_personas.saturating_mul(self.queries_per_persona)
    }
}

fn provider_needs_api_key(provider: &str) -> bool {
    !matches!(
        provider.to_lowercase().as_str(),
        "ollama" | "lmstudio" | "local"
    )
}

/// Known embedding providers
const KNOWN_PROVIDERS: &[&str] = &["openai", "openrouter", "ollama", "lmstudio", "cohere"];

/// Known LLM providers that use OpenAI-compatible APIs
pub const KNOWN_LLM_PROVIDERS: &[&str] = &["openai", "openrouter", "ollama", "lmstudio", "cohere"];

/// Parse an embedding model name into (provider, model) tuple.
///
/// Names without a known provider prefix are sent to an OpenAI-compatible
/// endpoint as-is.
pub fn parse_provider_model(model: &str) -> (&str, &str) {
    if let Some((prefix, rest)) = model.split_once('/') {
        let prefix_lower = prefix.to_lowercase();
        if KNOWN_PROVIDERS.contains(&prefix_lower.as_str()) {
            return (prefix, rest);
        }
    }
    ("openai", model)
}

/// Parse an LLM model name into (provider, model) tuple.
pub fn parse_llm_provider_model(model: &str) -> (&str, &str) {
    if let Some((prefix, rest)) = model.split_once('/') {
        let prefix_lower = prefix.to_lowercase();
        if KNOWN_LLM_PROVIDERS.contains(&prefix_lower.as_str()) {
            return (prefix, rest);
        }
    }
    // Default to treating the whole string as a local model
    ("local", model)
}
