use std::time::Duration;

use thiserror::Error;

#[derive(Error, Debug)]
pub enum BrainError {
    #[error("Database error: {0}")]
    Database(#[from] libsql::Error),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Validation error: {0}")]
    Validation(String),

    #[error("LLM error: {0}")]
    Llm(String),

    #[error("LLM rate limit exceeded, retry after {retry_after:?} seconds")]
    LlmRateLimit { retry_after: Option<u64> },

    #[error("Embedding error: {0}")]
    Embedding(String),

    #[error("API rate limit exceeded, retry after {retry_after:?} seconds")]
    ApiRateLimit { retry_after: Option<u64> },

    #[error("API authentication error: {0}")]
    Auth(String),

    #[error("Request timed out: {0}")]
    Timeout(String),

    #[error("Transient upstream error: {0}")]
    Transient(String),

    #[error("Malformed API output: {0}")]
    MalformedOutput(String),

    #[error("Content extraction error: {0}")]
    Content(String),

    #[error("HTTP request error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl BrainError {
    /// Whether retrying the same request may succeed.
    ///
    /// Rate limits, timeouts and server-side hiccups are transient. Malformed
    /// output, bad credentials and validation failures are not: sending the
    /// same request again would fail the same way.
    pub fn is_transient(&self) -> bool {
        match self {
            BrainError::LlmRateLimit { .. }
            | BrainError::ApiRateLimit { .. }
            | BrainError::Timeout(_)
            | BrainError::Transient(_) => true,
            BrainError::Http(e) => {
                e.is_timeout()
                    || e.is_connect()
                    || e.status()
                        .map(|s| s.is_server_error() || s.as_u16() == 429)
                        .unwrap_or(false)
            }
            BrainError::Database(e) => is_transient_database_error(e),
            _ => false,
        }
    }

    /// Server-provided wait hint carried by rate-limit errors.
    pub fn retry_after(&self) -> Option<Duration> {
        match self {
            BrainError::LlmRateLimit { retry_after } | BrainError::ApiRateLimit { retry_after } => {
                retry_after.map(Duration::from_secs)
            }
            _ => None,
        }
    }
}

fn is_transient_database_error(error: &libsql::Error) -> bool {
    let message = error.to_string().to_lowercase();
    message.contains("database is locked")
        || message.contains("busy")
        || message.contains("timed out")
        || message.contains("connection")
}

pub type Result<T> = std::result::Result<T, BrainError>;
