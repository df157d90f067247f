pub mod config;
pub mod db;
pub mod embeddings;
pub mod error;
pub mod llm;
pub mod models;
pub mod pipeline;
pub mod snowman;
pub mod web;

use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

/// Filter used when `RUST_LOG` is unset: `LOG_LEVEL` scoped to this crate.
pub fn default_log_filter() -> String {
    match std::env::var("LOG_LEVEL") {
        Ok(level) if !level.trim().is_empty() => {
            format!("snowbrain={}", level.trim().to_lowercase())
        }
        _ => "snowbrain=info".to_string(),
    }
}

/// Install the global subscriber. Output goes to stderr so it never mixes
/// with answers printed on stdout.
pub fn init_tracing() {
    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| default_log_filter().into()))
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();
}
