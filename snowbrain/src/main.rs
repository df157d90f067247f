use std::sync::Arc;

use clap::Parser;

use snowbrain::config::Config;
use snowbrain::db::{BrainStore, Database, LibSqlBackend};
use snowbrain::embeddings::EmbeddingProvider;
use snowbrain::llm::LlmProvider;
use snowbrain::pipeline::{BrainBuilder, BrainGenerator, LlmBrainGenerator};
use snowbrain::snowman::SnowmanAgent;
use snowbrain::web::ContentClient;

#[derive(Parser)]
#[command(name = "build-brain")]
#[command(version)]
#[command(
    about = "Generate personas, gift queries and Snowman answers, and store them with embeddings"
)]
struct Args {}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let _args = Args::parse();

    dotenvy::dotenv().ok();
    snowbrain::init_tracing();

    let config = Config::from_env();
    config.validate()?;

    tracing::info!("Initializing database...");
    let db = Database::new(&config.database).await?;
    let store: Arc<dyn BrainStore> = Arc::new(LibSqlBackend::new(db));

    tracing::info!("Initializing LLM provider: {}...", config.llm.model);
    let llm = LlmProvider::new(&config.llm)?;

    tracing::info!("Initializing embedding provider: {}...", config.embeddings.model);
    let embeddings = EmbeddingProvider::new(&config.embeddings)?;
    let dimensions = embeddings.dimensions();

    let content = if config.snowman.web_search {
        Some(ContentClient::new(&config.content)?)
    } else {
        tracing::info!("Web search disabled, responses use the model alone");
        None
    };

    let agent = SnowmanAgent::new(llm.clone(), content);
    let generator: Arc<dyn BrainGenerator> =
        Arc::new(LlmBrainGenerator::new(llm, embeddings, agent));

    let builder = BrainBuilder::new(config.brain.clone(), dimensions, generator, store.clone());
    let summary = builder.run().await?;
    summary.log();

    match store.integrity_violations().await {
        Ok(0) => tracing::info!("Referential check passed"),
        Ok(violations) => tracing::warn!(violations, "Rows with dangling references found"),
        Err(e) => tracing::warn!(error = %e, "Referential check failed to run"),
    }

    if !summary.is_complete() {
        tracing::warn!(
            failures = summary.total_failures(),
            "Run finished with fewer rows than requested"
        );
    }

    Ok(())
}
