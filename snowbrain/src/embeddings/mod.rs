mod api;
mod provider;


pub use api::{ApiConfig, EmbeddingApiClient, WireFormat};
pub use provider::EmbeddingProvider;
