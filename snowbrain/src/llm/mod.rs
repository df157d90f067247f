mod api;
pub mod prompts;
mod provider;

pub use api::{parse_json_reply, LlmApiClient};
pub use provider::{CompletionOptions, LlmBackend, LlmProvider, PriorExchange};
