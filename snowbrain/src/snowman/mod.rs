mod agent;
mod conversation;

pub use agent::SnowmanAgent;
pub use conversation::Conversation;
