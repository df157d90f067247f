use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::PersonaProfile;

/// A shopping question generated for a persona, embedded but not yet stored.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NewGiftQuery {
    pub persona_id: i64,
    pub text: String,
    pub context: String,
    pub embedding: Vec<f32>,
}

impl NewGiftQuery {
    pub fn context_for(profile: &PersonaProfile) -> String {
        format!(
            "Persona: {}, Budget: {}",
            profile.name, profile.budget_range
        )
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GiftQuery {
    pub id: i64,
    pub persona_id: i64,
    pub text: String,
    pub context: String,
    pub embedding: Vec<f32>,
    pub created_at: DateTime<Utc>,
}

impl GiftQuery {
    pub fn new(id: i64, query: NewGiftQuery) -> Self {
        Self {
            id,
            persona_id: query.persona_id,
            text: query.text,
            context: query.context,
            embedding: query.embedding,
            created_at: Utc::now(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NewSnowmanResponse {
    pub persona_id: i64,
    pub query_id: i64,
    pub query: String,
    pub response: String,
    pub response_time_secs: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SnowmanResponse {
    pub id: i64,
    pub persona_id: i64,
    pub query_id: i64,
    pub query: String,
    pub response: String,
    pub response_time_secs: f64,
    pub created_at: DateTime<Utc>,
}

impl SnowmanResponse {
    pub fn new(id: i64, response: NewSnowmanResponse) -> Self {
        Self {
            id,
            persona_id: response.persona_id,
            query_id: response.query_id,
            query: response.query,
            response: response.response,
            response_time_secs: response.response_time_secs,
            created_at: Utc::now(),
        }
    }
}

/// Nearest-neighbour hit over stored gift queries.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GiftQueryHit {
    pub query_id: i64,
    pub persona_id: i64,
    pub text: String,
    pub score: f32,
}

/// Clean up a generated question: models like to wrap it in quotes.
pub fn clean_query_text(raw: &str) -> String {
    raw.trim()
        .trim_matches(|c| c == '"' || c == '\'' || c == '“' || c == '”')
        .trim()
        .to_string()
}
