use serde::{Deserialize, Serialize};
use sqlx::FromRow;

/// Stored outcome of asking a language model about a brand
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, FromRow)]
pub struct MentionRecord {
    pub id: i64,
    pub brand: String,
    pub model: String,
    pub prompt: String,
    pub response: String,
    pub mentioned: bool,
    pub score: i64,
    pub summary: Option<String>,
    pub source_url: Option<String>,
    /// Unix timestamp in milliseconds
    pub created_at: i64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NewMention {
    pub brand: String,
    pub model: String,
    pub prompt: String,
    pub response: String,
    pub mentioned: bool,
    pub score: i64,
    pub summary: Option<String>,
    pub source_url: Option<String>,
    pub created_at: i64,
}
