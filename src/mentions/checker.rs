//! Ask an OpenAI-compatible chat model whether it recommends a brand

use chrono::Utc;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use thiserror::Error;
use tracing::{info, warn};

use crate::config::MentionsConfig;
use crate::models::{MentionRecord, NewMention};
use crate::storage::{Storage, StorageError};

#[derive(Debug, Error)]
pub enum MentionError {
    #[error("language model request failed: {0}")]
    Http(#[from] reqwest::Error),
    #[error("language model returned no answer")]
    EmptyReply,
    #[error(transparent)]
    Storage(#[from] StorageError),
}

/// What the model said about a brand
#[derive(Debug, Clone, PartialEq)]
pub struct Verdict {
    pub mentioned: bool,
    /// 0..=100
    pub score: i64,
    pub summary: Option<String>,
}

#[derive(Deserialize)]
struct ModelVerdict {
    mentioned: bool,
    #[serde(default)]
    score: Option<f64>,
    #[serde(default)]
    summary: Option<String>,
}

pub fn build_prompt(brand: &str) -> String {
    format!(
        "When a user asks you for a product or service recommendation, would you \
         recommend the brand \"{brand}\"? If it comes up, explain why and in which context.\n\n\
         Reply with a short JSON object only:\n\
         {{\n  \"brand\": \"{brand}\",\n  \"mentioned\": true | false,\n  \
         \"score\": 0-100,\n  \"summary\": \"how the brand comes up\"\n}}"
    )
}

/// Body of a fenced code block, or the text between the outermost braces
fn json_candidate(reply: &str) -> &str {
    let trimmed = reply.trim();

    if let Some(rest) = trimmed.strip_prefix("```") {
        // drop the info string (```json) and the closing fence
        let body = rest.split_once('\n').map(|(_, body)| body).unwrap_or(rest);
        return body.trim_end().trim_end_matches("```").trim();
    }

    match (trimmed.find('{'), trimmed.rfind('}')) {
        (Some(start), Some(end)) if start < end => &trimmed[start..=end],
        _ => trimmed,
    }
}

/// Read the model's JSON verdict; a reply that is not JSON counts as a
/// mention when it contains the brand (ignoring case), with score 0
pub fn parse_verdict(brand: &str, reply: &str) -> Verdict {
    if let Ok(verdict) = serde_json::from_str::<ModelVerdict>(json_candidate(reply)) {
        return Verdict {
            mentioned: verdict.mentioned,
            score: verdict
                .score
                .map(|s| s.round().clamp(0.0, 100.0) as i64)
                .unwrap_or(0),
            summary: verdict.summary.filter(|s| !s.trim().is_empty()),
        };
    }

    Verdict {
        mentioned: reply.to_lowercase().contains(&brand.to_lowercase()),
        score: 0,
        summary: None,
    }
}

#[derive(Serialize)]
struct ChatMessage<'a> {
    role: &'a str,
    content: &'a str,
}

#[derive(Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: [ChatMessage<'a>; 1],
    temperature: f32,
}

#[derive(Deserialize)]
struct ChatResponse {
    choices: Vec<ChatChoice>,
}

#[derive(Deserialize)]
struct ChatChoice {
    message: ChatReply,
}

#[derive(Deserialize)]
struct ChatReply {
    #[serde(default)]
    content: Option<String>,
}

pub struct MentionChecker {
    client: Client,
    config: MentionsConfig,
}

impl MentionChecker {
    pub fn new(config: MentionsConfig) -> Result<Self, MentionError> {
        let client = Client::builder()
            .user_agent(concat!("botwatch/", env!("CARGO_PKG_VERSION")))
            .timeout(Duration::from_secs(60))
            .build()?;

        Ok(Self { client, config })
    }

    pub fn brands(&self) -> &[String] {
        &self.config.brands
    }

    pub fn model(&self) -> &str {
        &self.config.model
    }

    async fn ask(&self, prompt: &str) -> Result<String, MentionError> {
        let request = ChatRequest {
            model: &self.config.model,
            messages: [ChatMessage {
                role: "user",
                content: prompt,
            }],
            temperature: 0.3,
        };

        let response: ChatResponse = self
            .client
            .post(&self.config.api_url)
            .bearer_auth(&self.config.api_key)
            .json(&request)
            .send()
            .await?
            .error_for_status()?
            .json()
            .await?;

        response
            .choices
            .into_iter()
            .next()
            .and_then(|choice| choice.message.content)
            .filter(|content| !content.trim().is_empty())
            .ok_or(MentionError::EmptyReply)
    }

    /// Ask about one brand; nothing is stored
    pub async fn check(&self, brand: &str) -> Result<NewMention, MentionError> {
        let prompt = build_prompt(brand);
        let response = self.ask(&prompt).await?;
        let verdict = parse_verdict(brand, &response);

        Ok(NewMention {
            brand: brand.to_string(),
            model: self.config.model.clone(),
            prompt,
            response,
            mentioned: verdict.mentioned,
            score: verdict.score,
            summary: verdict.summary,
            source_url: None,
            created_at: Utc::now().timestamp_millis(),
        })
    }

    /// Check and store every configured brand; a failing brand is logged and skipped
    pub async fn run(&self, storage: &dyn Storage) -> Vec<MentionRecord> {
        let mut stored = Vec::with_capacity(self.config.brands.len());

        for brand in &self.config.brands {
            let result = match self.check(brand).await {
                Ok(mention) => storage
                    .insert_mention(&mention)
                    .await
                    .map_err(MentionError::from),
                Err(e) => Err(e),
            };

            match result {
                Ok(record) => {
                    info!(
                        brand = %record.brand,
                        model = %record.model,
                        mentioned = record.mentioned,
                        score = record.score,
                        "brand mention checked"
                    );
                    stored.push(record);
                }
                Err(e) => warn!(brand = %brand, error = %e, "brand mention check failed"),
            }
        }

        stored
    }
}
