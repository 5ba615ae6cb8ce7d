use axum::{
    extract::State,
    http::{header::HeaderMap, header::USER_AGENT, StatusCode},
    response::IntoResponse,
    Json,
};
use chrono::Utc;
use rand::distr::Alphanumeric;
use rand::Rng;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::warn;

use crate::analytics::VisitLogger;
use crate::config::TrackingConfig;
use crate::detection::Classifier;
use crate::models::NewUserVisit;
use crate::storage::Storage;

pub struct TrackingState {
    pub classifier: Classifier,
    pub logger: Arc<VisitLogger>,
    pub storage: Arc<dyn Storage>,
    pub config: TrackingConfig,
}

/// Page view reported by the visit widget
#[derive(Debug, Deserialize)]
pub struct TrackVisitRequest {
    pub url: String,
    #[serde(default)]
    pub referrer: Option<String>,
    #[serde(default)]
    pub user_agent: Option<String>,
    #[serde(default)]
    pub session_id: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct TrackVisitResponse {
    pub session_id: String,
}

pub fn generate_session_id() -> String {
    rand::rng()
        .sample_iter(&Alphanumeric)
        .take(12)
        .map(char::from)
        .map(|c| c.to_ascii_lowercase())
        .collect()
}

/// Log one widget page view for every visitor, bot or not.
///
/// Answers 202 before the row is written; a failed write is only logged.
pub async fn track_visit(
    State(state): State<Arc<TrackingState>>,
    headers: HeaderMap,
    Json(payload): Json<TrackVisitRequest>,
) -> impl IntoResponse {
    let session_id = payload
        .session_id
        .filter(|s| !s.trim().is_empty())
        .unwrap_or_else(generate_session_id);

    let user_agent = payload.user_agent.or_else(|| {
        headers
            .get(USER_AGENT)
            .and_then(|v| v.to_str().ok())
            .map(str::to_string)
    });

    let visit = NewUserVisit {
        url: payload.url,
        referrer: payload.referrer.filter(|r| !r.is_empty()),
        user_agent,
        session_id: session_id.clone(),
        timestamp: Utc::now().timestamp_millis(),
    };

    let storage = Arc::clone(&state.storage);
    tokio::spawn(async move {
        if let Err(e) = storage.insert_user_visit(&visit).await {
            warn!(error = %e, url = %visit.url, "failed to log user visit");
        }
    });

    (
        StatusCode::ACCEPTED,
        Json(TrackVisitResponse { session_id }),
    )
}

/// Health check endpoint
pub async fn health_check() -> impl IntoResponse {
    #[derive(Serialize)]
    struct HealthResponse {
        status: String,
    }

    Json(HealthResponse {
        status: "OK".to_string(),
    })
}

/// Fallback for tracked paths when no site directory is configured
pub async fn placeholder_page() -> impl IntoResponse {
    (StatusCode::OK, "ok")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_generated_session_ids() {
        let a = generate_session_id();
        let b = generate_session_id();
        assert_eq!(a.len(), 12);
        assert!(a.chars().all(|c| c.is_ascii_lowercase() || c.is_ascii_digit()));
        assert_ne!(a, b);
    }
}
