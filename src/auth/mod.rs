//! API-key guard for the admin API

use axum::{
    extract::{Request, State},
    http::StatusCode,
    middleware::Next,
    response::{IntoResponse, Response},
    Json,
};
use std::sync::Arc;
use subtle::ConstantTimeEq;
use tracing::{debug, warn};

use crate::api::ErrorResponse;
use crate::config::{AuthConfig, AuthMode};

pub const API_KEY_HEADER: &str = "X-API-Key";

pub struct AuthService {
    enabled: bool,
    api_keys: Vec<String>,
}

impl AuthService {
    pub fn new(config: &AuthConfig) -> Self {
        let enabled = matches!(config.mode, AuthMode::ApiKey);
        let api_keys: Vec<String> = config
            .api_keys
            .iter()
            .map(|k| k.trim().to_string())
            .filter(|k| !k.is_empty())
            .collect();

        if enabled && api_keys.is_empty() {
            warn!("API key authentication enabled without any keys; every request will be rejected");
        }

        Self { enabled, api_keys }
    }

    pub fn disabled() -> Self {
        Self {
            enabled: false,
            api_keys: Vec::new(),
        }
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    pub fn validate_key(&self, key: &str) -> bool {
        if !self.enabled {
            return true;
        }
        // compare against every key so timing does not reveal which one matched
        self.api_keys
            .iter()
            .fold(false, |found, k| found | bool::from(k.as_bytes().ct_eq(key.as_bytes())))
    }
}

pub async fn auth_middleware(
    State(auth): State<Arc<AuthService>>,
    request: Request,
    next: Next,
) -> Response {
    let api_key = request
        .headers()
        .get(API_KEY_HEADER)
        .and_then(|h| h.to_str().ok())
        .unwrap_or("");

    if auth.validate_key(api_key) {
        next.run(request).await
    } else {
        debug!(path = %request.uri().path(), "rejected request with invalid API key");
        (
            StatusCode::UNAUTHORIZED,
            Json(ErrorResponse {
                error: "Invalid or missing API key".to_string(),
            }),
        )
            .into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config(mode: AuthMode, keys: &[&str]) -> AuthConfig {
        AuthConfig {
            mode,
            api_keys: keys.iter().map(|k| k.to_string()).collect(),
        }
    }

    #[test]
    fn test_disabled_accepts_anything() {
        let auth = AuthService::new(&config(AuthMode::None, &["secret"]));
        assert!(auth.validate_key(""));
        assert!(auth.validate_key("nope"));
    }

    #[test]
    fn test_api_key_mode() {
        let auth = AuthService::new(&config(AuthMode::ApiKey, &["first", " second "]));
        assert!(auth.validate_key("first"));
        assert!(auth.validate_key("second"));
        assert!(!auth.validate_key("third"));
        assert!(!auth.validate_key(""));
    }

    #[test]
    fn test_api_key_mode_without_keys_rejects() {
        let auth = AuthService::new(&config(AuthMode::ApiKey, &[]));
        assert!(!auth.validate_key(""));
    }
}
