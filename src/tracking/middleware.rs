use axum::{
    body::Body,
    extract::{ConnectInfo, State},
    http::{header, Request},
    middleware::Next,
    response::Response,
};
use chrono::Utc;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Instant;

use super::handlers::TrackingState;
use crate::analytics::{extract_client_ip, VisitEvent};

/// Optional client-supplied session id on tracked requests
pub const SESSION_HEADER: &str = "x-session-id";

fn header_value(request: &Request<Body>, name: impl header::AsHeaderName) -> Option<String> {
    request
        .headers()
        .get(name)
        .and_then(|v| v.to_str().ok())
        .filter(|v| !v.is_empty())
        .map(str::to_string)
}

/// Classify the User-Agent of every request and log the ones naming a known bot.
///
/// The wrapped handler runs first; the visit is handed to the logger with the
/// measured server response time and the response is returned without
/// waiting for storage.
pub async fn track_bots(
    State(state): State<Arc<TrackingState>>,
    request: Request<Body>,
    next: Next,
) -> Response {
    let user_agent = header_value(&request, header::USER_AGENT);
    let classification = state.classifier.classify(user_agent.as_deref());

    let Some(bot_name) = classification.bot_name else {
        return next.run(request).await;
    };

    let socket_ip = request
        .extensions()
        .get::<ConnectInfo<SocketAddr>>()
        .map(|ConnectInfo(addr)| addr.ip());
    let client_ip = extract_client_ip(request.headers(), socket_ip, &state.config);

    let url = request
        .uri()
        .path_and_query()
        .map(|pq| pq.as_str().to_string())
        .unwrap_or_else(|| "/".to_string());

    let mut event = VisitEvent {
        url,
        bot_name,
        user_agent: user_agent.unwrap_or_default(),
        client_ip,
        timestamp: Utc::now().timestamp_millis(),
        referrer: header_value(&request, header::REFERER),
        session_id: header_value(&request, SESSION_HEADER),
        ..Default::default()
    };

    let started = Instant::now();
    let response = next.run(request).await;
    event.server_response_time = Some(started.elapsed().as_secs_f64());

    state.logger.record(event);
    response
}
