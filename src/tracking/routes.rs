use axum::{
    middleware,
    routing::{get, post},
    Router,
};
use std::sync::Arc;
use tower_http::cors::{Any, CorsLayer};
use tower_http::services::ServeDir;

use super::handlers::{health_check, placeholder_page, track_visit, TrackingState};
use super::middleware::track_bots;

/// Router of the tracked site.
///
/// Every route except the health check passes through the bot tracking
/// middleware. Pages come from `site_dir` when given.
pub fn create_tracking_router(state: Arc<TrackingState>, site_dir: Option<&str>) -> Router {
    let widget = Router::new()
        .route("/track/visit", post(track_visit))
        .layer(
            CorsLayer::new()
                .allow_origin(Any)
                .allow_methods(Any)
                .allow_headers(Any),
        );

    let site = match site_dir {
        Some(dir) => Router::new().fallback_service(ServeDir::new(dir)),
        None => Router::new().fallback(placeholder_page),
    };

    let tracked = widget
        .merge(site)
        .layer(middleware::from_fn_with_state(Arc::clone(&state), track_bots))
        .with_state(Arc::clone(&state));

    Router::new()
        .route("/health", get(health_check))
        .merge(tracked)
}
