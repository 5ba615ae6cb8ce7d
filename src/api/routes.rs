use axum::{
    middleware,
    routing::{get, post, put},
    Router,
};
use std::sync::Arc;
use tower_http::services::ServeDir;

use crate::auth::{auth_middleware, AuthService};

use super::handlers::{
    charts, classify, export_csv, health_check, list_mentions, list_user_visits, list_visits,
    mention_stats, registry, run_mentions, set_blocked, set_category, AppState,
};
use super::live::{live_handler, refresh_live, set_live_query};

/// Admin API router. Everything under `/api` requires a valid API key when
/// auth is enabled; `/health` and the dashboard assets do not.
pub fn create_api_router(
    state: Arc<AppState>,
    auth_service: Arc<AuthService>,
    static_dir: Option<&str>,
) -> Router {
    let protected_routes = Router::new()
        .route("/api/visits", get(list_visits))
        .route("/api/visits/export.csv", get(export_csv))
        .route("/api/charts", get(charts))
        .route("/api/ips/{ip}/blocked", post(set_blocked))
        .route("/api/ips/{ip}/category", post(set_category))
        .route("/api/registry", get(registry))
        .route("/api/classify", post(classify))
        .route("/api/user-visits", get(list_user_visits))
        .route("/api/mentions", get(list_mentions))
        .route("/api/mentions/run", post(run_mentions))
        .route("/api/mentions/stats", get(mention_stats))
        .route("/api/live", get(live_handler))
        .route("/api/live/{id}/query", put(set_live_query))
        .route("/api/live/{id}/refresh", post(refresh_live))
        .route_layer(middleware::from_fn_with_state(auth_service, auth_middleware))
        .with_state(state);

    let router = Router::new()
        .route("/health", get(health_check))
        .merge(protected_routes);

    match static_dir {
        Some(dir) => router.fallback_service(ServeDir::new(dir)),
        None => router,
    }
}
