use axum::{
    extract::{Path, Query, State},
    http::{header, StatusCode},
    response::{IntoResponse, Response},
    Json,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

use crate::analytics::{ChartSet, Granularity};
use crate::dashboard::{FilterParams, QueryEngine, QueryError, ViewerRegistry, VisitPage};
use crate::detection::{Classifier, Glyph};
use crate::export::{export_visits, ExportError};
use crate::mentions::{MentionChecker, MentionStats};
use crate::models::{BotCategory, MentionRecord, UserVisit};
use crate::storage::Storage;

pub struct AppState {
    pub storage: Arc<dyn Storage>,
    pub engine: Arc<QueryEngine>,
    pub viewers: Arc<ViewerRegistry>,
    pub classifier: Classifier,
    pub mentions: Option<Arc<MentionChecker>>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ErrorResponse {
    pub error: String,
}

pub type ApiError = (StatusCode, Json<ErrorResponse>);

pub(crate) fn api_error(status: StatusCode, error: impl Into<String>) -> ApiError {
    (
        status,
        Json(ErrorResponse {
            error: error.into(),
        }),
    )
}

impl From<QueryError> for ApiError {
    fn from(e: QueryError) -> Self {
        match e {
            QueryError::Filter(e) => api_error(StatusCode::BAD_REQUEST, e.to_string()),
            QueryError::Storage(e) => {
                tracing::error!(error = %e, "dashboard query failed");
                api_error(
                    StatusCode::INTERNAL_SERVER_ERROR,
                    format!("Failed to query visits: {e}"),
                )
            }
        }
    }
}

#[derive(Debug, Default, Deserialize)]
pub struct PageQuery {
    #[serde(default)]
    pub page: Option<u32>,
}

#[derive(Debug, Default, Deserialize)]
pub struct ChartQuery {
    #[serde(default)]
    pub granularity: Option<Granularity>,
    /// Country for the per-bot breakdown; `country` itself is a row filter
    #[serde(default)]
    pub breakdown_country: Option<String>,
}

#[derive(Deserialize)]
pub struct ListQuery {
    #[serde(default = "default_limit")]
    pub limit: i64,
    #[serde(default)]
    pub offset: i64,
}

fn default_limit() -> i64 {
    50
}

impl ListQuery {
    pub const MAX_LIMIT: i64 = 500;

    /// Limit clamped to `1..=MAX_LIMIT` and a non-negative offset
    pub fn bounds(&self) -> (i64, i64) {
        (self.limit.clamp(1, Self::MAX_LIMIT), self.offset.max(0))
    }
}

/// One page of bot visits matching the filters, newest first
pub async fn list_visits(
    State(state): State<Arc<AppState>>,
    Query(params): Query<FilterParams>,
    Query(page): Query<PageQuery>,
) -> Result<Json<VisitPage>, ApiError> {
    let filter = params.to_filter().map_err(QueryError::from)?;
    let page = state
        .engine
        .query(&filter, page.page.unwrap_or(1))
        .await?;
    Ok(Json(page))
}

/// Every aggregation view over the filtered visits
pub async fn charts(
    State(state): State<Arc<AppState>>,
    Query(params): Query<FilterParams>,
    Query(chart): Query<ChartQuery>,
) -> Result<Json<ChartSet>, ApiError> {
    let filter = params.to_filter().map_err(QueryError::from)?;
    let breakdown = chart
        .breakdown_country
        .as_deref()
        .map(str::trim)
        .filter(|c| !c.is_empty());

    let charts = state
        .engine
        .charts(&filter, chart.granularity.unwrap_or_default(), breakdown)
        .await?;
    Ok(Json(charts))
}

/// CSV download of every visit matching the filters
pub async fn export_csv(
    State(state): State<Arc<AppState>>,
    Query(params): Query<FilterParams>,
) -> Result<Response, ApiError> {
    let filter = params.to_filter().map_err(QueryError::from)?;

    match export_visits(state.storage.as_ref(), &filter).await {
        Ok((document, rows)) => {
            tracing::info!(rows, "exported visits as CSV");
            Ok((
                [
                    (header::CONTENT_TYPE, "text/csv; charset=utf-8"),
                    (
                        header::CONTENT_DISPOSITION,
                        "attachment; filename=\"bot_logs.csv\"",
                    ),
                ],
                document,
            )
                .into_response())
        }
        Err(ExportError::Empty) => Err(api_error(
            StatusCode::NOT_FOUND,
            ExportError::Empty.to_string(),
        )),
        Err(ExportError::Query(e)) => Err(e.into()),
        Err(e) => Err(api_error(
            StatusCode::INTERNAL_SERVER_ERROR,
            format!("Failed to export visits: {e}"),
        )),
    }
}

#[derive(Debug, Deserialize)]
pub struct SetBlockedRequest {
    pub blocked: bool,
}

#[derive(Debug, Deserialize)]
pub struct SetCategoryRequest {
    pub category: String,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct UpdateResponse {
    pub ip: String,
    pub updated: u64,
}

/// Set or clear the blocked flag on every record of an IP
pub async fn set_blocked(
    State(state): State<Arc<AppState>>,
    Path(ip): Path<String>,
    Json(payload): Json<SetBlockedRequest>,
) -> Result<Json<UpdateResponse>, ApiError> {
    let updated = state.engine.set_blocked(&ip, payload.blocked).await?;
    Ok(Json(UpdateResponse { ip, updated }))
}

/// Assign a category to every record of an IP
pub async fn set_category(
    State(state): State<Arc<AppState>>,
    Path(ip): Path<String>,
    Json(payload): Json<SetCategoryRequest>,
) -> Result<Json<UpdateResponse>, ApiError> {
    let category = payload
        .category
        .parse::<BotCategory>()
        .map_err(|e| api_error(StatusCode::BAD_REQUEST, e))?;

    let updated = state.engine.set_category(&ip, category).await?;
    Ok(Json(UpdateResponse { ip, updated }))
}

#[derive(Debug, Serialize)]
pub struct RegistryEntry {
    pub name: String,
    pub glyph: Glyph,
}

/// Signatures the tracking classifier matches, in match order
pub async fn registry(State(state): State<Arc<AppState>>) -> Json<Vec<RegistryEntry>> {
    let entries = state
        .classifier
        .registry()
        .signatures()
        .iter()
        .map(|s| RegistryEntry {
            name: s.name.to_string(),
            glyph: s.glyph.clone(),
        })
        .collect();
    Json(entries)
}

#[derive(Debug, Deserialize)]
pub struct ClassifyRequest {
    #[serde(default)]
    pub user_agent: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct ClassifyResponse {
    pub matched: bool,
    pub bot_name: Option<String>,
    pub glyph: Option<Glyph>,
}

pub async fn classify(
    State(state): State<Arc<AppState>>,
    Json(payload): Json<ClassifyRequest>,
) -> Json<ClassifyResponse> {
    let classification = state.classifier.classify(payload.user_agent.as_deref());
    let glyph = classification
        .bot_name
        .as_deref()
        .and_then(|name| state.classifier.registry().lookup(name))
        .map(|signature| signature.glyph.clone());

    Json(ClassifyResponse {
        matched: classification.matched,
        bot_name: classification.bot_name,
        glyph,
    })
}

/// Widget page views, newest first
pub async fn list_user_visits(
    State(state): State<Arc<AppState>>,
    Query(query): Query<ListQuery>,
) -> Result<Json<Vec<UserVisit>>, ApiError> {
    let (limit, offset) = query.bounds();
    match state.storage.list_user_visits(limit, offset).await {
        Ok(visits) => Ok(Json(visits)),
        Err(e) => Err(api_error(
            StatusCode::INTERNAL_SERVER_ERROR,
            format!("Failed to list user visits: {e}"),
        )),
    }
}

pub async fn list_mentions(
    State(state): State<Arc<AppState>>,
    Query(query): Query<ListQuery>,
) -> Result<Json<Vec<MentionRecord>>, ApiError> {
    let (limit, _) = query.bounds();
    match state.storage.list_mentions(limit).await {
        Ok(mentions) => Ok(Json(mentions)),
        Err(e) => Err(api_error(
            StatusCode::INTERNAL_SERVER_ERROR,
            format!("Failed to list mentions: {e}"),
        )),
    }
}

/// Check every configured brand now and return what was stored
pub async fn run_mentions(
    State(state): State<Arc<AppState>>,
) -> Result<Json<Vec<MentionRecord>>, ApiError> {
    let Some(checker) = state.mentions.as_ref() else {
        return Err(api_error(
            StatusCode::SERVICE_UNAVAILABLE,
            "Brand mention checks are not configured",
        ));
    };

    Ok(Json(checker.run(state.storage.as_ref()).await))
}

#[derive(Debug, Default, Deserialize)]
pub struct MentionStatsQuery {
    /// Brand for the visibility trend; defaults to the first configured brand
    #[serde(default)]
    pub brand: Option<String>,
}

/// Model performance, brand ranking and a weekly visibility trend
pub async fn mention_stats(
    State(state): State<Arc<AppState>>,
    Query(query): Query<MentionStatsQuery>,
) -> Result<Json<MentionStats>, ApiError> {
    let mentions = state.storage.scan_mentions().await.map_err(|e| {
        api_error(
            StatusCode::INTERNAL_SERVER_ERROR,
            format!("Failed to load mentions: {e}"),
        )
    })?;

    let brand = query
        .brand
        .map(|b| b.trim().to_string())
        .filter(|b| !b.is_empty())
        .or_else(|| {
            state
                .mentions
                .as_ref()
                .and_then(|checker| checker.brands().first().cloned())
        });

    Ok(Json(MentionStats::build(&mentions, brand.as_deref())))
}

#[derive(Debug, Serialize, Deserialize)]
pub struct HealthResponse {
    pub status: String,
}

/// Health check endpoint
pub async fn health_check() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "OK".to_string(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_list_query_bounds_are_clamped() {
        let query = |limit, offset| ListQuery { limit, offset }.bounds();

        assert_eq!(query(50, 10), (50, 10));
        assert_eq!(query(-1, -3), (1, 0));
        assert_eq!(query(0, 0), (1, 0));
        assert_eq!(query(10_000, 0), (ListQuery::MAX_LIMIT, 0));
    }
}
