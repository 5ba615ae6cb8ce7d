//! Live dashboard stream over Server-Sent Events
//!
//! A connection first receives a `viewer` event carrying its id, then a
//! `page` event whenever its query result changes, plus `anomaly` events for
//! anomalous inserts. The id addresses the viewer in the query/refresh routes.

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    response::sse::{Event, KeepAlive, Sse},
    Json,
};
use futures::stream::Stream;
use serde::{Deserialize, Serialize};
use std::{convert::Infallible, sync::Arc, time::Duration};
use tokio_stream::wrappers::ReceiverStream;
use tokio_stream::StreamExt;

use super::handlers::{api_error, ApiError, AppState, PageQuery};
use crate::dashboard::{FilterParams, LiveMessage, QueryError, RefreshOutcome, ViewQuery};

#[derive(Debug, Serialize)]
struct ViewerHello<'a> {
    id: &'a str,
}

fn to_event(message: LiveMessage) -> Option<Event> {
    let (name, json) = match message {
        LiveMessage::Page(page) => ("page", serde_json::to_string(&page).ok()?),
        LiveMessage::Anomaly(alert) => ("anomaly", serde_json::to_string(&alert).ok()?),
        LiveMessage::Error(error) => ("error", serde_json::to_string(&error).ok()?),
    };
    Some(Event::default().event(name).data(json))
}

/// Open a live viewer on the filters and page given in the query string
pub async fn live_handler(
    State(state): State<Arc<AppState>>,
    Query(params): Query<FilterParams>,
    Query(page): Query<PageQuery>,
) -> Result<Sse<impl Stream<Item = Result<Event, Infallible>>>, ApiError> {
    let filter = params.to_filter().map_err(QueryError::from)?;
    let (session, inbox) = state.viewers.open(ViewQuery {
        filter,
        page: page.page.unwrap_or(1),
    });

    let hello = serde_json::to_string(&ViewerHello { id: session.id() })
        .map_err(|e| api_error(StatusCode::INTERNAL_SERVER_ERROR, e.to_string()))?;
    let first = Event::default().event("viewer").data(hello);

    let updates = ReceiverStream::new(inbox)
        .filter_map(|message| to_event(message).map(Ok::<_, Infallible>));
    let stream = tokio_stream::once(Ok::<_, Infallible>(first)).chain(updates);

    Ok(Sse::new(stream).keep_alive(
        KeepAlive::new()
            .interval(Duration::from_secs(15))
            .text("ping"),
    ))
}

#[derive(Debug, Deserialize)]
pub struct LiveQueryRequest {
    #[serde(flatten)]
    pub filters: FilterParams,
    #[serde(default)]
    pub page: Option<u32>,
}

fn refresh_status(outcome: RefreshOutcome) -> StatusCode {
    match outcome {
        RefreshOutcome::Delivered | RefreshOutcome::Superseded | RefreshOutcome::Failed => {
            StatusCode::NO_CONTENT
        }
        RefreshOutcome::Closed => StatusCode::GONE,
    }
}

fn unknown_viewer() -> ApiError {
    api_error(StatusCode::NOT_FOUND, "Viewer not found")
}

/// Replace a viewer's filters and page; the new page arrives on its stream
pub async fn set_live_query(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
    Json(payload): Json<LiveQueryRequest>,
) -> Result<StatusCode, ApiError> {
    let session = state.viewers.get(&id).ok_or_else(unknown_viewer)?;
    let filter = payload.filters.to_filter().map_err(QueryError::from)?;

    let outcome = session
        .set_query(ViewQuery {
            filter,
            page: payload.page.unwrap_or(1),
        })
        .await;
    Ok(refresh_status(outcome))
}

/// Re-run a viewer's current query
pub async fn refresh_live(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> Result<StatusCode, ApiError> {
    let session = state.viewers.get(&id).ok_or_else(unknown_viewer)?;
    Ok(refresh_status(session.refresh().await))
}
