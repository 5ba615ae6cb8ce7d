//! Tracking server integration tests
//!
//! Requests go through the real tracking router; bot visits are read back
//! from storage after flushing the visit logger.

use axum::{
    body::Body,
    http::{Request, StatusCode},
};
use botwatch::analytics::VisitLogger;
use botwatch::config::TrackingConfig;
use botwatch::detection::Classifier;
use botwatch::events::{EventBus, LiveEvent};
use botwatch::storage::{SortOrder, SqliteStorage, Storage, VisitFilter};
use botwatch::tracking::{create_tracking_router, TrackingState};
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tower::{Layer, ServiceExt};

const GOOGLEBOT_UA: &str =
    "Mozilla/5.0 (compatible; Googlebot/2.1; +http://www.google.com/bot.html)";
const FIREFOX_UA: &str =
    "Mozilla/5.0 (Windows NT 10.0; Win64; x64; rv:121.0) Gecko/20100101 Firefox/121.0";

/// Helper to create test storage
async fn create_test_storage() -> Arc<dyn Storage> {
    let storage = SqliteStorage::new("sqlite::memory:", 1).await.unwrap();
    storage.init().await.unwrap();
    Arc::new(storage)
}

/// Helper layer to inject ConnectInfo for tests
#[derive(Clone)]
struct TestConnectInfoLayer;

impl<S> Layer<S> for TestConnectInfoLayer {
    type Service = TestConnectInfoMiddleware<S>;

    fn layer(&self, inner: S) -> Self::Service {
        TestConnectInfoMiddleware { inner }
    }
}

#[derive(Clone)]
struct TestConnectInfoMiddleware<S> {
    inner: S,
}

impl<S, B> tower::Service<Request<B>> for TestConnectInfoMiddleware<S>
where
    S: tower::Service<Request<B>> + Clone,
{
    type Response = S::Response;
    type Error = S::Error;
    type Future = S::Future;

    fn poll_ready(
        &mut self,
        cx: &mut std::task::Context<'_>,
    ) -> std::task::Poll<Result<(), Self::Error>> {
        self.inner.poll_ready(cx)
    }

    fn call(&mut self, mut req: Request<B>) -> Self::Future {
        let addr = SocketAddr::from(([203, 0, 113, 7], 40000));
        req.extensions_mut()
            .insert(axum::extract::connect_info::ConnectInfo(addr));
        self.inner.call(req)
    }
}

struct Harness {
    storage: Arc<dyn Storage>,
    logger: Arc<VisitLogger>,
    events: EventBus,
    app: axum::Router,
}

async fn harness(config: TrackingConfig) -> Harness {
    let storage = create_test_storage().await;
    let events = EventBus::default();
    let logger = Arc::new(VisitLogger::with_storage(
        Arc::clone(&storage),
        events.clone(),
    ));
    let state = Arc::new(TrackingState {
        classifier: Classifier::default(),
        logger: Arc::clone(&logger),
        storage: Arc::clone(&storage),
        config,
    });
    let app = create_tracking_router(state, None).layer(TestConnectInfoLayer);

    Harness {
        storage,
        logger,
        events,
        app,
    }
}

async fn logged(storage: &Arc<dyn Storage>) -> Vec<botwatch::models::VisitRecord> {
    storage
        .scan_visits(&VisitFilter::default(), SortOrder::Asc)
        .await
        .unwrap()
}

#[tokio::test]
async fn test_bot_request_is_logged() {
    let h = harness(TrackingConfig::default()).await;
    let mut rx = h.events.subscribe();

    let response = h
        .app
        .clone()
        .oneshot(
            Request::builder()
                .uri("/pricing?plan=pro")
                .header("user-agent", GOOGLEBOT_UA)
                .header("referer", "https://www.google.com/")
                .header("x-session-id", "abc123")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    h.logger.flush().await;
    let rows = logged(&h.storage).await;
    assert_eq!(rows.len(), 1);

    let row = &rows[0];
    assert_eq!(row.url, "/pricing?plan=pro");
    assert_eq!(row.bot_name.as_deref(), Some("Googlebot"));
    assert_eq!(row.user_agent, GOOGLEBOT_UA);
    assert_eq!(row.ip, "203.0.113.7");
    assert_eq!(row.referrer.as_deref(), Some("https://www.google.com/"));
    assert_eq!(row.session_id.as_deref(), Some("abc123"));
    assert!(row.server_response_time.is_some());
    assert!(row.timestamp > 0);

    let event = tokio::time::timeout(Duration::from_secs(1), rx.recv())
        .await
        .unwrap()
        .unwrap();
    assert!(matches!(event.as_ref(), LiveEvent::Inserted(r) if r.id == row.id));
}

#[tokio::test]
async fn test_human_request_is_not_logged() {
    let h = harness(TrackingConfig::default()).await;

    for ua in [Some(FIREFOX_UA), None] {
        let mut request = Request::builder().uri("/");
        if let Some(ua) = ua {
            request = request.header("user-agent", ua);
        }
        let response = h
            .app
            .clone()
            .oneshot(request.body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
    }

    h.logger.flush().await;
    assert!(logged(&h.storage).await.is_empty());
}

#[tokio::test]
async fn test_forwarded_client_ip_is_logged() {
    let config = TrackingConfig {
        num_trusted_proxies: Some(1),
        ..TrackingConfig::default()
    };
    let h = harness(config).await;

    let response = h
        .app
        .clone()
        .oneshot(
            Request::builder()
                .uri("/")
                .header("user-agent", "GPTBot/1.0")
                .header("x-forwarded-for", "198.51.100.23, 10.0.0.2")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    h.logger.flush().await;
    let rows = logged(&h.storage).await;
    assert_eq!(rows.len(), 1);
    assert_eq!(rows[0].ip, "198.51.100.23");
    assert_eq!(rows[0].bot_name.as_deref(), Some("GPTBot"));
}

#[tokio::test]
async fn test_health_is_not_tracked() {
    let h = harness(TrackingConfig::default()).await;

    let response = h
        .app
        .clone()
        .oneshot(
            Request::builder()
                .uri("/health")
                .header("user-agent", GOOGLEBOT_UA)
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    h.logger.flush().await;
    assert!(logged(&h.storage).await.is_empty());
}

#[tokio::test]
async fn test_widget_visit_is_accepted_and_stored() {
    let h = harness(TrackingConfig::default()).await;

    let response = h
        .app
        .clone()
        .oneshot(
            Request::builder()
                .method("POST")
                .uri("/track/visit")
                .header("content-type", "application/json")
                .header("user-agent", FIREFOX_UA)
                .body(Body::from(r#"{"url": "/blog/post", "referrer": ""}"#))
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::ACCEPTED);

    let body = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    let json: serde_json::Value = serde_json::from_slice(&body).unwrap();
    let session_id = json["session_id"].as_str().unwrap().to_string();
    assert_eq!(session_id.len(), 12);

    // the write is fire-and-forget
    let mut visits = Vec::new();
    for _ in 0..50 {
        visits = h.storage.list_user_visits(10, 0).await.unwrap();
        if !visits.is_empty() {
            break;
        }
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
    assert_eq!(visits.len(), 1);
    assert_eq!(visits[0].url, "/blog/post");
    assert_eq!(visits[0].referrer, None);
    assert_eq!(visits[0].user_agent.as_deref(), Some(FIREFOX_UA));
    assert_eq!(visits[0].session_id, session_id);
}
