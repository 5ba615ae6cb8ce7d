use anyhow::{Context, Result};
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use botwatch::analytics::{GeoIpService, VisitLogger};
use botwatch::api::{self, AppState};
use botwatch::auth::AuthService;
use botwatch::config::{AuthMode, Config};
use botwatch::dashboard::{QueryEngine, ViewerRegistry};
use botwatch::detection::{registry, Classifier, UserAgentParser};
use botwatch::events::EventBus;
use botwatch::mentions::{spawn_mention_scheduler, MentionChecker};
use botwatch::storage;
use botwatch::tracking::{self, TrackingState};

async fn wait_for_shutdown(mut shutdown: watch::Receiver<bool>) {
    while !*shutdown.borrow() {
        if shutdown.changed().await.is_err() {
            break;
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let config = Config::from_env()?;
    info!("Loaded configuration");

    let storage = storage::connect(&config.database).await?;
    info!("Initializing database...");
    storage.init().await?;
    info!("Database initialized successfully");

    let auth_service = Arc::new(AuthService::new(&config.auth));
    match config.auth.mode {
        AuthMode::None => info!("🔓 Authentication is disabled - all API requests are allowed"),
        AuthMode::ApiKey => info!(
            keys = config.auth.api_keys.len(),
            "🔐 API key authentication enabled"
        ),
    }

    let signatures = Arc::new(registry::from_config(&config.tracking));
    info!(signatures = signatures.len(), "Loaded bot signature registry");
    let classifier = Classifier::new(signatures);

    let geoip = GeoIpService::new(config.tracking.geoip_city_db_path.as_deref())?;
    if !geoip.is_enabled() {
        info!("GeoIP database not configured, country and city stay empty");
    }

    let events = EventBus::default();
    let logger = Arc::new(VisitLogger::spawn(
        Arc::clone(&storage),
        geoip,
        UserAgentParser::default(),
        events.clone(),
        config.tracking.logger_buffer_size,
    ));

    let engine = Arc::new(QueryEngine::new(
        Arc::clone(&storage),
        events.clone(),
        config.dashboard.page_size,
    ));
    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let viewers = Arc::new(ViewerRegistry::new(
        Arc::clone(&engine),
        events.clone(),
        shutdown_rx.clone(),
    ));

    let mentions = match config.mentions.clone() {
        Some(mentions_config) => {
            let interval = Duration::from_secs(mentions_config.interval_secs);
            let brands = mentions_config.brands.len();
            let checker = Arc::new(
                MentionChecker::new(mentions_config)
                    .context("failed to build the brand mention client")?,
            );
            let handle = spawn_mention_scheduler(
                Arc::clone(&checker),
                Arc::clone(&storage),
                interval,
                shutdown_rx.clone(),
            );
            info!(brands, interval_secs = interval.as_secs(), "Brand mention checks scheduled");
            Some((checker, handle))
        }
        None => {
            info!("LLM_API_KEY not set, brand mention checks disabled");
            None
        }
    };

    let app_state = Arc::new(AppState {
        storage: Arc::clone(&storage),
        engine,
        viewers,
        classifier: classifier.clone(),
        mentions: mentions.as_ref().map(|(checker, _)| Arc::clone(checker)),
    });
    let api_router = api::create_api_router(
        app_state,
        auth_service,
        config.frontend.static_dir.as_deref(),
    );

    let tracking_state = Arc::new(TrackingState {
        classifier,
        logger: Arc::clone(&logger),
        storage: Arc::clone(&storage),
        config: config.tracking.clone(),
    });
    let tracking_router =
        tracking::create_tracking_router(tracking_state, config.frontend.site_dir.as_deref());

    if let Some(ref static_dir) = config.frontend.static_dir {
        info!("🎨 Serving dashboard from directory: {}", static_dir);
    }
    if let Some(ref site_dir) = config.frontend.site_dir {
        info!("🌐 Serving tracked site from directory: {}", site_dir);
    }

    let api_addr = format!("{}:{}", config.api_server.host, config.api_server.port);
    let api_listener = tokio::net::TcpListener::bind(&api_addr)
        .await
        .with_context(|| format!("failed to bind API server to {api_addr}"))?;
    info!("🚀 API server listening on http://{}", api_addr);

    let tracking_addr = format!(
        "{}:{}",
        config.tracking_server.host, config.tracking_server.port
    );
    let tracking_listener = tokio::net::TcpListener::bind(&tracking_addr)
        .await
        .with_context(|| format!("failed to bind tracking server to {tracking_addr}"))?;
    info!("🚀 Tracking server listening on http://{}", tracking_addr);

    tokio::spawn(async move {
        match tokio::signal::ctrl_c().await {
            Ok(()) => info!("Shutdown signal received"),
            Err(e) => warn!(error = %e, "failed to listen for shutdown signal"),
        }
        let _ = shutdown_tx.send(true);
    });

    let served = tokio::try_join!(
        axum::serve(
            api_listener,
            api_router.into_make_service_with_connect_info::<SocketAddr>(),
        )
        .with_graceful_shutdown(wait_for_shutdown(shutdown_rx.clone())),
        axum::serve(
            tracking_listener,
            tracking_router.into_make_service_with_connect_info::<SocketAddr>(),
        )
        .with_graceful_shutdown(wait_for_shutdown(shutdown_rx.clone())),
    );

    logger.shutdown().await;
    if let Some((_, handle)) = mentions {
        handle.abort();
    }
    info!("Servers stopped");

    served?;
    Ok(())
}
