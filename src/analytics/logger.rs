//! Fire-and-forget visit logger
//!
//! Request handlers hand a [`VisitEvent`] to [`VisitLogger::record`], which
//! only enqueues it. A single actor task drains the queue, enriches each
//! event (GeoIP, user-agent parsing), persists it and publishes the stored
//! record on the event bus. Persistence failures are logged and dropped.

use std::net::IpAddr;
use std::sync::Arc;
use tokio::sync::{mpsc, oneshot, Mutex};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::analytics::geoip::GeoIpService;
use crate::analytics::ip_extractor::ip_label;
use crate::detection::UserAgentParser;
use crate::events::{EventBus, LiveEvent};
use crate::models::NewVisit;
use crate::storage::Storage;

/// Request context of one classified request
#[derive(Debug, Clone, Default)]
pub struct VisitEvent {
    pub url: String,
    pub bot_name: String,
    pub user_agent: String,
    pub client_ip: Option<IpAddr>,
    /// Unix milliseconds at which the request was seen
    pub timestamp: i64,
    pub referrer: Option<String>,
    pub page_title: Option<String>,
    pub session_id: Option<String>,
    pub page_load_time: Option<f64>,
    pub server_response_time: Option<f64>,
    pub visited_pages: Vec<String>,
}

enum LoggerMessage {
    Record(Box<VisitEvent>),
    /// Acknowledged once every earlier event has been handled
    Flush(oneshot::Sender<()>),
    Shutdown,
}

struct LoggerActor {
    receiver: mpsc::Receiver<LoggerMessage>,
    storage: Arc<dyn Storage>,
    geoip: GeoIpService,
    ua_parser: UserAgentParser,
    events: EventBus,
}

impl LoggerActor {
    async fn run(mut self) {
        while let Some(msg) = self.receiver.recv().await {
            match msg {
                LoggerMessage::Record(event) => self.persist(*event).await,
                LoggerMessage::Flush(ack) => {
                    let _ = ack.send(());
                }
                LoggerMessage::Shutdown => {
                    info!("Visit logger received shutdown signal, draining queue...");
                    self.receiver.close();
                    while let Some(msg) = self.receiver.recv().await {
                        match msg {
                            LoggerMessage::Record(event) => self.persist(*event).await,
                            LoggerMessage::Flush(ack) => {
                                let _ = ack.send(());
                            }
                            LoggerMessage::Shutdown => {}
                        }
                    }
                    break;
                }
            }
        }
        debug!("Visit logger stopped");
    }

    async fn persist(&self, event: VisitEvent) {
        let visit = self.enrich(event).await;

        match self.storage.insert_visit(&visit).await {
            Ok(record) => {
                debug!(id = record.id, bot = ?record.bot_name, url = %record.url, "visit logged");
                self.events.publish(LiveEvent::Inserted(record));
            }
            Err(e) => {
                warn!(
                    error = %e,
                    bot = %visit.bot_name.as_deref().unwrap_or_default(),
                    ip = %visit.ip,
                    url = %visit.url,
                    "failed to log visit"
                );
            }
        }
    }

    async fn enrich(&self, event: VisitEvent) -> NewVisit {
        let location = event
            .client_ip
            .map(|ip| self.geoip.lookup(ip))
            .unwrap_or_default();

        let agent = if event.user_agent.is_empty() {
            None
        } else {
            Some(self.ua_parser.parse(&event.user_agent).await)
        };

        NewVisit {
            url: event.url,
            bot_name: Some(event.bot_name).filter(|name| !name.is_empty()),
            ip: ip_label(event.client_ip),
            user_agent: event.user_agent,
            timestamp: event.timestamp,
            referrer: event.referrer,
            page_title: event.page_title,
            country: location.country,
            city: location.city,
            session_id: event.session_id,
            os: agent.as_ref().and_then(|a| a.os.clone()),
            browser: agent.as_ref().and_then(|a| a.browser.clone()),
            page_load_time: event.page_load_time,
            server_response_time: event.server_response_time,
            visited_pages: event.visited_pages,
            ..Default::default()
        }
    }
}

pub struct VisitLogger {
    sender: mpsc::Sender<LoggerMessage>,
    handle: Mutex<Option<JoinHandle<()>>>,
}

impl VisitLogger {
    pub const DEFAULT_BUFFER_SIZE: usize = 10_000;

    /// Spawn the logger task; must be called inside a tokio runtime
    pub fn spawn(
        storage: Arc<dyn Storage>,
        geoip: GeoIpService,
        ua_parser: UserAgentParser,
        events: EventBus,
        buffer_size: usize,
    ) -> Self {
        let (sender, receiver) = mpsc::channel(buffer_size.max(1));

        let actor = LoggerActor {
            receiver,
            storage,
            geoip,
            ua_parser,
            events,
        };
        let handle = tokio::spawn(actor.run());

        Self {
            sender,
            handle: Mutex::new(Some(handle)),
        }
    }

    /// Logger without enrichment, for tests and tools
    pub fn with_storage(storage: Arc<dyn Storage>, events: EventBus) -> Self {
        Self::spawn(
            storage,
            GeoIpService::default(),
            UserAgentParser::default(),
            events,
            Self::DEFAULT_BUFFER_SIZE,
        )
    }

    /// Enqueue one visit; never waits and never fails the caller
    pub fn record(&self, event: VisitEvent) {
        if let Err(e) = self.sender.try_send(LoggerMessage::Record(Box::new(event))) {
            match e {
                mpsc::error::TrySendError::Full(_) => {
                    warn!("Visit logger queue full, dropping visit")
                }
                mpsc::error::TrySendError::Closed(_) => {
                    warn!("Visit logger stopped, dropping visit")
                }
            }
        }
    }

    /// Wait until every visit recorded before this call has been handled
    pub async fn flush(&self) {
        let (ack, done) = oneshot::channel();
        if self.sender.send(LoggerMessage::Flush(ack)).await.is_ok() {
            let _ = done.await;
        }
    }

    /// Persist everything queued, then stop the task
    pub async fn shutdown(&self) {
        let _ = self.sender.send(LoggerMessage::Shutdown).await;

        if let Some(handle) = self.handle.lock().await.take() {
            if let Err(e) = handle.await {
                warn!(error = %e, "Visit logger task ended abnormally");
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::{SqliteStorage, VisitFilter};

    async fn storage() -> Arc<dyn Storage> {
        let storage = SqliteStorage::new("sqlite::memory:", 1).await.unwrap();
        storage.init().await.unwrap();
        Arc::new(storage)
    }

    fn event(url: &str) -> VisitEvent {
        VisitEvent {
            url: url.to_string(),
            bot_name: "Googlebot".to_string(),
            user_agent: "Mozilla/5.0 (compatible; Googlebot/2.1; +http://www.google.com/bot.html)"
                .to_string(),
            client_ip: Some("66.249.66.1".parse().unwrap()),
            timestamp: 1_705_300_000_000,
            ..Default::default()
        }
    }

    #[tokio::test]
    async fn test_recorded_visits_are_persisted_and_published() {
        let storage = storage().await;
        let bus = EventBus::default();
        let mut rx = bus.subscribe();
        let logger = VisitLogger::with_storage(Arc::clone(&storage), bus);

        logger.record(event("/a"));
        logger.record(event("/b"));
        logger.flush().await;

        let count = storage.count_visits(&VisitFilter::default()).await.unwrap();
        assert_eq!(count, 2);

        let first = rx.recv().await.unwrap();
        match &*first {
            LiveEvent::Inserted(record) => {
                assert_eq!(record.url, "/a");
                assert_eq!(record.bot_name.as_deref(), Some("Googlebot"));
                assert_eq!(record.ip, "66.249.66.1");
                assert!(!record.is_anomaly);
                assert!(!record.is_blocked);
            }
            other => panic!("unexpected event {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_shutdown_drains_queue() {
        let storage = storage().await;
        let logger = VisitLogger::with_storage(Arc::clone(&storage), EventBus::default());

        for i in 0..20 {
            logger.record(event(&format!("/page/{i}")));
        }
        logger.shutdown().await;

        let count = storage.count_visits(&VisitFilter::default()).await.unwrap();
        assert_eq!(count, 20);

        // recording after shutdown is dropped silently
        logger.record(event("/late"));
    }

    #[tokio::test]
    async fn test_enrichment_fills_os_and_browser() {
        let storage = storage().await;
        let logger = VisitLogger::with_storage(Arc::clone(&storage), EventBus::default());

        logger.record(VisitEvent {
            user_agent: "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 \
                         (KHTML, like Gecko) Chrome/120.0.0.0 Safari/537.36 GPTBot/1.0"
                .to_string(),
            bot_name: "GPTBot".to_string(),
            client_ip: None,
            ..event("/")
        });
        logger.flush().await;

        let rows = storage
            .list_visits(&VisitFilter::default(), 10, 0)
            .await
            .unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].ip, "unknown");
        assert_eq!(rows[0].os.as_deref(), Some("Windows"));
        assert_eq!(rows[0].browser.as_deref(), Some("Chrome"));
    }
}
