//! Event bus for broadcasting store changes to live viewers

use serde::Serialize;
use std::sync::Arc;
use tokio::sync::broadcast;

use crate::models::{BotCategory, VisitRecord};

/// Change applied to `bot_logs`
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum LiveEvent {
    Inserted(VisitRecord),
    Blocked { ip: String, blocked: bool },
    Categorized { ip: String, category: BotCategory },
}

impl LiveEvent {
    /// The inserted record when it is flagged as an anomaly
    pub fn anomaly(&self) -> Option<&VisitRecord> {
        match self {
            LiveEvent::Inserted(record) if record.is_anomaly => Some(record),
            _ => None,
        }
    }
}

#[derive(Clone)]
pub struct EventBus {
    sender: broadcast::Sender<Arc<LiveEvent>>,
}

impl EventBus {
    pub const DEFAULT_CAPACITY: usize = 1024;

    pub fn new(sender: broadcast::Sender<Arc<LiveEvent>>) -> Self {
        Self { sender }
    }

    pub fn with_capacity(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity);
        Self::new(sender)
    }

    /// Without subscribers the event is dropped
    pub fn publish(&self, event: LiveEvent) {
        let _ = self.sender.send(Arc::new(event));
    }

    pub fn subscribe(&self) -> broadcast::Receiver<Arc<LiveEvent>> {
        self.sender.subscribe()
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::with_capacity(Self::DEFAULT_CAPACITY)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::NewVisit;

    #[tokio::test]
    async fn test_subscribers_receive_published_events() {
        let bus = EventBus::default();
        let mut rx = bus.subscribe();

        bus.publish(LiveEvent::Blocked {
            ip: "10.0.0.1".into(),
            blocked: true,
        });

        let event = rx.recv().await.unwrap();
        assert!(matches!(&*event, LiveEvent::Blocked { ip, blocked: true } if ip == "10.0.0.1"));
    }

    #[test]
    fn test_publish_without_subscribers_is_ignored() {
        EventBus::default().publish(LiveEvent::Categorized {
            ip: "10.0.0.1".into(),
            category: BotCategory::Good,
        });
    }

    #[test]
    fn test_anomaly_only_for_flagged_inserts() {
        let flagged = NewVisit {
            is_anomaly: true,
            ..Default::default()
        }
        .into_record(1);
        assert!(LiveEvent::Inserted(flagged).anomaly().is_some());
        assert!(LiveEvent::Inserted(NewVisit::default().into_record(2))
            .anomaly()
            .is_none());
    }
}
