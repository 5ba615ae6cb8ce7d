//! Live dashboard viewers
//!
//! Each viewer owns the query it is looking at. Store changes and explicit
//! query changes both go through [`ViewerSession::refresh`]; every refresh
//! takes a ticket, and a result whose ticket is no longer the newest when it
//! arrives is discarded instead of delivered.

use dashmap::DashMap;
use rand::distr::Alphanumeric;
use rand::Rng;
use serde::Serialize;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio::sync::broadcast::error::RecvError;
use tokio::sync::{mpsc, watch, Mutex, RwLock};
use tracing::{debug, warn};

use crate::dashboard::engine::{QueryEngine, VisitPage};
use crate::events::{EventBus, LiveEvent};
use crate::models::VisitRecord;
use crate::storage::VisitFilter;

/// Lifetime of the alert shown for an anomalous insert
pub const ANOMALY_ALERT_SECS: u64 = 5;

const OUTBOX_CAPACITY: usize = 32;

/// Filter and page a viewer is looking at
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ViewQuery {
    pub filter: VisitFilter,
    pub page: u32,
}

#[derive(Debug, Clone, Serialize)]
pub struct AnomalyAlert {
    pub record: VisitRecord,
    pub expires_in_secs: u64,
}

/// Message delivered to a viewer
#[derive(Debug, Clone)]
pub enum LiveMessage {
    Page(VisitPage),
    Anomaly(AnomalyAlert),
    Error(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RefreshOutcome {
    Delivered,
    /// A newer refresh started while this one was running
    Superseded,
    Failed,
    /// The viewer is gone
    Closed,
}

pub struct ViewerSession {
    id: String,
    engine: Arc<QueryEngine>,
    query: RwLock<ViewQuery>,
    generation: AtomicU64,
    delivery: Mutex<()>,
    outbox: mpsc::Sender<LiveMessage>,
}

impl ViewerSession {
    pub fn new(
        id: String,
        engine: Arc<QueryEngine>,
        query: ViewQuery,
    ) -> (Self, mpsc::Receiver<LiveMessage>) {
        let (outbox, inbox) = mpsc::channel(OUTBOX_CAPACITY);
        let session = Self {
            id,
            engine,
            query: RwLock::new(query),
            generation: AtomicU64::new(0),
            delivery: Mutex::new(()),
            outbox,
        };
        (session, inbox)
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub async fn query(&self) -> ViewQuery {
        self.query.read().await.clone()
    }

    /// Replace the viewer's query and refresh with it
    pub async fn set_query(&self, query: ViewQuery) -> RefreshOutcome {
        *self.query.write().await = query;
        self.refresh().await
    }

    /// Re-run the current query and deliver the page unless superseded
    pub async fn refresh(&self) -> RefreshOutcome {
        let ticket = self.generation.fetch_add(1, Ordering::SeqCst) + 1;
        let query = self.query().await;

        let result = self.engine.query(&query.filter, query.page).await;

        let _delivery = self.delivery.lock().await;
        if self.generation.load(Ordering::SeqCst) != ticket {
            debug!(viewer = %self.id, ticket, "discarding superseded refresh");
            return RefreshOutcome::Superseded;
        }

        let (message, outcome) = match result {
            Ok(page) => (LiveMessage::Page(page), RefreshOutcome::Delivered),
            Err(e) => {
                warn!(viewer = %self.id, error = %e, "live refresh failed");
                (LiveMessage::Error(e.to_string()), RefreshOutcome::Failed)
            }
        };

        if self.outbox.send(message).await.is_err() {
            return RefreshOutcome::Closed;
        }
        outcome
    }

    /// Alert on anomalous inserts, then refresh
    pub async fn handle_event(&self, event: &LiveEvent) -> RefreshOutcome {
        if let Some(record) = event.anomaly() {
            let alert = AnomalyAlert {
                record: record.clone(),
                expires_in_secs: ANOMALY_ALERT_SECS,
            };
            if self.outbox.send(LiveMessage::Anomaly(alert)).await.is_err() {
                return RefreshOutcome::Closed;
            }
        }
        self.refresh().await
    }

    pub fn is_closed(&self) -> bool {
        self.outbox.is_closed()
    }
}

/// Connected viewers by id
pub struct ViewerRegistry {
    engine: Arc<QueryEngine>,
    events: EventBus,
    shutdown: watch::Receiver<bool>,
    sessions: Arc<DashMap<String, Arc<ViewerSession>>>,
}

fn viewer_id() -> String {
    rand::rng()
        .sample_iter(&Alphanumeric)
        .take(16)
        .map(char::from)
        .collect()
}

impl ViewerRegistry {
    /// Viewers are closed once `shutdown` turns true; a dropped sender never
    /// closes them
    pub fn new(
        engine: Arc<QueryEngine>,
        events: EventBus,
        shutdown: watch::Receiver<bool>,
    ) -> Self {
        Self {
            engine,
            events,
            shutdown,
            sessions: Arc::new(DashMap::new()),
        }
    }

    /// Register a viewer, deliver its first page and follow the event bus
    /// until the returned receiver is dropped or the server shuts down.
    /// Closing drops the session's outbox, which ends the receiver's stream.
    pub fn open(&self, query: ViewQuery) -> (Arc<ViewerSession>, mpsc::Receiver<LiveMessage>) {
        let (session, inbox) = ViewerSession::new(viewer_id(), Arc::clone(&self.engine), query);
        let session = Arc::new(session);
        self.sessions
            .insert(session.id().to_string(), Arc::clone(&session));

        let mut events = self.events.subscribe();
        let sessions = Arc::clone(&self.sessions);
        let follower = Arc::clone(&session);
        let stop = stopped(self.shutdown.clone());

        tokio::spawn(async move {
            tokio::pin!(stop);
            spawn_refresh(&follower, None);

            loop {
                tokio::select! {
                    _ = follower.outbox.closed() => break,
                    _ = &mut stop => {
                        debug!(viewer = %follower.id, "closing live viewer for shutdown");
                        break;
                    }
                    received = events.recv() => match received {
                        Ok(event) => spawn_refresh(&follower, Some(event)),
                        Err(RecvError::Lagged(skipped)) => {
                            warn!(viewer = %follower.id, skipped, "live viewer lagged behind event bus");
                            spawn_refresh(&follower, None);
                        }
                        Err(RecvError::Closed) => break,
                    },
                }
            }

            sessions.remove(follower.id());
            debug!(viewer = %follower.id, "live viewer disconnected");
        });

        (session, inbox)
    }

    pub fn get(&self, id: &str) -> Option<Arc<ViewerSession>> {
        self.sessions.get(id).map(|entry| Arc::clone(entry.value()))
    }

    pub fn len(&self) -> usize {
        self.sessions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sessions.is_empty()
    }
}

async fn stopped(mut shutdown: watch::Receiver<bool>) {
    if shutdown.wait_for(|stop| *stop).await.is_err() {
        std::future::pending::<()>().await;
    }
}

fn spawn_refresh(session: &Arc<ViewerSession>, event: Option<Arc<LiveEvent>>) {
    let session = Arc::clone(session);
    tokio::spawn(async move {
        match event {
            Some(event) => session.handle_event(&event).await,
            None => session.refresh().await,
        };
    });
}
