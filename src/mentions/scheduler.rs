use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, info};

use super::checker::MentionChecker;
use crate::storage::Storage;

/// Run [`MentionChecker::run`] every `interval` until `shutdown` flips to true.
/// The first run happens one interval after start.
pub fn spawn_mention_scheduler(
    checker: Arc<MentionChecker>,
    storage: Arc<dyn Storage>,
    interval: Duration,
    mut shutdown: watch::Receiver<bool>,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(interval.max(Duration::from_secs(1)));

        // Skip the first tick which fires immediately
        ticker.tick().await;

        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    debug!(brands = checker.brands().len(), "running scheduled brand mention check");
                    let stored = checker.run(storage.as_ref()).await;
                    info!(stored = stored.len(), "scheduled brand mention check finished");
                }
                changed = shutdown.changed() => {
                    if changed.is_err() || *shutdown.borrow() {
                        info!("Brand mention scheduler shutting down");
                        break;
                    }
                }
            }
        }
    })
}
