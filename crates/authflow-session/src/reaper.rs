//! Background purge of expired sessions.
//!
//! Expired sessions are invisible as soon as their deadline passes; the
//! reaper only reclaims the storage they occupy.

use std::time::Duration;

use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::{MissedTickBehavior, interval};
use tracing::{debug, info, warn};

use crate::store::SessionStore;

/// Periodic task that purges expired sessions.
pub(crate) struct SessionReaper {
    store: SessionStore,
    interval: Duration,
}

impl SessionReaper {
    /// Create a new reaper for `store`. `interval` must be non-zero.
    pub(crate) fn new(store: SessionStore, interval: Duration) -> Self {
        Self { store, interval }
    }

    /// Start the reaper in a background task.
    ///
    /// Returns a handle used to stop the task.
    pub fn start(self) -> ReaperHandle {
        let (shutdown_tx, mut shutdown_rx) = watch::channel(false);

        let task = tokio::spawn(async move {
            info!(
                interval_ms = self.interval.as_millis() as u64,
                backend = self.store.backend_name(),
                "Session reaper started"
            );

            let mut ticker = interval(self.interval);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

            loop {
                tokio::select! {
                    _ = ticker.tick() => {
                        match self.store.purge_expired().await {
                            Ok(deleted) => debug!(deleted, "Session reaper tick completed"),
                            Err(e) => warn!(error = %e, "Session reaper tick failed"),
                        }
                    }
                    changed = shutdown_rx.changed() => {
                        if changed.is_err() || *shutdown_rx.borrow() {
                            info!("Session reaper shutting down");
                            break;
                        }
                    }
                }
            }
        });

        ReaperHandle { shutdown_tx, task }
    }
}

/// Handle to a running session reaper.
///
/// Dropping the handle also stops the reaper.
pub struct ReaperHandle {
    shutdown_tx: watch::Sender<bool>,
    task: JoinHandle<()>,
}

impl ReaperHandle {
    /// Signals the reaper to stop and waits for it to finish.
    pub async fn shutdown(self) {
        let _ = self.shutdown_tx.send(true);
        if let Err(e) = self.task.await {
            warn!(error = %e, "Session reaper task ended abnormally");
        }
    }

    /// Returns `true` if the background task has finished.
    #[must_use]
    pub fn is_finished(&self) -> bool {
        self.task.is_finished()
    }
}
