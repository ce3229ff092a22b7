//! Periodic lock-window re-check.
//!
//! A cooperative poll that publishes the event's `WindowStatus` on a watch
//! channel. It only ever tightens (Open -> Locked) and exits once the event
//! is locked, so it can run on any schedule.

use crate::models::Event;
use crate::window::{Clock, WindowStatus};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, info};

/// Default poll interval (once per minute).
pub const DEFAULT_LOCK_POLL_INTERVAL: Duration = Duration::from_secs(60);

pub struct LockWatcher {
    pub status: watch::Receiver<WindowStatus>,
    pub handle: JoinHandle<()>,
}

impl LockWatcher {
    /// Start watching `event`. The receiver starts with the current status.
    pub fn spawn(event: Event, clock: Arc<dyn Clock>, poll_interval: Duration) -> Self {
        let initial = WindowStatus::evaluate(&event, clock.now());
        let (tx, rx) = watch::channel(initial);

        let handle = tokio::spawn(async move {
            if initial == WindowStatus::Locked {
                debug!("Event {} already locked, watcher not started", event.id);
                return;
            }

            let mut interval = tokio::time::interval(poll_interval);
            // First tick fires immediately and the status is already known.
            interval.tick().await;

            loop {
                interval.tick().await;
                let observed = WindowStatus::evaluate(&event, clock.now());
                if observed == WindowStatus::Locked {
                    info!("Picks locked for event {} ({})", event.id, event.title);
                    // Receivers may all be gone; nothing left to notify then.
                    let _ = tx.send(WindowStatus::Locked);
                    return;
                }
                if tx.is_closed() {
                    debug!("Lock watcher for event {} has no listeners, stopping", event.id);
                    return;
                }
            }
        });

        Self { status: rx, handle }
    }

    pub fn current(&self) -> WindowStatus {
        *self.status.borrow()
    }
}

impl Drop for LockWatcher {
    fn drop(&mut self) {
        self.handle.abort();
    }
}
