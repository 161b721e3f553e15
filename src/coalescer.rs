use futures::FutureExt;
use std::panic::AssertUnwindSafe;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;
use tokio::sync::{broadcast, Mutex};
use tracing::{debug, error, info, trace, warn};

use crate::fetcher::StatusSource;
use crate::projector::project;
use crate::queue::EventQueue;
use crate::state::{CallbackSlot, ShutdownSignal};
use crate::{RawEvent, SettingsProvider, StatusUpdate, SyncConfig};

/// Fetch, project and notify. One refresh body runs at a time, whoever
/// triggers it.
pub(crate) struct Refresher {
    pub(crate) settings: Arc<dyn SettingsProvider>,
    pub(crate) source: Arc<dyn StatusSource>,
    pub(crate) callback: CallbackSlot,
    pub(crate) updates: broadcast::Sender<StatusUpdate>,
    pub(crate) stale_after_failures: u32,
    failures: AtomicU32,
    in_flight: Mutex<()>,
}

impl Refresher {
    pub(crate) fn new(
        settings: Arc<dyn SettingsProvider>,
        source: Arc<dyn StatusSource>,
        callback: CallbackSlot,
        updates: broadcast::Sender<StatusUpdate>,
        stale_after_failures: u32,
    ) -> Self {
        Self {
            settings,
            source,
            callback,
            updates,
            stale_after_failures,
            failures: AtomicU32::new(0),
            in_flight: Mutex::new(()),
        }
    }

    /// Run one refresh. A panic anywhere inside (including the user callback)
    /// is logged and swallowed.
    pub(crate) async fn refresh(&self, trigger: Option<&RawEvent>) {
        let _guard = self.in_flight.lock().await;
        let outcome = AssertUnwindSafe(self.refresh_inner()).catch_unwind().await;
        if let Err(panic) = outcome {
            let reason = panic
                .downcast_ref::<&str>()
                .map(|s| s.to_string())
                .or_else(|| panic.downcast_ref::<String>().cloned())
                .unwrap_or_else(|| "unknown panic".to_string());
            error!(
                trigger = ?trigger.map(ToString::to_string),
                %reason,
                "Refresh handler panicked, continuing"
            );
        }
    }

    async fn refresh_inner(&self) {
        let settings = self.settings.current();
        let update = match self.source.fetch_status(&settings).await {
            Some(snapshot) => {
                self.failures.store(0, Ordering::SeqCst);
                let update = project(&snapshot, &settings);
                match &update.now_playing {
                    Some(now_playing) => info!("{}", now_playing),
                    None => warn!("No 'now playing' information available."),
                }
                update
            }
            None => {
                let failures = self.failures.fetch_add(1, Ordering::SeqCst) + 1;
                if failures == self.stale_after_failures {
                    warn!(failures, "Status unavailable, clearing the display");
                    StatusUpdate::cleared()
                } else {
                    debug!(failures, "Status unavailable, keeping last display state");
                    return;
                }
            }
        };
        self.publish(update).await;
    }

    async fn publish(&self, update: StatusUpdate) {
        // Nobody listening is fine
        let _ = self.updates.send(update.clone());
        match self.callback.current().await {
            Some(callback) => callback(update.now_playing, update.playlist),
            None => trace!("No update callback registered"),
        }
    }
}

/// Consumer side of the queue: wakes on new events and refreshes once per
/// drained event.
pub(crate) struct Coalescer {
    pub(crate) queue: Arc<EventQueue>,
    pub(crate) refresher: Arc<Refresher>,
    pub(crate) shutdown: Arc<ShutdownSignal>,
    pub(crate) config: SyncConfig,
}

impl Coalescer {
    pub(crate) async fn run(self) {
        info!("Event coalescer started.");
        while !self.shutdown.is_set() {
            // A timeout still drains below, in case signals were merged
            self.queue
                .wait_available(self.config.signal_wait_timeout)
                .await;
            if self.shutdown.is_set() {
                break;
            }

            let batch = self
                .queue
                .drain_batch(self.config.batch_size, self.config.queue_item_timeout)
                .await;
            if batch.is_empty() {
                continue;
            }
            debug!(
                events = batch.len(),
                still_queued = self.queue.len(),
                "Processing event batch"
            );

            for event in &batch {
                if self.shutdown.is_set() {
                    debug!("Shutdown requested, abandoning rest of batch");
                    break;
                }
                self.refresher.refresh(Some(event)).await;
            }
        }
        info!("Event coalescer finished.");
    }
}
