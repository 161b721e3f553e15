use std::time::Duration;
use tokio::sync::{mpsc, Mutex, Notify};
use tokio::time::timeout;
use tracing::trace;

use crate::state::ShutdownSignal;
use crate::{LmsError, RawEvent};

/// Fixed capacity of the hand-off between connector and coalescer.
pub const EVENT_QUEUE_CAPACITY: usize = 5;

/// Bounded FIFO between the connector (producer) and the coalescer (consumer).
///
/// A full queue blocks the producer until the consumer takes an entry. The
/// connector stops reading the socket while blocked, so a stuck consumer
/// stalls event ingestion instead of growing memory; events are never
/// dropped. Only shutdown releases a blocked producer.
pub(crate) struct EventQueue {
    tx: mpsc::Sender<RawEvent>,
    rx: Mutex<mpsc::Receiver<RawEvent>>,
    available: Notify,
}

impl EventQueue {
    pub(crate) fn new() -> Self {
        let (tx, rx) = mpsc::channel(EVENT_QUEUE_CAPACITY);
        Self {
            tx,
            rx: Mutex::new(rx),
            available: Notify::new(),
        }
    }

    /// Entries currently waiting.
    pub(crate) fn len(&self) -> usize {
        self.tx.max_capacity() - self.tx.capacity()
    }

    /// Enqueue and signal availability, waiting as long as the queue is full.
    pub(crate) async fn push(
        &self,
        event: RawEvent,
        shutdown: &ShutdownSignal,
    ) -> Result<(), LmsError> {
        tokio::select! {
            biased;
            _ = shutdown.wait() => {
                trace!("Shutdown while waiting for queue space, dropping pending event.");
                return Err(LmsError::ConnectionClosed);
            }
            res = self.tx.send(event) => {
                res.map_err(|_| LmsError::ConnectionClosed)?;
            }
        }
        self.available.notify_one();
        Ok(())
    }

    /// Wait up to `wait` for an availability signal. False on timeout.
    pub(crate) async fn wait_available(&self, wait: Duration) -> bool {
        timeout(wait, self.available.notified()).await.is_ok()
    }

    /// Wake a consumer blocked in `wait_available`.
    pub(crate) fn wake(&self) {
        self.available.notify_one();
    }

    /// Take up to `max` events, giving each at most `item_timeout` to arrive.
    /// An empty queue simply ends the batch.
    pub(crate) async fn drain_batch(&self, max: usize, item_timeout: Duration) -> Vec<RawEvent> {
        let mut rx = self.rx.lock().await;
        let mut batch = Vec::with_capacity(max.min(EVENT_QUEUE_CAPACITY * 2));
        while batch.len() < max {
            match timeout(item_timeout, rx.recv()).await {
                Ok(Some(event)) => batch.push(event),
                // Closed channel or nothing arrived in time: end of batch
                Ok(None) | Err(_) => break,
            }
        }
        batch
    }
}
