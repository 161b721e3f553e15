use std::sync::{
    atomic::{AtomicBool, Ordering},
    Arc,
};
use tokio::sync::{Notify, RwLock};

use crate::{NowPlaying, PlaylistEntry};

/// Callback invoked with every projected refresh.
pub type UpdateCallback = Arc<dyn Fn(Option<NowPlaying>, Vec<PlaylistEntry>) + Send + Sync + 'static>;

/// Lifecycle of the event stream connection.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConnectionState {
    Disconnected,
    Connecting,
    Connected,
    /// Terminal: shutdown was requested.
    Stopped,
}

/// Set-once stop flag shared by both workers.
///
/// The flag is the source of truth; the notifier only shortens waits.
#[derive(Debug, Default)]
pub(crate) struct ShutdownSignal {
    flag: AtomicBool,
    notify: Notify,
}

impl ShutdownSignal {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    /// Returns true only for the call that actually set the flag.
    pub(crate) fn trigger(&self) -> bool {
        let first = !self.flag.swap(true, Ordering::SeqCst);
        self.notify.notify_waiters();
        first
    }

    pub(crate) fn is_set(&self) -> bool {
        self.flag.load(Ordering::SeqCst)
    }

    /// Resolves once the flag is set.
    pub(crate) async fn wait(&self) {
        let notified = self.notify.notified();
        tokio::pin!(notified);
        // Register before checking the flag so a concurrent trigger can't slip between
        notified.as_mut().enable();
        if self.is_set() {
            return;
        }
        notified.await;
    }
}

/// Lock-guarded slot for the UI callback.
#[derive(Clone, Default)]
pub(crate) struct CallbackSlot {
    inner: Arc<RwLock<Option<UpdateCallback>>>,
}

impl CallbackSlot {
    pub(crate) async fn replace(&self, callback: Option<UpdateCallback>) {
        let mut guard = self.inner.write().await;
        *guard = callback;
    }

    /// Clone of the current callback; invoked after the lock is released.
    pub(crate) async fn current(&self) -> Option<UpdateCallback> {
        self.inner.read().await.clone()
    }
}
