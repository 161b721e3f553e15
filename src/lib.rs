mod codec;
pub use codec::{EventLineCodec, MAX_LINE_LENGTH};
mod coalescer;
mod connector;
mod error;
pub use error::LmsError;
mod events;
pub use events::RawEvent;
mod fetcher;
pub use fetcher::{status_request_body, StatusFetcher, StatusSource};
pub mod models;
pub use models::{NowPlaying, PlaylistEntry, StatusSnapshot, StatusUpdate, DEFAULT_ARTWORK_PATH};
mod probe;
pub use probe::{is_port_open, DEFAULT_PROBE_TIMEOUT};
mod projector;
pub use projector::{project, project_now_playing, project_playlist};
mod queue;
pub use queue::EVENT_QUEUE_CAPACITY;
mod retry;
pub use retry::RetryPolicy;
mod settings;
pub use settings::{
    EnvSettings, ServerSettings, SettingsProvider, SharedSettings, SyncConfig, ENV_CONFIG,
};
mod state;
pub use state::{ConnectionState, UpdateCallback};

use std::sync::Arc;
use tokio::sync::{broadcast, watch, RwLock};
use tokio::task::JoinHandle;
use tokio::time::{timeout, Duration};
use tracing::{debug, info, warn};

use coalescer::{Coalescer, Refresher};
use connector::{Connector, EventConnection};
use queue::EventQueue;
use retry::RetryLogThrottle;
use state::{CallbackSlot, ShutdownSignal};

const UPDATE_BUFFER_CAPACITY: usize = 16;

/// Keeps a Now Playing display in sync with a Logitech/Lyrion Media Server.
///
/// Two background tasks do the work: a connector that holds a subscription on
/// the server's CLI port and queues `playlist newsong` notifications, and a
/// coalescer that drains those notifications in batches and, for each one,
/// fetches `status` over JSON-RPC, projects it and hands the result to the
/// registered callback.
///
/// # Logging
///
/// This library uses the `tracing` crate for logging. To enable logs, you'll need to
/// initialize a tracing subscriber in your application.
///
/// Example using `tracing_subscriber`:
/// ```no_run
/// use tracing::Level;
/// use tracing_subscriber::FmtSubscriber;
///
/// let subscriber = FmtSubscriber::builder()
///     .with_max_level(Level::DEBUG)
///     .finish();
///
/// tracing::subscriber::set_global_default(subscriber)
///     .expect("Failed to set tracing subscriber");
/// ```
///
/// # Example
///
/// ```no_run
/// use lms_now_playing::{ServerSettings, StatusSync, SyncConfig};
///
/// # async fn run() {
/// let settings = ServerSettings::new("10.0.0.5", 9000, 9090, "aa:bb:cc:dd:ee:ff");
/// let sync = StatusSync::new(settings, SyncConfig::default());
/// sync.set_update_callback(|now_playing, playlist| {
///     println!("{:?} ({} queued)", now_playing.map(|n| n.title), playlist.len());
/// })
/// .await;
/// sync.start().await;
/// // ... later, once
/// sync.close().await;
/// # }
/// ```
pub struct StatusSync {
    settings: Arc<dyn SettingsProvider>,
    config: SyncConfig,
    queue: Arc<EventQueue>,
    refresher: Arc<Refresher>,
    callback: CallbackSlot,
    update_sender: broadcast::Sender<StatusUpdate>,
    // Set once by close() or drop, never cleared
    shutdown: Arc<ShutdownSignal>,
    connector_task: RwLock<Option<JoinHandle<Option<EventConnection>>>>,
    coalescer_task: RwLock<Option<JoinHandle<()>>>,
    connection_state_tx: Arc<watch::Sender<ConnectionState>>,
    connection_state_rx: watch::Receiver<ConnectionState>,
}

impl StatusSync {
    /// Create a sync that fetches status with the built-in JSON-RPC client.
    pub fn new<S>(settings: S, config: SyncConfig) -> Self
    where
        S: SettingsProvider + 'static,
    {
        let fetcher = StatusFetcher::new(
            config.request_timeout,
            config.http_retry.clone(),
            config.probe_timeout,
        );
        Self::with_status_source(Arc::new(settings), config, Arc::new(fetcher))
    }

    /// Configure everything from `LMS_*` environment variables.
    pub fn from_env() -> Self {
        Self::new(EnvSettings, ENV_CONFIG.clone())
    }

    /// Create a sync with a custom status source.
    pub fn with_status_source(
        settings: Arc<dyn SettingsProvider>,
        config: SyncConfig,
        source: Arc<dyn StatusSource>,
    ) -> Self {
        let (update_tx, _) = broadcast::channel(UPDATE_BUFFER_CAPACITY);
        let (state_tx, state_rx) = watch::channel(ConnectionState::Disconnected);
        let callback = CallbackSlot::default();
        let refresher = Arc::new(Refresher::new(
            settings.clone(),
            source,
            callback.clone(),
            update_tx.clone(),
            config.stale_after_failures,
        ));

        Self {
            settings,
            config,
            queue: Arc::new(EventQueue::new()),
            refresher,
            callback,
            update_sender: update_tx,
            shutdown: Arc::new(ShutdownSignal::new()),
            connector_task: RwLock::new(None),
            coalescer_task: RwLock::new(None),
            connection_state_tx: Arc::new(state_tx),
            connection_state_rx: state_rx,
        }
    }

    /// Replace the UI notification target. Safe before or after `start()`.
    pub async fn set_update_callback<F>(&self, callback: F)
    where
        F: Fn(Option<NowPlaying>, Vec<PlaylistEntry>) + Send + Sync + 'static,
    {
        self.callback.replace(Some(Arc::new(callback))).await;
        debug!("Update callback set.");
    }

    pub async fn clear_update_callback(&self) {
        self.callback.replace(None).await;
        debug!("Update callback cleared.");
    }

    /// Every projected update, for consumers that prefer a channel.
    pub fn update_receiver(&self) -> broadcast::Receiver<StatusUpdate> {
        self.update_sender.subscribe()
    }

    /// Get the current state of the event stream connection.
    pub fn connection_state(&self) -> ConnectionState {
        self.connection_state_rx.borrow().clone()
    }

    pub fn connection_state_receiver(&self) -> watch::Receiver<ConnectionState> {
        self.connection_state_rx.clone()
    }

    pub fn config(&self) -> &SyncConfig {
        &self.config
    }

    pub fn is_closed(&self) -> bool {
        self.shutdown.is_set()
    }

    /// True while either background task is alive.
    pub async fn is_running(&self) -> bool {
        let connector = self.connector_task.read().await;
        let coalescer = self.coalescer_task.read().await;
        is_alive(connector.as_ref()) || is_alive(coalescer.as_ref())
    }

    /// Spawn the connector and coalescer tasks. Tasks that are already running
    /// are left alone, so calling this twice is harmless.
    pub async fn start(&self) {
        if self.shutdown.is_set() {
            warn!("start() called after close(), ignoring");
            return;
        }

        {
            let mut task_guard = self.connector_task.write().await;
            if is_alive(task_guard.as_ref()) {
                debug!("Connector task already running.");
            } else {
                let connector = Connector {
                    settings: self.settings.clone(),
                    config: self.config.clone(),
                    queue: self.queue.clone(),
                    shutdown: self.shutdown.clone(),
                    state_tx: self.connection_state_tx.clone(),
                    throttle: RetryLogThrottle::default(),
                };
                *task_guard = Some(tokio::spawn(connector.run()));
                info!("Connector task started.");
            }
        }

        {
            let mut task_guard = self.coalescer_task.write().await;
            if is_alive(task_guard.as_ref()) {
                debug!("Coalescer task already running.");
            } else {
                let coalescer = Coalescer {
                    queue: self.queue.clone(),
                    refresher: self.refresher.clone(),
                    shutdown: self.shutdown.clone(),
                    config: self.config.clone(),
                };
                *task_guard = Some(tokio::spawn(coalescer.run()));
                info!("Coalescer task started.");
            }
        }
    }

    /// Fetch and publish right away, e.g. when the display first opens.
    /// Serialized with the coalescer's refreshes.
    pub async fn refresh_now(&self) {
        if self.shutdown.is_set() {
            debug!("refresh_now() after close(), ignoring");
            return;
        }
        self.refresher.refresh(None).await;
    }

    /// Stop both tasks, unsubscribe and drop the connection.
    ///
    /// Waits at most `join_timeout` for the tasks; stragglers are logged and
    /// aborted. Safe to call repeatedly, or without a prior `start()`.
    pub async fn close(&self) {
        let first = self.shutdown.trigger();
        // Wake the coalescer if it's waiting for events
        self.queue.wake();
        if first {
            info!("Closing status sync.");
        } else {
            debug!("close() called again.");
        }

        let connector = self.connector_task.write().await.take();
        let coalescer = self.coalescer_task.write().await.take();
        let join_timeout = self.config.join_timeout;

        let (connection, ()) = tokio::join!(
            join_with_timeout(connector, join_timeout, "connector"),
            async {
                join_with_timeout(coalescer, join_timeout, "coalescer").await;
            }
        );

        if let Some(conn) = connection.flatten() {
            conn.close(&self.config.unsubscribe_command).await;
        }

        let _ = self
            .connection_state_tx
            .send_replace(ConnectionState::Stopped);
        if first {
            info!("Status sync closed.");
        }
    }
}

fn is_alive<T>(handle: Option<&JoinHandle<T>>) -> bool {
    handle.is_some_and(|h| !h.is_finished())
}

/// Await a task for at most `limit`. A task that overruns is aborted.
async fn join_with_timeout<T>(
    handle: Option<JoinHandle<T>>,
    limit: Duration,
    name: &str,
) -> Option<T> {
    let mut handle = handle?;
    match timeout(limit, &mut handle).await {
        Ok(Ok(value)) => {
            debug!("{} task joined.", name);
            Some(value)
        }
        Ok(Err(e)) => {
            warn!(error = %e, "{} task ended abnormally", name);
            None
        }
        Err(_) => {
            warn!(
                "{} task did not terminate within {:?}, aborting it",
                name, limit
            );
            handle.abort();
            None
        }
    }
}

impl std::fmt::Debug for StatusSync {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StatusSync")
            .field("settings", &self.settings.current())
            .field("state", &self.connection_state())
            .field("closed", &self.is_closed())
            .finish()
    }
}

// Make sure the background tasks wind down if the owner forgets close()
impl Drop for StatusSync {
    fn drop(&mut self) {
        if self.shutdown.trigger() {
            debug!("Dropping StatusSync without close(), signaling tasks to stop.");
        }
        self.queue.wake();
    }
}
