use futures::StreamExt;
use std::sync::Arc;
use tokio::io::AsyncWriteExt;
use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};
use tokio::net::TcpStream;
use tokio::sync::watch;
use tokio::time::{sleep, timeout};
use tokio_util::codec::FramedRead;
use tracing::{debug, info, trace, warn};

use crate::probe::is_port_open;
use crate::queue::EventQueue;
use crate::retry::{jittered, RetryLogThrottle};
use crate::state::{ConnectionState, ShutdownSignal};
use crate::{EventLineCodec, LmsError, RawEvent, SettingsProvider, SyncConfig};

/// Live, subscribed connection to the LMS CLI port.
pub(crate) struct EventConnection {
    reader: FramedRead<OwnedReadHalf, EventLineCodec>,
    writer: OwnedWriteHalf,
    peer: String,
}

impl EventConnection {
    /// Connect and send the subscribe command.
    async fn open(host: &str, port: u16, config: &SyncConfig) -> Result<Self, LmsError> {
        let stream = timeout(config.probe_timeout, TcpStream::connect((host, port)))
            .await
            .map_err(|_| LmsError::PortClosed {
                host: host.to_string(),
                port,
            })??;
        let (read_half, write_half) = stream.into_split();
        let mut conn = Self {
            reader: FramedRead::new(read_half, EventLineCodec::new()),
            writer: write_half,
            peer: format!("{host}:{port}"),
        };
        conn.send_command(&config.subscribe_command).await?;
        Ok(conn)
    }

    async fn send_command(&mut self, command: &str) -> Result<(), LmsError> {
        trace!(peer = %self.peer, command, "Sending CLI command");
        self.writer.write_all(command.as_bytes()).await?;
        self.writer.write_all(b"\n").await?;
        self.writer.flush().await?;
        Ok(())
    }

    /// Best-effort unsubscribe, then close the socket.
    pub(crate) async fn close(mut self, unsubscribe_command: &str) {
        match self.send_command(unsubscribe_command).await {
            Ok(()) => debug!(peer = %self.peer, "Unsubscribed from LMS events"),
            // The peer may already be gone while we shut down
            Err(e) => debug!(peer = %self.peer, error = %e, "Unsubscribe not delivered (ignored)"),
        }
        if let Err(e) = self.writer.shutdown().await {
            debug!(peer = %self.peer, error = %e, "Error closing event connection (ignored)");
        }
        info!(peer = %self.peer, "Event connection closed");
    }
}

/// Everything the connector worker needs, cloned out of the controller.
pub(crate) struct Connector {
    pub(crate) settings: Arc<dyn SettingsProvider>,
    pub(crate) config: SyncConfig,
    pub(crate) queue: Arc<EventQueue>,
    pub(crate) shutdown: Arc<ShutdownSignal>,
    pub(crate) state_tx: Arc<watch::Sender<ConnectionState>>,
    pub(crate) throttle: RetryLogThrottle,
}

impl Connector {
    fn set_state(&self, state: ConnectionState) {
        self.state_tx.send_if_modified(|prev| {
            if *prev != state && *prev != ConnectionState::Stopped {
                *prev = state;
                true
            } else {
                false
            }
        });
    }

    /// Sleep for about the retry interval. Returns false if shutdown cut it short.
    async fn pause(&self) -> bool {
        tokio::select! {
            biased;
            _ = self.shutdown.wait() => false,
            _ = sleep(jittered(self.config.retry_interval)) => true,
        }
    }

    /// Keep trying until a subscribed connection is up. `None` only once
    /// shutdown has been requested.
    pub(crate) async fn connect(&self) -> Option<EventConnection> {
        let mut attempt: u32 = 0;
        loop {
            if self.shutdown.is_set() {
                return None;
            }
            self.set_state(ConnectionState::Connecting);
            attempt = attempt.saturating_add(1);
            let loud = self.throttle.is_loud(attempt);

            // Settings are re-read on every attempt so edits apply without restart
            let settings = self.settings.current();
            let (host, port) = (settings.host.as_str(), settings.event_port);

            if !is_port_open(host, port, self.config.probe_timeout).await {
                if loud {
                    warn!(
                        host,
                        port,
                        attempt,
                        "Network issue: LMS event port is not open, retrying in {:?}",
                        self.config.retry_interval
                    );
                } else {
                    debug!(host, port, attempt, "LMS event port still closed");
                }
                if !self.pause().await {
                    return None;
                }
                continue;
            }

            match EventConnection::open(host, port, &self.config).await {
                Ok(conn) => {
                    info!(host, port, attempt, "Connected to LMS event stream");
                    self.set_state(ConnectionState::Connected);
                    return Some(conn);
                }
                Err(e) => {
                    if loud {
                        warn!(
                            host,
                            port,
                            attempt,
                            error = %e,
                            "Connection failed, retrying in {:?}",
                            self.config.retry_interval
                        );
                    } else {
                        debug!(host, port, attempt, error = %e, "Connection failed again");
                    }
                    if !self.pause().await {
                        return None;
                    }
                }
            }
        }
    }

    /// Full worker: connect, then read until shutdown. The live connection is
    /// handed back so the controller can unsubscribe.
    pub(crate) async fn run(self) -> Option<EventConnection> {
        let conn = self.connect().await?;
        self.read_loop(conn).await
    }

    pub(crate) async fn read_loop(&self, mut conn: EventConnection) -> Option<EventConnection> {
        debug!(peer = %conn.peer, "Event read loop started.");
        loop {
            if self.shutdown.is_set() {
                break;
            }

            let next = tokio::select! {
                biased;
                _ = self.shutdown.wait() => break,
                next = timeout(self.config.read_poll_interval, conn.reader.next()) => next,
            };

            match next {
                // Nothing within the poll interval, check shutdown and read again
                Err(_) => continue,
                Ok(Some(Ok(line))) => {
                    if let Err(e) = self.handle_line(&line).await {
                        debug!(error = %e, "Event not queued, shutting down");
                        break;
                    }
                }
                Ok(Some(Err(e))) => {
                    if self.shutdown.is_set() {
                        break;
                    }
                    warn!(peer = %conn.peer, error = %e, "Connection lost, reconnecting...");
                    self.set_state(ConnectionState::Disconnected);
                    conn = self.connect().await?;
                }
                Ok(None) => {
                    if self.shutdown.is_set() {
                        break;
                    }
                    warn!(peer = %conn.peer, "Connection lost (EOF), reconnecting...");
                    self.set_state(ConnectionState::Disconnected);
                    conn = self.connect().await?;
                }
            }
        }
        debug!(peer = %conn.peer, "Event read loop finished.");
        Some(conn)
    }

    /// Parse one line and queue it if it announces a new song. Blocks while the
    /// queue is full; errors only when shutdown interrupts the wait.
    async fn handle_line(&self, line: &str) -> Result<(), LmsError> {
        let Some(event) = RawEvent::parse(line) else {
            trace!(line, "Ignoring unparseable event line");
            return Ok(());
        };
        if !event.is_new_song() {
            trace!(query = %event.query, param = %event.param, "Ignoring event");
            return Ok(());
        }
        info!(payload = %event.payload, "New song announced: {}", event);
        self.queue.push(event, &self.shutdown).await
    }
}
