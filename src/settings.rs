use once_cell::sync::Lazy;
use std::sync::{Arc, RwLock};
use std::{env, time::Duration};
use tracing::warn;

use crate::probe::DEFAULT_PROBE_TIMEOUT;
use crate::retry::RetryPolicy;

pub const DEFAULT_JSON_PORT: u16 = 9000;
pub const DEFAULT_EVENT_PORT: u16 = 9090;
pub const DEFAULT_SUBSCRIBE_COMMAND: &str = "subscribe playlist";
pub const DEFAULT_UNSUBSCRIBE_COMMAND: &str = "subscribe 0";

/// Where to find the media server. Read fresh on every connect attempt and
/// every status fetch, so edits take effect without a restart.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServerSettings {
    pub host: String,
    pub json_port: u16,
    pub event_port: u16,
    pub player_id: String,
}

impl ServerSettings {
    pub fn new(host: &str, json_port: u16, event_port: u16, player_id: &str) -> Self {
        Self {
            host: host.to_string(),
            json_port,
            event_port,
            player_id: player_id.to_string(),
        }
    }

    /// Reads `LMS_SERVER`, `LMS_PORT`, `LMS_PLAYER_ID` and `LMS_TELNET_PORT`.
    /// Unparseable ports become 0, which the liveness probe reports as closed.
    pub fn from_env() -> Self {
        load_dotenv();

        fn parse_port(var: &str, default: u16) -> u16 {
            match env::var(var) {
                Ok(v) => v.trim().parse().unwrap_or_else(|_| {
                    warn!(var, value = %v, "Invalid port in environment, treating as unset port 0");
                    0
                }),
                Err(_) => default,
            }
        }

        Self {
            host: env::var("LMS_SERVER").unwrap_or_else(|_| "localhost".to_string()),
            json_port: parse_port("LMS_PORT", DEFAULT_JSON_PORT),
            event_port: parse_port("LMS_TELNET_PORT", DEFAULT_EVENT_PORT),
            player_id: env::var("LMS_PLAYER_ID").unwrap_or_default(),
        }
    }

    /// Base URL of the web/JSON-RPC interface.
    pub fn base_url(&self) -> String {
        format!("http://{}:{}", self.host, self.json_port)
    }

    pub fn jsonrpc_url(&self) -> String {
        format!("{}/jsonrpc.js", self.base_url())
    }
}

/// Configuration collaborator. The core never caches what this returns.
pub trait SettingsProvider: Send + Sync {
    fn current(&self) -> ServerSettings;
}

impl SettingsProvider for ServerSettings {
    fn current(&self) -> ServerSettings {
        self.clone()
    }
}

impl<F> SettingsProvider for F
where
    F: Fn() -> ServerSettings + Send + Sync,
{
    fn current(&self) -> ServerSettings {
        self()
    }
}

/// Re-reads the process environment on every call.
#[derive(Debug, Clone, Copy, Default)]
pub struct EnvSettings;

impl SettingsProvider for EnvSettings {
    fn current(&self) -> ServerSettings {
        ServerSettings::from_env()
    }
}

/// In-memory settings an operator (or a settings dialog) can edit while the
/// sync is running.
#[derive(Debug, Clone)]
pub struct SharedSettings {
    inner: Arc<RwLock<ServerSettings>>,
}

impl SharedSettings {
    pub fn new(settings: ServerSettings) -> Self {
        Self {
            inner: Arc::new(RwLock::new(settings)),
        }
    }

    pub fn update(&self, settings: ServerSettings) {
        match self.inner.write() {
            Ok(mut guard) => *guard = settings,
            Err(poisoned) => *poisoned.into_inner() = settings,
        }
    }
}

impl SettingsProvider for SharedSettings {
    fn current(&self) -> ServerSettings {
        match self.inner.read() {
            Ok(guard) => guard.clone(),
            Err(poisoned) => poisoned.into_inner().clone(),
        }
    }
}

/// Holds all tunables of the sync workers.
#[derive(Debug, Clone)]
pub struct SyncConfig {
    /// Pause between connect attempts while the event port is unreachable.
    pub retry_interval: Duration,
    pub probe_timeout: Duration,
    /// Upper bound on a single line read, so shutdown is noticed between reads.
    pub read_poll_interval: Duration,
    pub batch_size: usize,
    pub queue_item_timeout: Duration,
    pub signal_wait_timeout: Duration,
    pub join_timeout: Duration,
    pub request_timeout: Duration,
    /// Consecutive failed fetches before the display is cleared.
    pub stale_after_failures: u32,
    pub subscribe_command: String,
    pub unsubscribe_command: String,
    pub http_retry: RetryPolicy,
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            retry_interval: Duration::from_secs(5),
            probe_timeout: DEFAULT_PROBE_TIMEOUT,
            read_poll_interval: Duration::from_secs(1),
            batch_size: 10,
            queue_item_timeout: Duration::from_millis(100),
            signal_wait_timeout: Duration::from_secs(1),
            join_timeout: Duration::from_secs(5),
            request_timeout: Duration::from_secs(10),
            stale_after_failures: 3,
            subscribe_command: DEFAULT_SUBSCRIBE_COMMAND.to_string(),
            unsubscribe_command: DEFAULT_UNSUBSCRIBE_COMMAND.to_string(),
            http_retry: RetryPolicy::default(),
        }
    }
}

impl SyncConfig {
    /// Defaults overridden by `LMS_*` environment variables (and `.env`).
    pub fn from_env() -> Self {
        load_dotenv();
        let defaults = Self::default();

        // helper to parse usize
        fn parse_usize(var: &str, default: usize) -> usize {
            env::var(var)
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(default)
        }

        // helper to parse u32
        fn parse_u32(var: &str, default: u32) -> u32 {
            env::var(var)
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(default)
        }

        // helper to parse millis into Duration
        fn parse_millis(var: &str, default: Duration) -> Duration {
            env::var(var)
                .ok()
                .and_then(|v| v.parse::<u64>().ok())
                .map(Duration::from_millis)
                .unwrap_or(default)
        }

        // helper to parse seconds into Duration
        fn parse_secs(var: &str, default: Duration) -> Duration {
            env::var(var)
                .ok()
                .and_then(|v| v.parse::<u64>().ok())
                .map(Duration::from_secs)
                .unwrap_or(default)
        }

        SyncConfig {
            retry_interval: parse_secs("LMS_RETRY_INTERVAL_SECS", defaults.retry_interval),
            probe_timeout: parse_secs("LMS_PROBE_TIMEOUT_SECS", defaults.probe_timeout),
            read_poll_interval: parse_millis("LMS_READ_POLL_MS", defaults.read_poll_interval),
            batch_size: parse_usize("LMS_BATCH_SIZE", defaults.batch_size).max(1),
            queue_item_timeout: parse_millis("LMS_QUEUE_ITEM_MS", defaults.queue_item_timeout),
            signal_wait_timeout: defaults.signal_wait_timeout,
            join_timeout: parse_secs("LMS_JOIN_TIMEOUT_SECS", defaults.join_timeout),
            request_timeout: parse_secs("LMS_REQUEST_TIMEOUT_SECS", defaults.request_timeout),
            stale_after_failures: parse_u32(
                "LMS_STALE_AFTER_FAILURES",
                defaults.stale_after_failures,
            ),
            subscribe_command: env::var("LMS_SUBSCRIBE_COMMAND")
                .unwrap_or(defaults.subscribe_command),
            unsubscribe_command: env::var("LMS_UNSUBSCRIBE_COMMAND")
                .unwrap_or(defaults.unsubscribe_command),
            http_retry: defaults.http_retry,
        }
    }
}

/// Global tunables read once from the environment.
pub static ENV_CONFIG: Lazy<SyncConfig> = Lazy::new(SyncConfig::from_env);

static DOTENV: Lazy<()> = Lazy::new(|| {
    // optionally load .env
    let _ = dotenvy::dotenv();
});

fn load_dotenv() {
    Lazy::force(&DOTENV);
}
