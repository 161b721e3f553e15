use futures::future::BoxFuture;
use reqwest::Client;
use serde_json::{json, Value};
use std::time::Duration;
use tokio::time::sleep;
use tracing::{debug, trace, warn};

use crate::probe::{is_port_open, report_network_issue};
use crate::retry::RetryPolicy;
use crate::{LmsError, ServerSettings, StatusSnapshot};

/// Request ID for LMS JSON-RPC calls
const LMS_REQUEST_ID: i32 = 1;
/// Tracks requested from the playlist window (current one first)
const PLAYLIST_WINDOW: u32 = 10;
const STATUS_TAGS: &str = "tags:adKl";

/// Anything that can produce a fresh status snapshot. The sync uses
/// [`StatusFetcher`]; tests substitute their own.
pub trait StatusSource: Send + Sync {
    fn fetch_status<'a>(
        &'a self,
        settings: &'a ServerSettings,
    ) -> BoxFuture<'a, Option<StatusSnapshot>>;
}

/// JSON-RPC body of the `status` query.
pub fn status_request_body(player_id: &str) -> Value {
    json!({
        "method": "slim.request",
        "params": [player_id, ["status", "-", PLAYLIST_WINDOW, STATUS_TAGS]],
        "id": LMS_REQUEST_ID
    })
}

/// Queries `jsonrpc.js` over a pooled HTTP client with retry.
#[derive(Debug, Clone)]
pub struct StatusFetcher {
    client: Client,
    retry: RetryPolicy,
    probe_timeout: Duration,
}

impl StatusFetcher {
    pub fn new(request_timeout: Duration, retry: RetryPolicy, probe_timeout: Duration) -> Self {
        let client = Client::builder()
            .pool_idle_timeout(Some(Duration::from_secs(90)))
            .timeout(request_timeout)
            .connect_timeout(request_timeout)
            .build()
            .unwrap_or_else(|e| {
                warn!(error = %e, "Failed to build configured HTTP client, using defaults");
                Client::new()
            });
        Self::with_client(client, retry, probe_timeout)
    }

    pub fn with_client(client: Client, retry: RetryPolicy, probe_timeout: Duration) -> Self {
        Self {
            client,
            retry,
            probe_timeout,
        }
    }

    /// Fetch the current status, or `None` when the server is unreachable or
    /// answers with something unusable. Failures are logged, never returned.
    pub async fn fetch(&self, settings: &ServerSettings) -> Option<StatusSnapshot> {
        if !is_port_open(&settings.host, settings.json_port, self.probe_timeout).await {
            report_network_issue(&format!(
                "LMS server port {} is not open, skipping status request",
                settings.json_port
            ));
            return None;
        }

        match self.fetch_with_retry(settings).await {
            Ok(snapshot) => Some(snapshot),
            Err(e) => {
                report_network_issue(&format!("Failed to fetch LMS status: {e}"));
                None
            }
        }
    }

    async fn fetch_with_retry(&self, settings: &ServerSettings) -> Result<StatusSnapshot, LmsError> {
        let attempts = self.retry.max_attempts.max(1);
        let mut attempt = 1;
        loop {
            match self.fetch_once(settings).await {
                Ok(snapshot) => return Ok(snapshot),
                Err(e) if attempt < attempts && self.retry.should_retry(&e) => {
                    let delay = self.retry.backoff(attempt);
                    warn!(error = %e, attempt, ?delay, "Status request failed, retrying");
                    sleep(delay).await;
                    attempt += 1;
                }
                Err(e) if attempt > 1 => {
                    return Err(LmsError::RetriesExhausted {
                        attempts: attempt,
                        last: Box::new(e),
                    })
                }
                Err(e) => return Err(e),
            }
        }
    }

    async fn fetch_once(&self, settings: &ServerSettings) -> Result<StatusSnapshot, LmsError> {
        let url = settings.jsonrpc_url();
        let body = status_request_body(&settings.player_id);
        debug!(%url, player_id = %settings.player_id, "Sending status request");

        let response = self
            .client
            .post(&url)
            .header(reqwest::header::CONTENT_TYPE, "application/json")
            .json(&body)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            return Err(LmsError::HttpStatus(status.as_u16()));
        }

        let bytes = response.bytes().await?;
        let value: Value = serde_json::from_slice(&bytes)?;
        if !value.is_object() {
            return Err(LmsError::InvalidResponse(format!(
                "expected a JSON object, got: {}",
                String::from_utf8_lossy(&bytes)
            )));
        }
        trace!(response = %value, "Full status response");
        Ok(StatusSnapshot::new(value))
    }
}

impl StatusSource for StatusFetcher {
    fn fetch_status<'a>(
        &'a self,
        settings: &'a ServerSettings,
    ) -> BoxFuture<'a, Option<StatusSnapshot>> {
        Box::pin(self.fetch(settings))
    }
}
