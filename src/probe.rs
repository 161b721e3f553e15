use std::time::Duration;
use tokio::net::TcpStream;
use tokio::time::timeout;
use tracing::{debug, error};

pub const DEFAULT_PROBE_TIMEOUT: Duration = Duration::from_secs(2);

/// Check whether `host:port` currently accepts TCP connections.
///
/// Opens and immediately drops a connection. Timeouts, refusals and resolution
/// failures all yield `false` and are logged as network issues at DEBUG;
/// callers decide how loudly to repeat them.
pub async fn is_port_open(host: &str, port: u16, probe_timeout: Duration) -> bool {
    if host.is_empty() || port == 0 {
        log_network_issue(&format!("no usable address configured ({host:?}:{port})"));
        return false;
    }

    match timeout(probe_timeout, TcpStream::connect((host, port))).await {
        Ok(Ok(stream)) => {
            debug!(host, port, "Port is open");
            drop(stream);
            true
        }
        Ok(Err(e)) => {
            log_network_issue(&format!("{host}:{port} is not reachable: {e}"));
            false
        }
        Err(_) => {
            log_network_issue(&format!(
                "{host}:{port} did not answer within {:?}",
                probe_timeout
            ));
            false
        }
    }
}

fn log_network_issue(message: &str) {
    debug!("Network issue: {}", message);
}

/// Loud variant used by callers once they give up on an operation.
pub(crate) fn report_network_issue(message: &str) {
    error!("Network issue: {}", message);
}
