//! Loopback stand-ins for the two LMS interfaces the sync talks to.
#![allow(dead_code)]

use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, AsyncReadExt, AsyncWriteExt, BufReader};
use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};
use tokio::net::TcpListener;
use tokio::sync::mpsc;
use tokio::time::{sleep, timeout, Instant};

pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_max_level(tracing::Level::DEBUG)
        .with_test_writer()
        .try_init();
}

/// A port nothing listens on (bound once, then released).
pub async fn closed_port() -> u16 {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    listener.local_addr().unwrap().port()
}

/// Poll `cond` until it holds or `limit` passes.
pub async fn wait_until<F: Fn() -> bool>(limit: Duration, cond: F) -> bool {
    let deadline = Instant::now() + limit;
    while Instant::now() < deadline {
        if cond() {
            return true;
        }
        sleep(Duration::from_millis(10)).await;
    }
    cond()
}

/// One client connection to the fake CLI that sent at least one line.
/// Liveness probes connect and leave without a word, so they never show up.
pub struct CliSession {
    reader: BufReader<OwnedReadHalf>,
    writer: OwnedWriteHalf,
    pub first_line: String,
}

impl CliSession {
    pub async fn send(&mut self, line: &str) {
        self.writer.write_all(line.as_bytes()).await.unwrap();
        self.writer.write_all(b"\n").await.unwrap();
        self.writer.flush().await.unwrap();
    }

    /// Next line from the client, `None` on EOF or after `limit`.
    pub async fn read_line(&mut self, limit: Duration) -> Option<String> {
        let mut line = String::new();
        match timeout(limit, self.reader.read_line(&mut line)).await {
            Ok(Ok(n)) if n > 0 => Some(line.trim_end().to_string()),
            _ => None,
        }
    }
}

/// Fake LMS command-line interface.
pub struct FakeCli {
    pub port: u16,
    sessions: mpsc::UnboundedReceiver<CliSession>,
}

impl FakeCli {
    pub async fn start() -> Self {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();
        let (tx, rx) = mpsc::unbounded_channel();

        tokio::spawn(async move {
            loop {
                let Ok((stream, _)) = listener.accept().await else {
                    return;
                };
                let tx = tx.clone();
                tokio::spawn(async move {
                    let (read_half, writer) = stream.into_split();
                    let mut reader = BufReader::new(read_half);
                    let mut first_line = String::new();
                    match timeout(Duration::from_secs(5), reader.read_line(&mut first_line)).await
                    {
                        Ok(Ok(n)) if n > 0 => {
                            let _ = tx.send(CliSession {
                                reader,
                                writer,
                                first_line: first_line.trim_end().to_string(),
                            });
                        }
                        // Probe connection, nothing to hand out
                        _ => {}
                    }
                });
            }
        });

        Self { port, sessions: rx }
    }

    pub async fn next_session(&mut self, limit: Duration) -> CliSession {
        timeout(limit, self.sessions.recv())
            .await
            .expect("no client subscribed in time")
            .expect("fake CLI stopped")
    }

    pub async fn try_next_session(&mut self, limit: Duration) -> Option<CliSession> {
        timeout(limit, self.sessions.recv()).await.ok().flatten()
    }
}

/// A request captured by [`FakeJsonRpc`].
#[derive(Debug, Clone)]
pub struct CapturedRequest {
    pub request_line: String,
    pub content_type: Option<String>,
    pub body: String,
}

/// Fake `jsonrpc.js` endpoint answering with a scripted list of responses.
/// The last response repeats once the script runs out.
pub struct FakeJsonRpc {
    pub port: u16,
    pub requests: Arc<Mutex<Vec<CapturedRequest>>>,
}

impl FakeJsonRpc {
    pub async fn start(script: Vec<(u16, String)>) -> Self {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();
        let requests = Arc::new(Mutex::new(Vec::new()));
        let script = Arc::new(script);

        let captured = requests.clone();
        tokio::spawn(async move {
            loop {
                let Ok((stream, _)) = listener.accept().await else {
                    return;
                };
                let captured = captured.clone();
                let script = script.clone();
                tokio::spawn(async move {
                    let (read_half, mut writer) = stream.into_split();
                    let mut reader = BufReader::new(read_half);

                    let Some(request) = read_request(&mut reader).await else {
                        return; // probe
                    };
                    let index = {
                        let mut guard = captured.lock().unwrap();
                        guard.push(request);
                        guard.len() - 1
                    };
                    let (status, body) = script
                        .get(index)
                        .or_else(|| script.last())
                        .cloned()
                        .unwrap_or((200, "{}".to_string()));

                    let response = format!(
                        "HTTP/1.1 {} Scripted\r\nContent-Type: application/json\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{}",
                        status,
                        body.len(),
                        body
                    );
                    let _ = writer.write_all(response.as_bytes()).await;
                    let _ = writer.flush().await;
                    let _ = writer.shutdown().await;
                    // Let the client read everything before the socket goes away
                    let mut sink = [0u8; 256];
                    let _ = timeout(Duration::from_millis(200), reader.read(&mut sink)).await;
                });
            }
        });

        Self { port, requests }
    }

    pub fn request_count(&self) -> usize {
        self.requests.lock().unwrap().len()
    }
}

async fn read_request(reader: &mut BufReader<OwnedReadHalf>) -> Option<CapturedRequest> {
    let mut request_line = String::new();
    match timeout(Duration::from_secs(5), reader.read_line(&mut request_line)).await {
        Ok(Ok(n)) if n > 0 => {}
        _ => return None,
    }

    let mut content_length = 0usize;
    let mut content_type = None;
    loop {
        let mut header = String::new();
        match reader.read_line(&mut header).await {
            Ok(n) if n > 0 => {}
            _ => return None,
        }
        let header = header.trim_end();
        if header.is_empty() {
            break;
        }
        if let Some((name, value)) = header.split_once(':') {
            let name = name.trim().to_ascii_lowercase();
            let value = value.trim().to_string();
            if name == "content-length" {
                content_length = value.parse().unwrap_or(0);
            } else if name == "content-type" {
                content_type = Some(value);
            }
        }
    }

    let mut body = vec![0u8; content_length];
    reader.read_exact(&mut body).await.ok()?;
    Some(CapturedRequest {
        request_line: request_line.trim_end().to_string(),
        content_type,
        body: String::from_utf8_lossy(&body).into_owned(),
    })
}
