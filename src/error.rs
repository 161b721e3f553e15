use thiserror::Error;

// Basic error handling with thiserror
#[derive(Error, Debug)]
pub enum LmsError {
    #[error("HTTP request failed: {0}")]
    RequestFailed(#[from] reqwest::Error),

    #[error("JSON parsing failed: {0}")]
    ParseFailed(#[from] serde_json::Error),

    #[error("I/O error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("Port {port} on {host} is not accepting connections")]
    PortClosed { host: String, port: u16 },

    #[error("Server answered with HTTP {0}")]
    HttpStatus(u16),

    #[error("Giving up after {attempts} attempts: {last}")]
    RetriesExhausted { attempts: u32, last: Box<LmsError> },

    #[error("Connection explicitly closed or terminated")]
    ConnectionClosed, // Shutdown requested while an operation was pending

    #[error("Invalid response: {0}")]
    InvalidResponse(String),
}

impl LmsError {
    /// Transient failures worth another attempt: connection-level errors and
    /// the gateway-ish 5xx statuses LMS returns while it is busy scanning.
    pub fn is_retryable(&self) -> bool {
        match self {
            LmsError::RequestFailed(e) => e.is_connect() || e.is_timeout(),
            LmsError::HttpStatus(code) => matches!(code, 500 | 502 | 504),
            LmsError::IoError(_) | LmsError::PortClosed { .. } => true,
            _ => false,
        }
    }
}
