use std::time::Duration;

use crate::LmsError;

/// HTTP retry behaviour of the status fetcher.
///
/// `max_attempts` counts the first request too. Between attempts the fetcher
/// sleeps `backoff_factor * 2^(retry - 1)` seconds, so the default policy waits
/// 0.3s and then 0.6s.
#[derive(Debug, Clone, PartialEq)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub backoff_factor: f64,
    pub retry_statuses: Vec<u16>,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            backoff_factor: 0.3,
            retry_statuses: vec![500, 502, 504],
        }
    }
}

impl RetryPolicy {
    /// Delay before retry number `retry` (1-based).
    pub fn backoff(&self, retry: u32) -> Duration {
        if retry == 0 {
            return Duration::ZERO;
        }
        let exp = 2f64.powi(retry.saturating_sub(1).min(16) as i32);
        Duration::from_secs_f64((self.backoff_factor * exp).max(0.0))
    }

    pub fn should_retry(&self, err: &LmsError) -> bool {
        match err {
            LmsError::HttpStatus(code) => self.retry_statuses.contains(code),
            other => other.is_retryable(),
        }
    }
}

/// Spread reconnect attempts by up to 10% either way around `interval`.
pub(crate) fn jittered(interval: Duration) -> Duration {
    let jitter_factor = rand::random::<f64>() * 0.2 - 0.1; // -0.1 to +0.1
    // Intervals too large to scale are used as-is
    Duration::try_from_secs_f64(interval.as_secs_f64() * (1.0 + jitter_factor))
        .unwrap_or(interval)
}

/// Decides how loudly a failed connect attempt is reported, so an LMS that is
/// down for hours doesn't flood the log.
#[derive(Debug, Clone, Copy)]
pub(crate) struct RetryLogThrottle {
    pub(crate) loud_attempts: u32,
    pub(crate) every: u32,
}

impl Default for RetryLogThrottle {
    fn default() -> Self {
        Self {
            loud_attempts: 3,
            every: 12,
        }
    }
}

impl RetryLogThrottle {
    pub(crate) fn is_loud(&self, attempt: u32) -> bool {
        attempt <= self.loud_attempts || (self.every > 0 && attempt % self.every == 0)
    }
}
