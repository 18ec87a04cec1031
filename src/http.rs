//! Outbound HTTP for the mail source and the sinks.
//!
//! One `reqwest::Client` per process, built with a hard per-request timeout.
//! Calls go through `send_with_retry`: 408, 429 and 5xx responses and
//! connect/timeout failures are retried with capped exponential backoff, and
//! a numeric `Retry-After` header (capped at 30s) takes precedence.
//!
//! Non-idempotent requests (sink POSTs) only retry when the server cannot
//! have acted on them: connect failures and 429.

use std::time::Duration;

use reqwest::header::{HeaderValue, RETRY_AFTER};
use reqwest::StatusCode;

const MAX_RETRY_AFTER_SECS: u64 = 30;
const JITTER_MS: u64 = 150;

#[derive(Debug, Clone)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub base_delay: Duration,
    pub max_delay: Duration,
    /// Whether a request the server may have processed can be sent again.
    pub idempotent: bool,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            base_delay: Duration::from_millis(250),
            max_delay: Duration::from_secs(2),
            idempotent: true,
        }
    }
}

impl RetryPolicy {
    /// Single attempt.
    pub fn none() -> Self {
        Self {
            max_attempts: 1,
            ..Self::default()
        }
    }

    /// For POSTs that create something: a slow or failing reply may still
    /// mean the card or message exists.
    pub fn non_idempotent() -> Self {
        Self {
            idempotent: false,
            ..Self::default()
        }
    }

    fn should_retry_status(&self, status: StatusCode) -> bool {
        if status == StatusCode::TOO_MANY_REQUESTS {
            return true;
        }
        self.idempotent && (status.is_server_error() || status == StatusCode::REQUEST_TIMEOUT)
    }

    fn should_retry_error(&self, err: &reqwest::Error) -> bool {
        err.is_connect() || (self.idempotent && err.is_timeout())
    }

    /// Delay before attempt `failed + 1`, where `failed` counts from 1.
    fn delay_after(&self, failed: u32, retry_after: Option<&HeaderValue>) -> Duration {
        let hinted = retry_after
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.trim().parse::<u64>().ok());
        if let Some(secs) = hinted {
            return Duration::from_secs(secs.min(MAX_RETRY_AFTER_SECS));
        }

        let factor = 1u32.checked_shl(failed.saturating_sub(1)).unwrap_or(u32::MAX);
        let backoff = self.base_delay.saturating_mul(factor).min(self.max_delay);
        backoff + jitter()
    }
}

fn jitter() -> Duration {
    let nanos = std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .map(|d| d.subsec_nanos() as u64)
        .unwrap_or(0);
    Duration::from_millis(nanos % JITTER_MS)
}

/// Client whose every request is bounded by `timeout`.
pub fn build_client(timeout: Duration) -> Result<reqwest::Client, reqwest::Error> {
    reqwest::Client::builder()
        .timeout(timeout)
        .connect_timeout(timeout.min(Duration::from_secs(10)))
        .user_agent(concat!("escalateai/", env!("CARGO_PKG_VERSION")))
        .build()
}

/// Send `request`, retrying transient failures according to `policy`.
///
/// Non-retryable responses come back as `Ok` whatever their status; callers
/// inspect it. Requests with streaming bodies cannot be cloned and are sent once.
pub async fn send_with_retry(
    request: reqwest::RequestBuilder,
    policy: &RetryPolicy,
) -> Result<reqwest::Response, reqwest::Error> {
    let max_attempts = policy.max_attempts.max(1);

    for attempt in 1..max_attempts {
        let Some(this_try) = request.try_clone() else {
            break;
        };

        let delay = match this_try.send().await {
            Ok(resp) if policy.should_retry_status(resp.status()) => {
                let delay = policy.delay_after(attempt, resp.headers().get(RETRY_AFTER));
                log::warn!(
                    "HTTP {} on attempt {}/{}, retrying in {:?}",
                    resp.status(),
                    attempt,
                    max_attempts,
                    delay
                );
                delay
            }
            Err(e) if policy.should_retry_error(&e) => {
                let delay = policy.delay_after(attempt, None);
                log::warn!(
                    "HTTP transport error on attempt {}/{} ({}), retrying in {:?}",
                    attempt,
                    max_attempts,
                    e.without_url(),
                    delay
                );
                delay
            }
            done => return done,
        };
        tokio::time::sleep(delay).await;
    }

    request.send().await
}
