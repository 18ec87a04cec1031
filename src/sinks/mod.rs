//! One-way notification targets.
//!
//! Modules:
//! - slack: incoming-webhook chat notifications
//! - trello: card creation on a configured list
//!
//! Sinks are best-effort. A failure is reported back to the pipeline as a
//! `SinkError` and logged; it never rolls back a stored escalation.

pub mod slack;
pub mod trello;

use async_trait::async_trait;

#[derive(Debug, thiserror::Error)]
pub enum SinkError {
    #[error("HTTP: {0}")]
    Http(#[from] reqwest::Error),
    #[error("{sink} returned {status}: {message}")]
    Status {
        sink: &'static str,
        status: u16,
        message: String,
    },
    #[error("{0} is not configured")]
    NotConfigured(&'static str),
}

/// Chat-style sink: a single text message.
#[async_trait]
pub trait NotificationSink: Send + Sync {
    fn name(&self) -> &'static str;

    async fn notify(&self, message: &str) -> Result<(), SinkError>;
}

/// Ticketing sink: a title plus a longer description.
#[async_trait]
pub trait TicketSink: Send + Sync {
    fn name(&self) -> &'static str;

    async fn create_ticket(&self, title: &str, description: &str) -> Result<(), SinkError>;
}

/// Outcome of one sink call during ingestion.
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SinkReport {
    pub sink: String,
    pub delivered: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl SinkReport {
    pub fn from_result(sink: &str, result: &Result<(), SinkError>) -> Self {
        Self {
            sink: sink.to_string(),
            delivered: result.is_ok(),
            error: result.as_ref().err().map(|e| e.to_string()),
        }
    }
}

/// Map a non-success response into `SinkError::Status`, keeping the body for the log.
pub(crate) async fn check_status(
    sink: &'static str,
    resp: reqwest::Response,
) -> Result<reqwest::Response, SinkError> {
    let status = resp.status();
    if status.is_success() {
        return Ok(resp);
    }
    let message = resp.text().await.unwrap_or_default();
    Err(SinkError::Status {
        sink,
        status: status.as_u16(),
        message: truncate_chars(&message, 200),
    })
}

/// Truncate to at most `max` characters without splitting a code point.
pub(crate) fn truncate_chars(text: &str, max: usize) -> String {
    match text.char_indices().nth(max) {
        Some((idx, _)) => text[..idx].to_string(),
        None => text.to_string(),
    }
}
