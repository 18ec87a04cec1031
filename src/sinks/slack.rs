//! Slack incoming-webhook sink.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use super::{check_status, NotificationSink, SinkError};
use crate::http::{send_with_retry, RetryPolicy};

/// Slack configuration stored in ~/.escalateai/config.json.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SlackConfig {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub webhook_url: Option<String>,
}

impl SlackConfig {
    pub fn is_configured(&self) -> bool {
        self.webhook_url.as_deref().is_some_and(|u| !u.trim().is_empty())
    }
}

pub struct SlackWebhook {
    client: reqwest::Client,
    webhook_url: String,
    retry: RetryPolicy,
}

impl SlackWebhook {
    pub fn new(client: reqwest::Client, webhook_url: &str) -> Self {
        Self {
            client,
            webhook_url: webhook_url.to_string(),
            retry: RetryPolicy::non_idempotent(),
        }
    }

    pub fn from_config(client: reqwest::Client, config: &SlackConfig) -> Result<Self, SinkError> {
        match config.webhook_url.as_deref() {
            Some(url) if !url.trim().is_empty() => Ok(Self::new(client, url.trim())),
            _ => Err(SinkError::NotConfigured("slack")),
        }
    }
}

pub(crate) fn webhook_payload(message: &str) -> serde_json::Value {
    serde_json::json!({ "text": message })
}

#[async_trait]
impl NotificationSink for SlackWebhook {
    fn name(&self) -> &'static str {
        "slack"
    }

    async fn notify(&self, message: &str) -> Result<(), SinkError> {
        let request = self
            .client
            .post(&self.webhook_url)
            .json(&webhook_payload(message));

        // The webhook URL is itself the credential, so keep it out of error text
        let resp = send_with_retry(request, &self.retry)
            .await
            .map_err(|e| SinkError::Http(e.without_url()))?;
        check_status(self.name(), resp).await?;

        log::debug!("Slack notification delivered ({} chars)", message.len());
        Ok(())
    }
}
