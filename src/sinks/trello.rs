//! Trello card sink.
//!
//! Creates one card per escalation on the configured list via
//! `POST https://api.trello.com/1/cards`. Key and token travel as query
//! parameters, so transport errors are logged without their URL.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use super::{check_status, truncate_chars, SinkError, TicketSink};
use crate::http::{send_with_retry, RetryPolicy};

const TRELLO_CARDS_URL: &str = "https://api.trello.com/1/cards";

/// Trello rejects card names and descriptions longer than this.
const TRELLO_FIELD_LIMIT: usize = 16_384;

/// Trello configuration stored in ~/.escalateai/config.json.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TrelloConfig {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub api_key: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub token: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub list_id: Option<String>,
}

impl TrelloConfig {
    fn fields(&self) -> [Option<&str>; 3] {
        [
            self.api_key.as_deref(),
            self.token.as_deref(),
            self.list_id.as_deref(),
        ]
        .map(|f| f.map(str::trim).filter(|v| !v.is_empty()))
    }

    pub fn is_configured(&self) -> bool {
        self.fields().iter().all(Option::is_some)
    }

    /// Some but not all of key/token/list are set.
    pub fn is_partial(&self) -> bool {
        let set = self.fields().iter().filter(|f| f.is_some()).count();
        set > 0 && set < 3
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct CreatedCard {
    #[serde(default)]
    id: String,
    #[serde(default)]
    short_url: Option<String>,
}

pub struct TrelloBoard {
    client: reqwest::Client,
    api_key: String,
    token: String,
    list_id: String,
    retry: RetryPolicy,
}

impl TrelloBoard {
    pub fn from_config(client: reqwest::Client, config: &TrelloConfig) -> Result<Self, SinkError> {
        match config.fields() {
            [Some(api_key), Some(token), Some(list_id)] => Ok(Self {
                client,
                api_key: api_key.to_string(),
                token: token.to_string(),
                list_id: list_id.to_string(),
                retry: RetryPolicy::non_idempotent(),
            }),
            _ => Err(SinkError::NotConfigured("trello")),
        }
    }

    fn card_query(&self, title: &str, description: &str) -> Vec<(&'static str, String)> {
        vec![
            ("name", truncate_chars(title, TRELLO_FIELD_LIMIT)),
            ("desc", truncate_chars(description, TRELLO_FIELD_LIMIT)),
            ("idList", self.list_id.clone()),
            ("key", self.api_key.clone()),
            ("token", self.token.clone()),
        ]
    }
}

#[async_trait]
impl TicketSink for TrelloBoard {
    fn name(&self) -> &'static str {
        "trello"
    }

    async fn create_ticket(&self, title: &str, description: &str) -> Result<(), SinkError> {
        let request = self
            .client
            .post(TRELLO_CARDS_URL)
            .query(&self.card_query(title, description));

        let resp = send_with_retry(request, &self.retry)
            .await
            .map_err(|e| SinkError::Http(e.without_url()))?;
        let resp = check_status(self.name(), resp).await?;

        match resp.json::<CreatedCard>().await {
            Ok(card) => log::info!(
                "Trello card {} created{}",
                card.id,
                card.short_url.map(|u| format!(" at {u}")).unwrap_or_default()
            ),
            Err(e) => log::debug!("Trello card created; response unreadable: {}", e.without_url()),
        }
        Ok(())
    }
}
