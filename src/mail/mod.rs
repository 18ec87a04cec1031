//! Mail source: Microsoft Graph (Outlook) mailbox polling.
//!
//! Modules:
//! - auth: OAuth2 client-credentials token acquisition and caching
//! - graph: message listing and body extraction
//!
//! App-only Graph tokens cannot use `/me`, so the mailbox to read is an
//! explicit setting (`mail.mailbox` / `OUTLOOK_MAILBOX`).

pub mod auth;
pub mod graph;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::types::IncomingMessage;

#[derive(Debug, thiserror::Error)]
pub enum AuthError {
    #[error("Missing mail credential: {0}")]
    MissingCredentials(&'static str),
    #[error("Token request failed: {0}")]
    Http(reqwest::Error),
    #[error("Token endpoint rejected credentials ({status}): {message}")]
    Rejected { status: u16, message: String },
    #[error("Token response had no access_token")]
    MalformedResponse,
}

#[derive(Debug, thiserror::Error)]
pub enum MailError {
    #[error("Authentication failed: {0}")]
    Auth(#[from] AuthError),
    #[error("HTTP: {0}")]
    Http(#[from] reqwest::Error),
    #[error("API error {status}: {message}")]
    Api { status: u16, message: String },
    #[error("Invalid mailbox URL: {0}")]
    Url(#[from] url::ParseError),
}

/// Source of new inbound messages.
#[async_trait]
pub trait MailSource: Send + Sync {
    async fn fetch_new_messages(&self) -> Result<Vec<IncomingMessage>, MailError>;
}

/// Mail configuration stored in ~/.escalateai/config.json.
///
/// Secrets are normally injected through `AZURE_*` environment variables
/// rather than written to the file.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MailConfig {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tenant_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub client_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub client_secret: Option<String>,
    /// User principal name or id of the mailbox to poll.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub mailbox: Option<String>,
    #[serde(default = "default_fetch_limit")]
    pub fetch_limit: u32,
    #[serde(default)]
    pub unread_only: bool,
}

fn default_fetch_limit() -> u32 {
    25
}

impl Default for MailConfig {
    fn default() -> Self {
        Self {
            tenant_id: None,
            client_id: None,
            client_secret: None,
            mailbox: None,
            fetch_limit: default_fetch_limit(),
            unread_only: false,
        }
    }
}

impl MailConfig {
    fn credential_fields(&self) -> [(&'static str, Option<&str>); 4] {
        [
            ("AZURE_TENANT_ID", self.tenant_id.as_deref()),
            ("AZURE_CLIENT_ID", self.client_id.as_deref()),
            ("AZURE_CLIENT_SECRET", self.client_secret.as_deref()),
            ("OUTLOOK_MAILBOX", self.mailbox.as_deref()),
        ]
        .map(|(name, v)| (name, v.map(str::trim).filter(|s| !s.is_empty())))
    }

    pub fn is_configured(&self) -> bool {
        self.credential_fields().iter().all(|(_, v)| v.is_some())
    }

    /// Name of the first missing credential, if any.
    pub fn first_missing(&self) -> Option<&'static str> {
        self.credential_fields()
            .iter()
            .find(|(_, v)| v.is_none())
            .map(|(name, _)| *name)
    }

    /// Some but not all credentials are set.
    pub fn is_partial(&self) -> bool {
        let set = self
            .credential_fields()
            .iter()
            .filter(|(_, v)| v.is_some())
            .count();
        set > 0 && set < 4
    }
}
