//! OAuth2 client-credentials flow against the Microsoft identity platform.
//!
//! Tokens are cached in memory and reused until 60 seconds before expiry.
//! A 401 from Graph calls `invalidate()` so the next fetch re-authenticates.

use chrono::{DateTime, Duration, Utc};
use tokio::sync::Mutex;

use super::{AuthError, MailConfig};
use crate::http::{send_with_retry, RetryPolicy};

pub const GRAPH_SCOPE: &str = "https://graph.microsoft.com/.default";

/// Tokens this close to expiry are treated as expired.
const EXPIRY_SKEW_SECS: i64 = 60;

#[derive(Debug, Clone)]
pub struct AccessToken {
    pub token: String,
    pub expires_at: DateTime<Utc>,
}

impl AccessToken {
    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        self.expires_at <= now + Duration::seconds(EXPIRY_SKEW_SECS)
    }
}

pub struct ClientCredentials {
    client: reqwest::Client,
    token_url: String,
    client_id: String,
    client_secret: String,
    cached: Mutex<Option<AccessToken>>,
}

impl ClientCredentials {
    pub fn from_config(client: reqwest::Client, config: &MailConfig) -> Result<Self, AuthError> {
        let tenant = required(config.tenant_id.as_deref(), "AZURE_TENANT_ID")?;
        let client_id = required(config.client_id.as_deref(), "AZURE_CLIENT_ID")?;
        let client_secret = required(config.client_secret.as_deref(), "AZURE_CLIENT_SECRET")?;

        Ok(Self {
            client,
            token_url: token_url(tenant),
            client_id: client_id.to_string(),
            client_secret: client_secret.to_string(),
            cached: Mutex::new(None),
        })
    }

    /// Return a cached token or fetch a fresh one.
    pub async fn access_token(&self) -> Result<String, AuthError> {
        let mut cached = self.cached.lock().await;
        if let Some(token) = cached.as_ref() {
            if !token.is_expired(Utc::now()) {
                return Ok(token.token.clone());
            }
        }

        let token = self.request_token().await?;
        let value = token.token.clone();
        *cached = Some(token);
        Ok(value)
    }

    /// Drop the cached token after the API rejected it.
    pub async fn invalidate(&self) {
        *self.cached.lock().await = None;
    }

    async fn request_token(&self) -> Result<AccessToken, AuthError> {
        let form = [
            ("grant_type", "client_credentials"),
            ("client_id", self.client_id.as_str()),
            ("client_secret", self.client_secret.as_str()),
            ("scope", GRAPH_SCOPE),
        ];

        let resp = send_with_retry(self.client.post(&self.token_url).form(&form), &RetryPolicy::default())
            .await
            .map_err(AuthError::Http)?;
        let status = resp.status();
        let body = resp.text().await.map_err(AuthError::Http)?;

        if !status.is_success() {
            return Err(map_token_error(status.as_u16(), &body));
        }

        let token = parse_token_response(&body, Utc::now())?;
        log::info!("Acquired Graph access token (expires {})", token.expires_at.to_rfc3339());
        Ok(token)
    }
}

fn required<'a>(value: Option<&'a str>, name: &'static str) -> Result<&'a str, AuthError> {
    value
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .ok_or(AuthError::MissingCredentials(name))
}

pub(crate) fn token_url(tenant: &str) -> String {
    format!("https://login.microsoftonline.com/{tenant}/oauth2/v2.0/token")
}

pub(crate) fn parse_token_response(body: &str, now: DateTime<Utc>) -> Result<AccessToken, AuthError> {
    let json: serde_json::Value =
        serde_json::from_str(body).map_err(|_| AuthError::MalformedResponse)?;
    let token = json["access_token"]
        .as_str()
        .filter(|t| !t.is_empty())
        .ok_or(AuthError::MalformedResponse)?;
    let expires_in = json["expires_in"].as_i64().unwrap_or(3600);
    Ok(AccessToken {
        token: token.to_string(),
        expires_at: now + Duration::seconds(expires_in),
    })
}

/// Token endpoint errors come back as `{"error": ..., "error_description": ...}`.
fn map_token_error(status: u16, body: &str) -> AuthError {
    let message = serde_json::from_str::<serde_json::Value>(body)
        .ok()
        .and_then(|v| {
            let code = v["error"].as_str()?.to_string();
            let first_line = v["error_description"]
                .as_str()
                .and_then(|d| d.lines().next())
                .unwrap_or("")
                .to_string();
            Some(format!("{code}: {first_line}"))
        })
        .unwrap_or_else(|| crate::sinks::truncate_chars(body, 200));
    AuthError::Rejected { status, message }
}
