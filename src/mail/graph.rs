//! Microsoft Graph v1.0: list messages from one mailbox.
//!
//! `GET /users/{mailbox}/messages?$select=id,subject,body&$top=N`, newest
//! first from the API, returned to callers oldest first so escalations are
//! logged in arrival order.

use async_trait::async_trait;
use serde::Deserialize;

use super::auth::ClientCredentials;
use super::{AuthError, MailConfig, MailError, MailSource};
use crate::http::{send_with_retry, RetryPolicy};
use crate::sinks::truncate_chars;
use crate::types::{IncomingMessage, MessageBody};

const GRAPH_BASE_URL: &str = "https://graph.microsoft.com/v1.0";

// ============================================================================
// API response types
// ============================================================================

#[derive(Debug, Deserialize)]
struct MessageListResponse {
    #[serde(default)]
    value: Vec<GraphMessage>,
}

#[derive(Debug, Deserialize)]
struct GraphMessage {
    id: String,
    #[serde(default)]
    subject: Option<String>,
    #[serde(default)]
    body: Option<ItemBody>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ItemBody {
    #[serde(default)]
    content_type: String,
    #[serde(default)]
    content: String,
}

// ============================================================================
// Client
// ============================================================================

pub struct OutlookMailbox {
    client: reqwest::Client,
    auth: ClientCredentials,
    base_url: String,
    mailbox: String,
    fetch_limit: u32,
    unread_only: bool,
    retry: RetryPolicy,
}

impl OutlookMailbox {
    pub fn from_config(client: reqwest::Client, config: &MailConfig) -> Result<Self, MailError> {
        let mailbox = config
            .mailbox
            .as_deref()
            .map(str::trim)
            .filter(|m| !m.is_empty())
            .ok_or(AuthError::MissingCredentials("OUTLOOK_MAILBOX"))?
            .to_string();
        let auth = ClientCredentials::from_config(client.clone(), config)?;

        Ok(Self {
            client,
            auth,
            base_url: GRAPH_BASE_URL.to_string(),
            mailbox,
            fetch_limit: config.fetch_limit.clamp(1, 1000),
            unread_only: config.unread_only,
            retry: RetryPolicy::default(),
        })
    }

    pub fn mailbox(&self) -> &str {
        &self.mailbox
    }

    fn messages_url(&self) -> Result<url::Url, MailError> {
        messages_url(&self.base_url, &self.mailbox, self.fetch_limit, self.unread_only)
    }
}

/// Build the list URL. The mailbox is pushed as a single path segment, so
/// a stray `/` in it is percent-encoded rather than splitting the path.
pub(crate) fn messages_url(
    base_url: &str,
    mailbox: &str,
    top: u32,
    unread_only: bool,
) -> Result<url::Url, MailError> {
    let mut url = url::Url::parse(base_url)?;
    url.path_segments_mut()
        .map_err(|_| url::ParseError::RelativeUrlWithCannotBeABaseBase)?
        .pop_if_empty()
        .extend(["users", mailbox, "messages"]);
    {
        let mut query = url.query_pairs_mut();
        query
            .append_pair("$select", "id,subject,body")
            .append_pair("$top", &top.to_string())
            .append_pair("$orderby", "receivedDateTime desc");
        if unread_only {
            query.append_pair("$filter", "isRead eq false");
        }
    }
    Ok(url)
}

/// Parse a message-list response into pipeline messages, oldest first.
pub(crate) fn parse_message_list(body: &str) -> Result<Vec<IncomingMessage>, serde_json::Error> {
    let list: MessageListResponse = serde_json::from_str(body)?;
    let mut messages: Vec<IncomingMessage> = list
        .value
        .into_iter()
        .map(|m| {
            let body = match m.body {
                Some(b) if b.content_type.eq_ignore_ascii_case("html") => {
                    MessageBody::Html(b.content)
                }
                Some(b) => MessageBody::Text(b.content),
                None => MessageBody::Text(String::new()),
            };
            IncomingMessage {
                message_id: Some(m.id),
                subject: m.subject,
                body,
            }
        })
        .collect();
    messages.reverse();
    Ok(messages)
}

/// Graph errors look like `{"error": {"code": ..., "message": ...}}`.
fn graph_error_message(body: &str) -> String {
    serde_json::from_str::<serde_json::Value>(body)
        .ok()
        .and_then(|v| {
            let err = v.get("error")?;
            let code = err["code"].as_str().unwrap_or("unknown");
            let message = err["message"].as_str().unwrap_or("");
            Some(format!("{code}: {message}"))
        })
        .unwrap_or_else(|| truncate_chars(body, 200))
}

#[async_trait]
impl MailSource for OutlookMailbox {
    async fn fetch_new_messages(&self) -> Result<Vec<IncomingMessage>, MailError> {
        let token = self.auth.access_token().await?;
        let url = self.messages_url()?;

        let resp = send_with_retry(
            self.client.get(url).bearer_auth(&token),
            &self.retry,
        )
        .await?;

        let status = resp.status();
        let body = resp.text().await?;

        if status == reqwest::StatusCode::UNAUTHORIZED {
            self.auth.invalidate().await;
            return Err(AuthError::Rejected {
                status: status.as_u16(),
                message: graph_error_message(&body),
            }
            .into());
        }
        if !status.is_success() {
            return Err(MailError::Api {
                status: status.as_u16(),
                message: graph_error_message(&body),
            });
        }

        let messages = parse_message_list(&body).map_err(|e| MailError::Api {
            status: status.as_u16(),
            message: format!("Unreadable message list: {e}"),
        })?;
        log::info!(
            "Fetched {} message(s) from mailbox {}",
            messages.len(),
            self.mailbox
        );
        Ok(messages)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn url_selects_fields_and_encodes_mailbox() {
        let url = messages_url(GRAPH_BASE_URL, "support+vip@contoso.com", 25, false).unwrap();
        assert_eq!(url.path(), "/v1.0/users/support+vip@contoso.com/messages");
        let pairs: Vec<(String, String)> = url
            .query_pairs()
            .map(|(k, v)| (k.into_owned(), v.into_owned()))
            .collect();
        assert!(pairs.contains(&("$select".into(), "id,subject,body".into())));
        assert!(pairs.contains(&("$top".into(), "25".into())));
        assert!(!pairs.iter().any(|(k, _)| k == "$filter"));
    }

    #[test]
    fn unread_only_adds_filter() {
        let url = messages_url(GRAPH_BASE_URL, "ops@contoso.com", 10, true).unwrap();
        assert!(url
            .query_pairs()
            .any(|(k, v)| k == "$filter" && v == "isRead eq false"));
    }

    #[test]
    fn mailbox_with_slash_stays_one_segment() {
        let url = messages_url(GRAPH_BASE_URL, "a/b", 1, false).unwrap();
        assert_eq!(url.path(), "/v1.0/users/a%2Fb/messages");
    }

    #[test]
    fn parses_bodies_and_reverses_order() {
        let body = r#"{
            "@odata.context": "https://graph.microsoft.com/v1.0/$metadata#users('x')/messages",
            "value": [
                {"id": "AAMk2", "subject": "Second", "body": {"contentType": "html", "content": "<p>Hi</p>"}},
                {"id": "AAMk1", "subject": null, "body": {"contentType": "text", "content": "urgent"}}
            ]
        }"#;
        let messages = parse_message_list(body).unwrap();
        assert_eq!(messages.len(), 2);
        assert_eq!(messages[0].message_id.as_deref(), Some("AAMk1"));
        assert_eq!(messages[0].subject, None);
        assert_eq!(messages[0].body, MessageBody::Text("urgent".into()));
        assert_eq!(messages[1].body, MessageBody::Html("<p>Hi</p>".into()));
    }

    #[test]
    fn empty_list_and_missing_body() {
        assert!(parse_message_list(r#"{"value": []}"#).unwrap().is_empty());
        let messages = parse_message_list(r#"{"value": [{"id": "x"}]}"#).unwrap();
        assert_eq!(messages[0].body, MessageBody::Text(String::new()));
        assert!(parse_message_list("not json").is_err());
    }

    #[test]
    fn graph_errors_are_summarized() {
        let body = r#"{"error": {"code": "ErrorAccessDenied", "message": "Access is denied."}}"#;
        assert_eq!(graph_error_message(body), "ErrorAccessDenied: Access is denied.");
        assert_eq!(graph_error_message("Bad Gateway"), "Bad Gateway");
    }
}
