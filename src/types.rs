//! Core escalation types shared by the analyzer, classifier, store and pipeline.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// Placeholder subject for messages that arrive without one.
pub const UNTITLED_SUBJECT: &str = "(no subject)";

/// Subject used for escalations typed in by an operator.
pub const MANUAL_ENTRY_SUBJECT: &str = "Manual Entry";

/// Coarse severity label, computed once at ingestion.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum Urgency {
    Normal,
    High,
}

impl Urgency {
    pub fn as_str(&self) -> &'static str {
        match self {
            Urgency::Normal => "Normal",
            Urgency::High => "High",
        }
    }
}

impl fmt::Display for Urgency {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Urgency {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "normal" => Ok(Urgency::Normal),
            "high" => Ok(Urgency::High),
            other => Err(format!("Unknown urgency: {other}")),
        }
    }
}

/// Resolution state of an escalation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum EscalationStatus {
    Pending,
    Resolved,
}

impl EscalationStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            EscalationStatus::Pending => "Pending",
            EscalationStatus::Resolved => "Resolved",
        }
    }
}

impl fmt::Display for EscalationStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for EscalationStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "pending" => Ok(EscalationStatus::Pending),
            "resolved" => Ok(EscalationStatus::Resolved),
            other => Err(format!("Unknown status: {other}")),
        }
    }
}

/// A labeled text span pulled out of a message body.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Entity {
    pub text: String,
    pub label: String,
}

impl Entity {
    pub fn new(text: impl Into<String>, label: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            label: label.into(),
        }
    }
}

impl fmt::Display for Entity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "({}, {})", self.text, self.label)
    }
}

/// Render entities the way they appear in chat notifications.
pub fn format_entities(entities: &[Entity]) -> String {
    let parts: Vec<String> = entities.iter().map(|e| e.to_string()).collect();
    format!("[{}]", parts.join(", "))
}

/// A row from the `escalations` table.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Escalation {
    pub id: i64,
    pub subject: String,
    pub body: String,
    pub status: EscalationStatus,
    pub urgency: Urgency,
    pub entities: Vec<Entity>,
    pub created_at: String,
    pub resolved_at: Option<String>,
}

/// Fields supplied by the pipeline when logging a new escalation.
#[derive(Debug, Clone)]
pub struct NewEscalation {
    pub subject: String,
    pub body: String,
    pub urgency: Urgency,
    pub entities: Vec<Entity>,
    /// Mail-source message id, recorded alongside the row so polls skip it next time.
    pub source_message_id: Option<String>,
}

/// Body payload as delivered by a mail source or the manual entry surface.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MessageBody {
    Text(String),
    Html(String),
    /// Undecoded bytes (stdin, attachments). Must be UTF-8.
    Raw(Vec<u8>),
}

/// A message handed to the pipeline.
#[derive(Debug, Clone)]
pub struct IncomingMessage {
    pub message_id: Option<String>,
    pub subject: Option<String>,
    pub body: MessageBody,
}

impl IncomingMessage {
    /// Operator-entered text, bypassing the mail source.
    pub fn manual(body: MessageBody) -> Self {
        Self {
            message_id: None,
            subject: Some(MANUAL_ENTRY_SUBJECT.to_string()),
            body,
        }
    }

    /// Subject with the placeholder applied to missing or blank values.
    pub fn subject_or_placeholder(&self) -> String {
        match self.subject.as_deref().map(str::trim) {
            Some(s) if !s.is_empty() => s.to_string(),
            _ => UNTITLED_SUBJECT.to_string(),
        }
    }
}
