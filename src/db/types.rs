//! Shared type definitions for the database layer.

use thiserror::Error;

/// Errors raised by the escalation store.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("SQLite error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    #[error("Home directory not found")]
    HomeDirNotFound,

    #[error("Failed to create database directory: {0}")]
    CreateDir(std::io::Error),

    #[error("Schema migration failed: {0}")]
    Migration(String),

    #[error("Failed to serialize entities: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Escalation {id} is unreadable: {reason}")]
    Corrupt { id: i64, reason: String },

    #[error("Store unavailable: {0}")]
    Unavailable(String),

    #[error("Message {0} was already logged")]
    AlreadyIngested(String),
}

/// Raw column values of an `escalations` row, before enum and JSON decoding.
#[derive(Debug, Clone)]
pub(crate) struct EscalationRow {
    pub id: i64,
    pub subject: Option<String>,
    pub body: Option<String>,
    pub status: Option<String>,
    pub urgency: Option<String>,
    pub entities: Option<String>,
    pub created_at: String,
    pub resolved_at: Option<String>,
}
