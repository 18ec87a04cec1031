//! Error types for escalation ingestion
//!
//! Errors are classified by the stage that raised them:
//! - Fetch: mail source authentication or transport
//! - Analyze: the message body could not be decoded as text
//! - Store: the escalation could not be written or read back
//! - Configure: credentials or settings are missing or invalid
//!
//! Sink failures never appear here. Notifications are best-effort and
//! reported per sink on the ingest outcome instead.

use thiserror::Error;

pub use crate::analyzer::AnalysisError;
pub use crate::config::ConfigError;
pub use crate::db::StoreError;
pub use crate::mail::{AuthError, MailError};
pub use crate::sinks::SinkError;

/// Error that aborts ingestion of a message (or a whole poll cycle).
#[derive(Debug, Error)]
pub enum PipelineError {
    #[error("Analysis failed: {0}")]
    Analysis(#[from] AnalysisError),

    #[error("Escalation store failed: {0}")]
    Store(#[from] StoreError),

    #[error("Mail source failed: {0}")]
    Mail(#[from] MailError),

    #[error("Configuration invalid: {0}")]
    Config(#[from] ConfigError),
}

/// The pipeline stage an error aborted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Stage {
    Fetch,
    Analyze,
    Store,
    Configure,
}

impl std::fmt::Display for Stage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            Stage::Fetch => "fetch",
            Stage::Analyze => "analyze",
            Stage::Store => "store",
            Stage::Configure => "configure",
        };
        f.write_str(name)
    }
}

impl From<AuthError> for PipelineError {
    fn from(err: AuthError) -> Self {
        PipelineError::Mail(MailError::Auth(err))
    }
}

impl PipelineError {
    pub fn stage(&self) -> Stage {
        match self {
            PipelineError::Analysis(_) => Stage::Analyze,
            PipelineError::Store(_) => Stage::Store,
            PipelineError::Mail(_) => Stage::Fetch,
            PipelineError::Config(_) => Stage::Configure,
        }
    }

    /// Returns true if the operator has to change something before retrying.
    pub fn requires_user_action(&self) -> bool {
        matches!(
            self,
            PipelineError::Config(_) | PipelineError::Mail(MailError::Auth(_))
        )
    }

    /// Get a user-friendly recovery suggestion
    pub fn recovery_suggestion(&self) -> &'static str {
        match self {
            PipelineError::Analysis(_) => "The message body is not readable text. It was not logged.",
            PipelineError::Store(StoreError::HomeDirNotFound) => {
                "Set databasePath in the config or ESCALATEAI_DB in the environment."
            }
            PipelineError::Store(_) => "Check the database file permissions and disk space.",
            PipelineError::Mail(MailError::Auth(_)) => {
                "Check AZURE_TENANT_ID, AZURE_CLIENT_ID and AZURE_CLIENT_SECRET."
            }
            PipelineError::Mail(_) => "Check your network connection. The next poll will retry.",
            PipelineError::Config(_) => "Fix ~/.escalateai/config.json or the overriding environment variables.",
        }
    }
}

/// Serializable error representation for logs and `--json` output.
#[derive(Debug, Clone, serde::Serialize)]
#[serde(rename_all = "camelCase")]
pub struct IngestFailure {
    pub stage: Stage,
    pub message: String,
    pub requires_user_action: bool,
    pub recovery_suggestion: String,
}

impl From<&PipelineError> for IngestFailure {
    fn from(err: &PipelineError) -> Self {
        IngestFailure {
            stage: err.stage(),
            message: err.to_string(),
            requires_user_action: err.requires_user_action(),
            recovery_suggestion: err.recovery_suggestion().to_string(),
        }
    }
}
