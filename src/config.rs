//! Process configuration: ~/.escalateai/config.json plus environment overrides.
//!
//! Resolution order, later wins:
//!   1. serde defaults
//!   2. config file (explicit `--config` path or the default location)
//!   3. environment variables (`AZURE_*`, `TRELLO_*`, `SLACK_WEBHOOK_URL`, ...)
//!
//! `validate()` runs once at startup, before any pipeline run.

use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::classifier::UrgencyPolicy;
use crate::mail::MailConfig;
use crate::sinks::slack::SlackConfig;
use crate::sinks::trello::TrelloConfig;

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Could not find home directory")]
    HomeDirNotFound,
    #[error("Failed to read config {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("Failed to parse config {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
    #[error("Invalid setting {field}: {reason}")]
    Invalid { field: &'static str, reason: String },
}

fn invalid(field: &'static str, reason: impl Into<String>) -> ConfigError {
    ConfigError::Invalid {
        field,
        reason: reason.into(),
    }
}

/// Re-check and HTTP settings for the live pipeline.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PipelineConfig {
    #[serde(default = "default_recheck_delay_secs")]
    pub recheck_delay_secs: u64,
    #[serde(default = "default_http_timeout_secs")]
    pub http_timeout_secs: u64,
}

fn default_recheck_delay_secs() -> u64 {
    3600
}

fn default_http_timeout_secs() -> u64 {
    30
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            recheck_delay_secs: default_recheck_delay_secs(),
            http_timeout_secs: default_http_timeout_secs(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PollerConfig {
    #[serde(default = "default_poll_interval")]
    pub poll_interval_minutes: u32,
}

fn default_poll_interval() -> u32 {
    5
}

impl Default for PollerConfig {
    fn default() -> Self {
        Self {
            poll_interval_minutes: default_poll_interval(),
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Config {
    #[serde(default)]
    pub mail: MailConfig,
    #[serde(default)]
    pub trello: TrelloConfig,
    #[serde(default)]
    pub slack: SlackConfig,
    #[serde(default)]
    pub classifier: UrgencyPolicy,
    #[serde(default)]
    pub pipeline: PipelineConfig,
    #[serde(default)]
    pub poller: PollerConfig,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub database_path: Option<PathBuf>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub training_data_path: Option<PathBuf>,
}

/// Default config file path (~/.escalateai/config.json).
pub fn config_path() -> Result<PathBuf, ConfigError> {
    let home = dirs::home_dir().ok_or(ConfigError::HomeDirNotFound)?;
    Ok(home.join(".escalateai").join("config.json"))
}

impl Config {
    /// Read a config file. A missing file yields defaults.
    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        if !path.exists() {
            log::debug!("No config at {}, using defaults", path.display());
            return Ok(Self::default());
        }
        let content = fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        serde_json::from_str(&content).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })
    }

    /// Load from `path` (or the default location), then apply process env overrides.
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        let path = match path {
            Some(p) => p.to_path_buf(),
            None => config_path()?,
        };
        let mut config = Self::from_file(&path)?;
        config.apply_env(|name| std::env::var(name).ok());
        Ok(config)
    }

    /// Overlay non-empty values returned by `lookup` for each recognised variable.
    pub fn apply_env(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        let get = |name: &str| lookup(name).map(|v| v.trim().to_string()).filter(|v| !v.is_empty());

        let string_overrides: [(&str, &mut Option<String>); 8] = [
            ("AZURE_TENANT_ID", &mut self.mail.tenant_id),
            ("AZURE_CLIENT_ID", &mut self.mail.client_id),
            ("AZURE_CLIENT_SECRET", &mut self.mail.client_secret),
            ("OUTLOOK_MAILBOX", &mut self.mail.mailbox),
            ("TRELLO_API_KEY", &mut self.trello.api_key),
            ("TRELLO_TOKEN", &mut self.trello.token),
            ("TRELLO_LIST_ID", &mut self.trello.list_id),
            ("SLACK_WEBHOOK_URL", &mut self.slack.webhook_url),
        ];
        for (name, slot) in string_overrides {
            if let Some(value) = get(name) {
                *slot = Some(value);
            }
        }

        if let Some(db) = get("ESCALATEAI_DB") {
            self.database_path = Some(PathBuf::from(db));
        }
    }

    /// Check settings before any pipeline run.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if let Some(raw) = self.slack.webhook_url.as_deref().filter(|u| !u.trim().is_empty()) {
            let parsed = url::Url::parse(raw.trim())
                .map_err(|e| invalid("slack.webhookUrl", e.to_string()))?;
            if !matches!(parsed.scheme(), "http" | "https") {
                return Err(invalid(
                    "slack.webhookUrl",
                    format!("unsupported scheme '{}'", parsed.scheme()),
                ));
            }
        }

        if self.mail.is_partial() {
            let missing = self.mail.first_missing().unwrap_or("mail credential");
            return Err(invalid("mail", format!("{missing} is not set")));
        }
        if self.trello.is_partial() {
            return Err(invalid(
                "trello",
                "apiKey, token and listId must be set together",
            ));
        }

        let threshold = self.classifier.polarity_threshold;
        if !(-1.0..=1.0).contains(&threshold) {
            return Err(invalid(
                "classifier.polarityThreshold",
                format!("{threshold} is outside [-1, 1]"),
            ));
        }
        if self.classifier.keyword.trim().is_empty() {
            return Err(invalid("classifier.keyword", "must not be empty"));
        }

        if self.pipeline.recheck_delay_secs == 0 {
            return Err(invalid("pipeline.recheckDelaySecs", "must be greater than 0"));
        }
        if self.pipeline.http_timeout_secs == 0 {
            return Err(invalid("pipeline.httpTimeoutSecs", "must be greater than 0"));
        }
        if self.poller.poll_interval_minutes == 0 {
            return Err(invalid("poller.pollIntervalMinutes", "must be greater than 0"));
        }
        if self.mail.fetch_limit == 0 {
            return Err(invalid("mail.fetchLimit", "must be greater than 0"));
        }

        Ok(())
    }

    /// Copy safe to print: secrets replaced with a marker.
    pub fn redacted(&self) -> Self {
        fn mask(value: &Option<String>) -> Option<String> {
            value.as_ref().map(|_| "********".to_string())
        }
        let mut copy = self.clone();
        copy.mail.client_secret = mask(&self.mail.client_secret);
        copy.trello.api_key = mask(&self.trello.api_key);
        copy.trello.token = mask(&self.trello.token);
        copy.slack.webhook_url = mask(&self.slack.webhook_url);
        copy
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn env(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |name| map.get(name).cloned()
    }

    #[test]
    fn missing_file_yields_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let config = Config::from_file(&dir.path().join("config.json")).unwrap();
        assert_eq!(config.pipeline.recheck_delay_secs, 3600);
        assert_eq!(config.classifier.keyword, "urgent");
        assert_eq!(config.classifier.polarity_threshold, -0.5);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn parses_camel_case_sections() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.json");
        fs::write(
            &path,
            r#"{
                "classifier": {"keyword": "asap", "polarityThreshold": -0.3},
                "pipeline": {"recheckDelaySecs": 600},
                "poller": {"pollIntervalMinutes": 2},
                "databasePath": "/tmp/esc.db"
            }"#,
        )
        .unwrap();
        let config = Config::from_file(&path).unwrap();
        assert_eq!(config.classifier.keyword, "asap");
        assert_eq!(config.classifier.polarity_threshold, -0.3);
        assert_eq!(config.pipeline.recheck_delay_secs, 600);
        assert_eq!(config.pipeline.http_timeout_secs, 30);
        assert_eq!(config.poller.poll_interval_minutes, 2);
        assert_eq!(config.database_path, Some(PathBuf::from("/tmp/esc.db")));
    }

    #[test]
    fn malformed_file_is_a_parse_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.json");
        fs::write(&path, "{ not json").unwrap();
        assert!(matches!(
            Config::from_file(&path),
            Err(ConfigError::Parse { .. })
        ));
    }

    #[test]
    fn env_overrides_file_values() {
        let mut config = Config::default();
        config.trello.api_key = Some("from-file".into());
        config.apply_env(env(&[
            ("TRELLO_API_KEY", "from-env"),
            ("TRELLO_TOKEN", "tok"),
            ("TRELLO_LIST_ID", "   "),
            ("ESCALATEAI_DB", "/data/esc.db"),
        ]));
        assert_eq!(config.trello.api_key.as_deref(), Some("from-env"));
        assert_eq!(config.trello.token.as_deref(), Some("tok"));
        assert_eq!(config.trello.list_id, None);
        assert_eq!(config.database_path, Some(PathBuf::from("/data/esc.db")));
    }

    #[test]
    fn partial_credentials_fail_validation() {
        let mut config = Config::default();
        config.apply_env(env(&[("AZURE_TENANT_ID", "t"), ("AZURE_CLIENT_ID", "c")]));
        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("AZURE_CLIENT_SECRET"));

        let mut config = Config::default();
        config.trello.list_id = Some("list".into());
        assert!(matches!(
            config.validate(),
            Err(ConfigError::Invalid { field: "trello", .. })
        ));
    }

    #[test]
    fn webhook_must_be_http() {
        let mut config = Config::default();
        config.slack.webhook_url = Some("ftp://hooks.example.com/x".into());
        assert!(config.validate().is_err());

        config.slack.webhook_url = Some("not a url".into());
        assert!(config.validate().is_err());

        config.slack.webhook_url = Some("https://hooks.slack.com/services/T/B/X".into());
        assert!(config.validate().is_ok());
    }

    #[test]
    fn classifier_and_delay_bounds() {
        let mut config = Config::default();
        config.classifier.polarity_threshold = -1.5;
        assert!(config.validate().is_err());

        let mut config = Config::default();
        config.classifier.keyword = "  ".into();
        assert!(config.validate().is_err());

        let mut config = Config::default();
        config.pipeline.recheck_delay_secs = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn redaction_hides_secrets() {
        let mut config = Config::default();
        config.mail.client_secret = Some("s3cret".into());
        config.slack.webhook_url = Some("https://hooks.slack.com/services/T/B/X".into());
        let json = serde_json::to_string(&config.redacted()).unwrap();
        assert!(!json.contains("s3cret"));
        assert!(!json.contains("hooks.slack.com"));
        assert!(json.contains("********"));
    }
}
