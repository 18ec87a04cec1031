//! Application state, built once at process start.
//!
//! Initialization order:
//!   1. validated config
//!   2. store (open + migrate)
//!   3. text analyzer
//!   4. risk predictor (training failure only warns)
//!   5. sinks and mail source
//!   6. scheduler
//!   7. pipeline
//!
//! A config validation or store failure aborts startup.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::Notify;

use crate::analyzer::TextAnalyzer;
use crate::config::{Config, ConfigError};
use crate::error::PipelineError;
use crate::http::build_client;
use crate::mail::graph::OutlookMailbox;
use crate::mail::MailSource;
use crate::pipeline::Pipeline;
use crate::predictor::RiskPredictor;
use crate::scheduler::{DelayedTaskScheduler, TokioScheduler};
use crate::sinks::slack::SlackWebhook;
use crate::sinks::trello::TrelloBoard;
use crate::sinks::SinkError;
use crate::store::{EscalationStore, SqliteStore};

pub struct AppState {
    pub config: Config,
    pub store: Arc<dyn EscalationStore>,
    pub analyzer: Arc<TextAnalyzer>,
    pub predictor: Arc<RiskPredictor>,
    pub mail_source: Option<Arc<dyn MailSource>>,
    pub pipeline: Arc<Pipeline>,
    /// Wakes the mail poller before its interval elapses.
    pub poller_wake: Notify,
}

impl AppState {
    /// Build the full state. Must run inside a tokio runtime.
    pub fn initialize(config: Config) -> Result<Self, PipelineError> {
        config.validate()?;

        let store: Arc<dyn EscalationStore> =
            Arc::new(SqliteStore::open(config.database_path.as_deref())?);
        Self::initialize_with_store(config, store)
    }

    /// Same as `initialize` but over an already-open store.
    pub fn initialize_with_store(
        config: Config,
        store: Arc<dyn EscalationStore>,
    ) -> Result<Self, PipelineError> {
        config.validate()?;

        let analyzer = Arc::new(TextAnalyzer::new());

        let predictor = Arc::new(RiskPredictor::new());
        if let Err(e) =
            predictor.train_from_sources(store.as_ref(), config.training_data_path.as_deref())
        {
            log::warn!("Risk predictor left untrained: {}", e);
        }

        let client = build_client(Duration::from_secs(config.pipeline.http_timeout_secs))
            .map_err(|e| ConfigError::Invalid {
                field: "pipeline.httpTimeoutSecs",
                reason: format!("HTTP client could not be built: {e}"),
            })?;

        let mail_source: Option<Arc<dyn MailSource>> = if config.mail.is_configured() {
            let mailbox = OutlookMailbox::from_config(client.clone(), &config.mail)?;
            log::info!("Mail source: Outlook mailbox {}", mailbox.mailbox());
            Some(Arc::new(mailbox))
        } else {
            log::info!("Mail source not configured; manual entry only");
            None
        };

        let scheduler: Arc<dyn DelayedTaskScheduler> = Arc::new(TokioScheduler::current());

        let mut pipeline = Pipeline::new(
            analyzer.clone(),
            config.classifier.clone(),
            store.clone(),
            scheduler,
        )
        .with_recheck_delay(Duration::from_secs(config.pipeline.recheck_delay_secs));

        match TrelloBoard::from_config(client.clone(), &config.trello) {
            Ok(board) => pipeline = pipeline.with_ticket_sink(Arc::new(board)),
            Err(SinkError::NotConfigured(_)) => log::info!("Trello sink not configured"),
            Err(e) => log::warn!("Trello sink disabled: {}", e),
        }
        match SlackWebhook::from_config(client, &config.slack) {
            Ok(webhook) => pipeline = pipeline.with_notifier(Arc::new(webhook)),
            Err(SinkError::NotConfigured(_)) => log::info!("Slack sink not configured"),
            Err(e) => log::warn!("Slack sink disabled: {}", e),
        }

        Ok(Self {
            config,
            store,
            analyzer,
            predictor,
            mail_source,
            pipeline: Arc::new(pipeline),
            poller_wake: Notify::new(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::predictor::Prediction;
    use crate::types::{IncomingMessage, MessageBody, Urgency};

    #[tokio::test]
    async fn missing_training_data_leaves_predictor_empty() {
        let dir = tempfile::tempdir().unwrap();
        let config = Config {
            database_path: Some(dir.path().join("escalations.db")),
            training_data_path: Some(dir.path().join("missing.csv")),
            ..Config::default()
        };

        let state = AppState::initialize(config).unwrap();
        assert!(!state.predictor.is_trained());
        assert_eq!(state.predictor.predict(Urgency::High), Prediction::Unknown);
        assert!(state.mail_source.is_none());
    }

    #[tokio::test]
    async fn invalid_config_aborts_startup() {
        let mut config = Config::default();
        config.pipeline.recheck_delay_secs = 0;
        let store: Arc<dyn EscalationStore> = Arc::new(SqliteStore::in_memory().unwrap());

        let err = AppState::initialize_with_store(config, store).err().unwrap();
        assert!(matches!(err, PipelineError::Config(_)));
    }

    #[tokio::test]
    async fn manual_entry_flows_through_pipeline() {
        let store: Arc<dyn EscalationStore> = Arc::new(SqliteStore::in_memory().unwrap());
        let state = AppState::initialize_with_store(Config::default(), store).unwrap();

        let outcome = state
            .pipeline
            .ingest(IncomingMessage::manual(MessageBody::Text(
                "This is the worst service, terrible".into(),
            )))
            .await
            .unwrap();
        assert_eq!(outcome.subject, "Manual Entry");
        assert_eq!(outcome.urgency, Urgency::High);
        assert!(outcome.sinks.is_empty());
        assert_eq!(state.store.list_all().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn predictor_trains_from_existing_history() {
        let dir = tempfile::tempdir().unwrap();
        let db_path = dir.path().join("escalations.db");
        let config = Config {
            database_path: Some(db_path.clone()),
            ..Config::default()
        };

        {
            let state = AppState::initialize(config.clone()).unwrap();
            state
                .pipeline
                .ingest(IncomingMessage::manual(MessageBody::Text("urgent".into())))
                .await
                .unwrap();
        }

        let state = AppState::initialize(config).unwrap();
        assert!(state.predictor.is_trained());
    }
}
