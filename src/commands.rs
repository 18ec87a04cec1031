//! CLI command implementations. Each command loads its own state and prints
//! to stdout; errors bubble up to `main` for reporting.

use std::io::Write;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use tokio::io::AsyncReadExt;

use crate::config::{Config, ConfigError};
use crate::db::StoreError;
use crate::error::{IngestFailure, PipelineError};
use crate::export::{render_table, write_csv};
#[cfg(unix)]
use crate::poller::spawn_hangup_waker;
use crate::poller::{poll_once, run_mail_poller};
use crate::state::AppState;
use crate::types::{IncomingMessage, MessageBody};

#[derive(Debug, thiserror::Error)]
pub enum CommandError {
    #[error(transparent)]
    Pipeline(#[from] PipelineError),
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("CSV export failed: {0}")]
    Csv(#[from] csv::Error),
    #[error("JSON output failed: {0}")]
    Json(#[from] serde_json::Error),
    #[error("{0}")]
    Usage(String),
}

impl From<ConfigError> for CommandError {
    fn from(err: ConfigError) -> Self {
        CommandError::Pipeline(err.into())
    }
}

impl From<StoreError> for CommandError {
    fn from(err: StoreError) -> Self {
        CommandError::Pipeline(err.into())
    }
}

impl CommandError {
    /// Structured failure for pipeline errors, None for CLI-level ones.
    pub fn failure(&self) -> Option<IngestFailure> {
        match self {
            CommandError::Pipeline(e) => Some(IngestFailure::from(e)),
            _ => None,
        }
    }
}

fn load_state(config_path: Option<&Path>) -> Result<AppState, CommandError> {
    let config = Config::load(config_path)?;
    Ok(AppState::initialize(config)?)
}

/// Run the mailbox poller until interrupted, or a single cycle with `once`.
pub async fn poll(config_path: Option<&Path>, once: bool) -> Result<(), CommandError> {
    let state = Arc::new(load_state(config_path)?);
    let Some(source) = state.mail_source.clone() else {
        return Err(CommandError::Usage(
            "No mail source configured: set AZURE_TENANT_ID, AZURE_CLIENT_ID, \
             AZURE_CLIENT_SECRET and OUTLOOK_MAILBOX"
                .to_string(),
        ));
    };

    if once {
        let summary = poll_once(source.as_ref(), &state.pipeline)
            .await
            .map_err(PipelineError::from)?;
        println!("{}", serde_json::to_string_pretty(&summary)?);
        wait_for_rechecks(&state).await;
        return Ok(());
    }

    #[cfg(unix)]
    if let Err(e) = spawn_hangup_waker(state.clone()) {
        log::warn!("SIGHUP wake-up unavailable: {}", e);
    }

    log::info!(
        "Polling every {} minute(s); SIGHUP polls now, Ctrl-C stops",
        state.config.poller.poll_interval_minutes
    );
    tokio::select! {
        _ = run_mail_poller(state.clone()) => {},
        result = tokio::signal::ctrl_c() => {
            result?;
            log::info!(
                "Shutting down; {} pending re-check(s) dropped",
                state.pipeline.pending_rechecks()
            );
        },
    }
    Ok(())
}

/// Keep the process alive until every scheduled re-check has fired.
async fn wait_for_rechecks(state: &AppState) {
    let pending = state.pipeline.pending_rechecks();
    if pending == 0 {
        return;
    }
    log::info!("Waiting for {} re-check(s) to fire", pending);
    while state.pipeline.pending_rechecks() > 0 {
        tokio::time::sleep(Duration::from_secs(1)).await;
    }
}

/// Manual entry: body from `--body` or stdin, subject "Manual Entry".
pub async fn ingest(
    config_path: Option<&Path>,
    body: Option<String>,
    wait: bool,
) -> Result<(), CommandError> {
    let body = match body {
        Some(text) => MessageBody::Text(text),
        None => {
            let mut raw = Vec::new();
            tokio::io::stdin().read_to_end(&mut raw).await?;
            MessageBody::Raw(raw)
        }
    };

    let state = load_state(config_path)?;
    let outcome = state.pipeline.ingest(IncomingMessage::manual(body)).await?;
    println!("{}", serde_json::to_string_pretty(&outcome)?);

    if wait {
        wait_for_rechecks(&state).await;
    } else if outcome.recheck_due_at.is_some() {
        log::warn!(
            "Escalation {} is High urgency; its re-check only fires while this process runs (use --wait or the poll daemon)",
            outcome.escalation_id
        );
    }
    Ok(())
}

pub fn list(config_path: Option<&Path>, csv: bool) -> Result<(), CommandError> {
    let config = Config::load(config_path)?;
    config.validate()?;
    let store = crate::store::SqliteStore::open(config.database_path.as_deref())?;
    let escalations = crate::store::EscalationStore::list_all(&store)?;

    let stdout = std::io::stdout();
    let mut out = stdout.lock();
    if csv {
        write_csv(&mut out, &escalations)?;
    } else {
        out.write_all(render_table(&escalations).as_bytes())?;
    }
    Ok(())
}

pub async fn resolve(config_path: Option<&Path>, id: i64) -> Result<(), CommandError> {
    let state = load_state(config_path)?;
    if state.pipeline.resolve(id)? {
        println!("Escalation {id} resolved");
        Ok(())
    } else {
        Err(CommandError::Usage(format!(
            "Escalation {id} does not exist or is already resolved"
        )))
    }
}

pub async fn predict(config_path: Option<&Path>, urgency: &str) -> Result<(), CommandError> {
    let state = load_state(config_path)?;
    let prediction = state.predictor.predict_label(urgency);
    println!("{prediction}");
    Ok(())
}

pub fn check_config(config_path: Option<&Path>) -> Result<(), CommandError> {
    let config = Config::load(config_path)?;
    config.validate()?;

    println!("{}", serde_json::to_string_pretty(&config.redacted())?);
    let status = |on: bool| if on { "configured" } else { "not configured" };
    println!("mail:   {}", status(config.mail.is_configured()));
    println!("trello: {}", status(config.trello.is_configured()));
    println!("slack:  {}", status(config.slack.is_configured()));
    Ok(())
}
