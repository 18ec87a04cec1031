//! Background mailbox poller.
//!
//! Short startup delay, then: fetch, ingest each message not seen before,
//! sleep for the poll interval or until woken. Fetch failures are logged and
//! retried next cycle; they never stop the loop.
//!
//! On unix, SIGHUP wakes the poller for an immediate fetch.

use std::sync::Arc;
use std::time::Duration;

use serde::Serialize;
use tokio::sync::Notify;

use crate::db::StoreError;
use crate::error::PipelineError;
use crate::mail::{MailError, MailSource};
use crate::pipeline::Pipeline;
use crate::state::AppState;

const STARTUP_DELAY: Duration = Duration::from_secs(5);

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PollSummary {
    pub fetched: usize,
    pub already_ingested: usize,
    pub ingested: usize,
    pub partial: usize,
    pub failed: usize,
}

/// One fetch-and-ingest cycle.
///
/// Stops early on a store failure: the remaining messages stay unrecorded
/// and are picked up by the next cycle.
pub async fn poll_once(
    source: &dyn MailSource,
    pipeline: &Pipeline,
) -> Result<PollSummary, MailError> {
    let messages = source.fetch_new_messages().await?;
    let mut summary = PollSummary {
        fetched: messages.len(),
        ..Default::default()
    };

    for message in messages {
        if let Some(id) = message.message_id.as_deref() {
            match pipeline.store().is_message_ingested(id) {
                Ok(true) => {
                    summary.already_ingested += 1;
                    continue;
                }
                Ok(false) => {}
                Err(e) => {
                    log::error!("Mail poller: cannot check message {}: {}", id, e);
                    summary.failed += 1;
                    break;
                }
            }
        }

        match pipeline.ingest(message).await {
            Ok(outcome) => {
                summary.ingested += 1;
                if outcome.is_partial() {
                    summary.partial += 1;
                }
            }
            // Another poller logged it between the check and the insert
            Err(PipelineError::Store(StoreError::AlreadyIngested(id))) => {
                log::debug!("Mail poller: message {} already logged", id);
                summary.already_ingested += 1;
            }
            Err(e @ PipelineError::Store(_)) => {
                log::error!("Mail poller: stopping cycle: {}", e);
                summary.failed += 1;
                break;
            }
            Err(e) => {
                log::warn!("Mail poller: message skipped ({} stage): {}", e.stage(), e);
                summary.failed += 1;
            }
        }
    }

    Ok(summary)
}

pub async fn run_mail_poller(state: Arc<AppState>) {
    tokio::time::sleep(STARTUP_DELAY).await;

    let interval = Duration::from_secs(state.config.poller.poll_interval_minutes as u64 * 60);

    loop {
        match state.mail_source.as_deref() {
            Some(source) => {
                log::info!("Mail poller: starting fetch");
                match poll_once(source, &state.pipeline).await {
                    Ok(summary) => log::info!(
                        "Mail poller: fetched {}, ingested {} ({} partial), skipped {}, failed {}",
                        summary.fetched,
                        summary.ingested,
                        summary.partial,
                        summary.already_ingested,
                        summary.failed
                    ),
                    Err(e) => log::warn!("Mail poller: fetch failed: {}", e),
                }
            }
            None => log::debug!("Mail poller: no mail source configured"),
        }

        if wait_for_next_cycle(interval, &state.poller_wake).await == Wakeup::Woken {
            log::info!("Mail poller: woken early");
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Wakeup {
    Interval,
    Woken,
}

/// Sleep until the next poll is due or `wake` is notified.
pub async fn wait_for_next_cycle(interval: Duration, wake: &Notify) -> Wakeup {
    tokio::select! {
        _ = tokio::time::sleep(interval) => Wakeup::Interval,
        _ = wake.notified() => Wakeup::Woken,
    }
}

/// Forward SIGHUP to the poller's wake-up. The handler is installed before
/// this returns, so a signal sent afterwards is never lost.
#[cfg(unix)]
pub fn spawn_hangup_waker(state: Arc<AppState>) -> std::io::Result<tokio::task::JoinHandle<()>> {
    use tokio::signal::unix::{signal, SignalKind};

    let mut hangups = signal(SignalKind::hangup())?;
    Ok(tokio::spawn(async move {
        while hangups.recv().await.is_some() {
            log::info!("Mail poller: SIGHUP received, polling now");
            state.poller_wake.notify_one();
        }
    }))
}
