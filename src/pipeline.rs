//! Escalation pipeline: decode -> analyze -> classify -> store -> notify -> re-check.
//!
//! A message either reaches the store or it doesn't. Everything after the
//! insert is best-effort: sink failures are reported on the `IngestOutcome`
//! and logged, never rolled back. High-urgency records get a one-shot
//! re-check after `recheck_delay`; resolving the record first cancels it.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use serde::Serialize;

use crate::analyzer::{normalize, TextAnalyzer};
use crate::classifier::UrgencyPolicy;
use crate::db::StoreError;
use crate::error::PipelineError;
use crate::scheduler::{DelayedTaskScheduler, TaskHandle};
use crate::sinks::{NotificationSink, SinkReport, TicketSink};
use crate::store::EscalationStore;
use crate::types::{format_entities, Entity, IncomingMessage, NewEscalation, Urgency};

pub const DEFAULT_RECHECK_DELAY: Duration = Duration::from_secs(3600);

type RecheckRegistry = Arc<Mutex<HashMap<i64, TaskHandle>>>;

/// What happened to one ingested message.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct IngestOutcome {
    pub escalation_id: i64,
    pub subject: String,
    pub urgency: Urgency,
    pub polarity: f64,
    pub entities: Vec<Entity>,
    pub sinks: Vec<SinkReport>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub recheck_due_at: Option<DateTime<Utc>>,
}

impl IngestOutcome {
    /// Stored, but at least one sink failed.
    pub fn is_partial(&self) -> bool {
        self.sinks.iter().any(|s| !s.delivered)
    }
}

pub fn logged_message(subject: &str, urgency: Urgency, entities: &[Entity]) -> String {
    format!(
        "Escalation Logged: {}\nUrgency: {}\nEntities: {}",
        subject,
        urgency,
        format_entities(entities)
    )
}

pub fn unresolved_message(subject: &str) -> String {
    format!("⚠️ URGENT: Escalation not resolved: {}", subject)
}

pub struct Pipeline {
    analyzer: Arc<TextAnalyzer>,
    policy: UrgencyPolicy,
    store: Arc<dyn EscalationStore>,
    notifiers: Vec<Arc<dyn NotificationSink>>,
    ticket_sinks: Vec<Arc<dyn TicketSink>>,
    scheduler: Arc<dyn DelayedTaskScheduler>,
    recheck_delay: Duration,
    rechecks: RecheckRegistry,
}

impl Pipeline {
    pub fn new(
        analyzer: Arc<TextAnalyzer>,
        policy: UrgencyPolicy,
        store: Arc<dyn EscalationStore>,
        scheduler: Arc<dyn DelayedTaskScheduler>,
    ) -> Self {
        Self {
            analyzer,
            policy,
            store,
            notifiers: Vec::new(),
            ticket_sinks: Vec::new(),
            scheduler,
            recheck_delay: DEFAULT_RECHECK_DELAY,
            rechecks: Arc::new(Mutex::new(HashMap::new())),
        }
    }

    pub fn with_notifier(mut self, sink: Arc<dyn NotificationSink>) -> Self {
        self.notifiers.push(sink);
        self
    }

    pub fn with_ticket_sink(mut self, sink: Arc<dyn TicketSink>) -> Self {
        self.ticket_sinks.push(sink);
        self
    }

    pub fn with_recheck_delay(mut self, delay: Duration) -> Self {
        self.recheck_delay = delay;
        self
    }

    pub fn store(&self) -> &Arc<dyn EscalationStore> {
        &self.store
    }

    /// Number of re-checks scheduled and not yet fired or cancelled.
    pub fn pending_rechecks(&self) -> usize {
        self.rechecks.lock().len()
    }

    /// Run one message through every stage.
    pub async fn ingest(&self, message: IncomingMessage) -> Result<IngestOutcome, PipelineError> {
        let subject = message.subject_or_placeholder();

        let result = self.store_message(&subject, message);
        let (id, new, polarity) = match result {
            Ok(stored) => stored,
            Err(e @ PipelineError::Store(StoreError::AlreadyIngested(_))) => {
                log::info!("Escalation '{}' not logged again: {}", subject, e);
                return Err(e);
            }
            Err(e) => {
                log::error!(
                    "Escalation '{}' not logged: {} stage failed: {}",
                    subject,
                    e.stage(),
                    e
                );
                return Err(e);
            }
        };

        let sinks = self.notify_sinks(&new).await;
        let failed: Vec<&str> = sinks
            .iter()
            .filter(|r| !r.delivered)
            .map(|r| r.sink.as_str())
            .collect();
        if failed.is_empty() {
            log::info!(
                "Escalation {} logged ({}), {} sink(s) notified",
                id,
                new.urgency,
                sinks.len()
            );
        } else {
            log::warn!(
                "Escalation {} logged ({}) but notification failed for: {}",
                id,
                new.urgency,
                failed.join(", ")
            );
        }

        let recheck_due_at = match new.urgency {
            Urgency::High => Some(self.schedule_recheck(id, &new.subject)),
            Urgency::Normal => None,
        };

        Ok(IngestOutcome {
            escalation_id: id,
            subject: new.subject,
            urgency: new.urgency,
            polarity,
            entities: new.entities,
            sinks,
            recheck_due_at,
        })
    }

    /// Decode, analyze, classify and insert. Nothing downstream runs unless this succeeds.
    fn store_message(
        &self,
        subject: &str,
        message: IncomingMessage,
    ) -> Result<(i64, NewEscalation, f64), PipelineError> {
        let body = self.analyzer.decode(&message.body)?;
        let normalized = normalize(&body);
        let analysis = self.analyzer.analyze(&normalized);
        let urgency = self.policy.classify(&normalized, analysis.polarity);
        log::debug!(
            "Classified '{}' as {} (polarity {:.2}, {} entities)",
            subject,
            urgency,
            analysis.polarity,
            analysis.entities.len()
        );

        let new = NewEscalation {
            subject: subject.to_string(),
            body,
            urgency,
            entities: analysis.entities,
            source_message_id: message.message_id,
        };
        let id = self.store.insert(&new)?;
        Ok((id, new, analysis.polarity))
    }

    async fn notify_sinks(&self, new: &NewEscalation) -> Vec<SinkReport> {
        let mut reports = Vec::with_capacity(self.ticket_sinks.len() + self.notifiers.len());

        for sink in &self.ticket_sinks {
            let result = sink.create_ticket(&new.subject, &new.body).await;
            if let Err(e) = &result {
                log::warn!("Ticket sink {} failed: {}", sink.name(), e);
            }
            reports.push(SinkReport::from_result(sink.name(), &result));
        }

        let message = logged_message(&new.subject, new.urgency, &new.entities);
        for sink in &self.notifiers {
            let result = sink.notify(&message).await;
            if let Err(e) = &result {
                log::warn!("Notification sink {} failed: {}", sink.name(), e);
            }
            reports.push(SinkReport::from_result(sink.name(), &result));
        }

        reports
    }

    fn schedule_recheck(&self, id: i64, subject: &str) -> DateTime<Utc> {
        let store = self.store.clone();
        let notifiers = self.notifiers.clone();
        let registry = self.rechecks.clone();
        let subject = subject.to_string();
        let fired = Arc::new(AtomicBool::new(false));
        let fired_in_task = fired.clone();

        let task = Box::pin(async move {
            fired_in_task.store(true, Ordering::SeqCst);
            registry.lock().remove(&id);
            match recheck_pending(store.as_ref(), &notifiers, &subject).await {
                Ok(true) => log::info!("Escalation {} still pending after delay, re-notified", id),
                Ok(false) => log::debug!("Escalation {} no longer pending, no re-notification", id),
                Err(e) => log::error!("Re-check for escalation {} failed: {}", id, e),
            }
        });

        let handle = self.scheduler.schedule(task, self.recheck_delay);
        let due_at = handle.due_at();
        log::info!(
            "Re-check for escalation {} scheduled at {}",
            id,
            due_at.to_rfc3339()
        );
        // A task that already ran has nothing left to cancel
        let mut rechecks = self.rechecks.lock();
        if !fired.load(Ordering::SeqCst) {
            rechecks.insert(id, handle);
        }
        due_at
    }

    /// Mark a record Resolved and withdraw its pending re-check.
    pub fn resolve(&self, id: i64) -> Result<bool, PipelineError> {
        let changed = self.store.resolve(id)?;
        if changed {
            if let Some(handle) = self.rechecks.lock().remove(&id) {
                handle.cancel();
            }
            log::info!("Escalation {} resolved", id);
        } else {
            log::info!("Escalation {} not resolved: missing or already resolved", id);
        }
        Ok(changed)
    }
}

/// Re-notify if a Pending record with `subject` still exists.
///
/// Returns whether a notification was attempted.
pub async fn recheck_pending(
    store: &dyn EscalationStore,
    notifiers: &[Arc<dyn NotificationSink>],
    subject: &str,
) -> Result<bool, StoreError> {
    if store.find_pending_by_subject(subject)?.is_none() {
        return Ok(false);
    }

    let message = unresolved_message(subject);
    for sink in notifiers {
        if let Err(e) = sink.notify(&message).await {
            log::warn!("Re-notification via {} failed: {}", sink.name(), e);
        }
    }
    Ok(true)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::scheduler::{DelayedTask, TokioScheduler};
    use crate::sinks::SinkError;
    use crate::store::SqliteStore;
    use crate::types::{Escalation, EscalationStatus, MessageBody};
    use async_trait::async_trait;

    #[derive(Default)]
    struct RecordingNotifier {
        messages: Mutex<Vec<String>>,
        fail: bool,
    }

    #[async_trait]
    impl NotificationSink for RecordingNotifier {
        fn name(&self) -> &'static str {
            "chat"
        }

        async fn notify(&self, message: &str) -> Result<(), SinkError> {
            self.messages.lock().push(message.to_string());
            if self.fail {
                return Err(SinkError::Status {
                    sink: "chat",
                    status: 500,
                    message: "boom".into(),
                });
            }
            Ok(())
        }
    }

    #[derive(Default)]
    struct RecordingTickets {
        tickets: Mutex<Vec<(String, String)>>,
    }

    #[async_trait]
    impl TicketSink for RecordingTickets {
        fn name(&self) -> &'static str {
            "tickets"
        }

        async fn create_ticket(&self, title: &str, description: &str) -> Result<(), SinkError> {
            self.tickets
                .lock()
                .push((title.to_string(), description.to_string()));
            Ok(())
        }
    }

    /// Holds tasks until the test runs them.
    #[derive(Default)]
    struct ManualScheduler {
        scheduled: Mutex<Vec<(Duration, DelayedTask, TaskHandle)>>,
    }

    impl ManualScheduler {
        fn delays(&self) -> Vec<Duration> {
            self.scheduled.lock().iter().map(|(d, _, _)| *d).collect()
        }

        async fn fire_all(&self) {
            let tasks = std::mem::take(&mut *self.scheduled.lock());
            for (_, task, handle) in tasks {
                if !handle.is_cancelled() {
                    task.await;
                }
            }
        }
    }

    impl DelayedTaskScheduler for ManualScheduler {
        fn schedule(&self, task: DelayedTask, delay: Duration) -> TaskHandle {
            let handle = TaskHandle::new(delay);
            self.scheduled.lock().push((delay, task, handle.clone()));
            handle
        }
    }

    /// Runs each task to completion before `schedule` returns.
    struct ImmediateScheduler;

    impl DelayedTaskScheduler for ImmediateScheduler {
        fn schedule(&self, task: DelayedTask, delay: Duration) -> TaskHandle {
            std::thread::spawn(move || {
                tokio::runtime::Builder::new_current_thread()
                    .build()
                    .unwrap()
                    .block_on(task)
            })
            .join()
            .unwrap();
            TaskHandle::new(delay)
        }
    }

    struct UnavailableStore;

    impl EscalationStore for UnavailableStore {
        fn insert(&self, _new: &NewEscalation) -> Result<i64, StoreError> {
            Err(StoreError::Unavailable("database is locked".into()))
        }
        fn find_pending_by_subject(&self, _s: &str) -> Result<Option<Escalation>, StoreError> {
            Ok(None)
        }
        fn list_all(&self) -> Result<Vec<Escalation>, StoreError> {
            Ok(Vec::new())
        }
        fn get(&self, _id: i64) -> Result<Option<Escalation>, StoreError> {
            Ok(None)
        }
        fn resolve(&self, _id: i64) -> Result<bool, StoreError> {
            Ok(false)
        }
        fn is_message_ingested(&self, _m: &str) -> Result<bool, StoreError> {
            Ok(false)
        }
    }

    struct Harness {
        pipeline: Pipeline,
        store: Arc<dyn EscalationStore>,
        chat: Arc<RecordingNotifier>,
        tickets: Arc<RecordingTickets>,
        scheduler: Arc<ManualScheduler>,
    }

    fn harness_with(store: Arc<dyn EscalationStore>, chat: RecordingNotifier) -> Harness {
        let chat = Arc::new(chat);
        let tickets = Arc::new(RecordingTickets::default());
        let scheduler = Arc::new(ManualScheduler::default());
        let pipeline = Pipeline::new(
            Arc::new(TextAnalyzer::new()),
            UrgencyPolicy::default(),
            store.clone(),
            scheduler.clone(),
        )
        .with_ticket_sink(tickets.clone())
        .with_notifier(chat.clone());
        Harness {
            pipeline,
            store,
            chat,
            tickets,
            scheduler,
        }
    }

    fn harness() -> Harness {
        harness_with(
            Arc::new(SqliteStore::in_memory().unwrap()),
            RecordingNotifier::default(),
        )
    }

    fn message(subject: &str, body: &str) -> IncomingMessage {
        IncomingMessage {
            message_id: None,
            subject: Some(subject.to_string()),
            body: MessageBody::Text(body.to_string()),
        }
    }

    #[tokio::test]
    async fn urgent_message_notifies_once_and_schedules_recheck() {
        let h = harness();
        let outcome = h
            .pipeline
            .ingest(message("Outage", "This is an urgent issue!"))
            .await
            .unwrap();

        assert_eq!(outcome.urgency, Urgency::High);
        assert!(!outcome.is_partial());
        assert!(outcome.recheck_due_at.is_some());
        assert_eq!(h.tickets.tickets.lock().len(), 1);
        assert_eq!(
            h.tickets.tickets.lock()[0],
            ("Outage".to_string(), "This is an urgent issue!".to_string())
        );
        let chat = h.chat.messages.lock().clone();
        assert_eq!(chat.len(), 1);
        assert!(chat[0].starts_with("Escalation Logged: Outage\nUrgency: High\nEntities: "));
        assert_eq!(h.scheduler.delays(), vec![Duration::from_secs(3600)]);
        assert_eq!(h.pipeline.pending_rechecks(), 1);
    }

    #[tokio::test]
    async fn normal_message_schedules_nothing() {
        let h = harness();
        let outcome = h
            .pipeline
            .ingest(message("Kudos", "Thanks for your help"))
            .await
            .unwrap();

        assert_eq!(outcome.urgency, Urgency::Normal);
        assert!(outcome.recheck_due_at.is_none());
        assert!(h.scheduler.delays().is_empty());
        assert_eq!(h.chat.messages.lock().len(), 1);
        assert_eq!(h.tickets.tickets.lock().len(), 1);

        let all = h.store.list_all().unwrap();
        assert_eq!(all.len(), 1);
        assert_eq!(all[0].status, EscalationStatus::Pending);
        assert_eq!(all[0].urgency, Urgency::Normal);
    }

    #[tokio::test]
    async fn store_failure_stops_before_sinks() {
        let h = harness_with(Arc::new(UnavailableStore), RecordingNotifier::default());
        let err = h
            .pipeline
            .ingest(message("Outage", "This is an urgent issue!"))
            .await
            .unwrap_err();

        assert!(matches!(err, PipelineError::Store(StoreError::Unavailable(_))));
        assert!(h.chat.messages.lock().is_empty());
        assert!(h.tickets.tickets.lock().is_empty());
        assert!(h.scheduler.delays().is_empty());
    }

    #[tokio::test]
    async fn undecodable_body_is_an_analysis_error() {
        let h = harness();
        let err = h
            .pipeline
            .ingest(IncomingMessage::manual(MessageBody::Raw(vec![0xff, 0xfe, 0x00])))
            .await
            .unwrap_err();
        assert!(matches!(err, PipelineError::Analysis(_)));
        assert!(h.store.list_all().unwrap().is_empty());
        assert!(h.chat.messages.lock().is_empty());
    }

    #[tokio::test]
    async fn recheck_renotifies_when_still_pending() {
        let h = harness();
        h.pipeline
            .ingest(message("Outage", "Urgent: checkout is down"))
            .await
            .unwrap();

        h.scheduler.fire_all().await;

        let chat = h.chat.messages.lock().clone();
        assert_eq!(chat.len(), 2);
        assert_eq!(chat[1], "⚠️ URGENT: Escalation not resolved: Outage");
        assert_eq!(h.pipeline.pending_rechecks(), 0);
    }

    #[tokio::test]
    async fn recheck_is_silent_once_resolved() {
        let h = harness();
        let outcome = h
            .pipeline
            .ingest(message("Outage", "Urgent: checkout is down"))
            .await
            .unwrap();

        // Resolved behind the pipeline's back: the task still fires but finds nothing.
        assert!(h.store.resolve(outcome.escalation_id).unwrap());
        h.scheduler.fire_all().await;
        assert_eq!(h.chat.messages.lock().len(), 1);
    }

    #[tokio::test]
    async fn resolve_cancels_pending_recheck() {
        let h = harness();
        let outcome = h
            .pipeline
            .ingest(message("Outage", "urgent"))
            .await
            .unwrap();

        assert!(h.pipeline.resolve(outcome.escalation_id).unwrap());
        assert_eq!(h.pipeline.pending_rechecks(), 0);
        assert!(!h.pipeline.resolve(outcome.escalation_id).unwrap());

        let handles: Vec<bool> = h
            .scheduler
            .scheduled
            .lock()
            .iter()
            .map(|(_, _, handle)| handle.is_cancelled())
            .collect();
        assert_eq!(handles, vec![true]);

        h.scheduler.fire_all().await;
        assert_eq!(h.chat.messages.lock().len(), 1);
    }

    #[tokio::test]
    async fn sink_failure_is_partial_success() {
        let h = harness_with(
            Arc::new(SqliteStore::in_memory().unwrap()),
            RecordingNotifier {
                fail: true,
                ..Default::default()
            },
        );
        let outcome = h
            .pipeline
            .ingest(message("Billing", "Invoice question"))
            .await
            .unwrap();

        assert!(outcome.is_partial());
        let chat_report = outcome.sinks.iter().find(|r| r.sink == "chat").unwrap();
        assert!(!chat_report.delivered);
        assert_eq!(h.store.list_all().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn records_source_message_and_placeholder_subject() {
        let h = harness();
        let outcome = h
            .pipeline
            .ingest(IncomingMessage {
                message_id: Some("AAMkAD1".into()),
                subject: None,
                body: MessageBody::Html("<p>Please call Acme Corp.</p>".into()),
            })
            .await
            .unwrap();

        assert_eq!(outcome.subject, crate::types::UNTITLED_SUBJECT);
        assert!(h.store.is_message_ingested("AAMkAD1").unwrap());
        let stored = h.store.get(outcome.escalation_id).unwrap().unwrap();
        assert!(stored.body.contains("Please call Acme Corp"));
        assert!(!stored.body.contains("<p>"));
    }

    #[tokio::test]
    async fn recheck_that_fires_before_registration_is_not_kept() {
        let chat = Arc::new(RecordingNotifier::default());
        let pipeline = Pipeline::new(
            Arc::new(TextAnalyzer::new()),
            UrgencyPolicy::default(),
            Arc::new(SqliteStore::in_memory().unwrap()),
            Arc::new(ImmediateScheduler),
        )
        .with_notifier(chat.clone());

        pipeline.ingest(message("Outage", "urgent")).await.unwrap();

        assert_eq!(chat.messages.lock().len(), 2);
        assert_eq!(pipeline.pending_rechecks(), 0);
    }

    #[tokio::test]
    async fn body_is_stored_as_submitted_but_classified_normalized() {
        let h = harness();
        let submitted = "ＵＲＧＥＮＴ: the ﬁle export is failing";
        let outcome = h
            .pipeline
            .ingest(message("Export", submitted))
            .await
            .unwrap();

        assert_eq!(outcome.urgency, Urgency::High);
        let stored = h.store.get(outcome.escalation_id).unwrap().unwrap();
        assert_eq!(stored.body, submitted);
        assert_eq!(h.tickets.tickets.lock()[0].1, submitted);
    }

    #[tokio::test(start_paused = true)]
    async fn tokio_scheduler_fires_recheck_after_an_hour() {
        let store: Arc<dyn EscalationStore> = Arc::new(SqliteStore::in_memory().unwrap());
        let chat = Arc::new(RecordingNotifier::default());
        let pipeline = Pipeline::new(
            Arc::new(TextAnalyzer::new()),
            UrgencyPolicy::default(),
            store,
            Arc::new(TokioScheduler::current()),
        )
        .with_notifier(chat.clone());

        pipeline.ingest(message("Outage", "urgent")).await.unwrap();

        tokio::time::sleep(Duration::from_secs(3599)).await;
        assert_eq!(chat.messages.lock().len(), 1);

        tokio::time::sleep(Duration::from_secs(2)).await;
        assert_eq!(chat.messages.lock().len(), 2);
        assert_eq!(pipeline.pending_rechecks(), 0);
    }
}
