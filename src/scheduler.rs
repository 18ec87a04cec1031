//! Delayed one-shot tasks.
//!
//! The pipeline hands the scheduler a future and a countdown; the scheduler
//! runs it at most once after the delay. Every task gets a `TaskHandle` that
//! can cancel it before it fires. There is no retry: a task that fails logs
//! and ends.

use std::future::Future;
use std::pin::Pin;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use tokio::task::AbortHandle;
use uuid::Uuid;

pub type DelayedTask = Pin<Box<dyn Future<Output = ()> + Send + 'static>>;

/// Handle to a scheduled task.
#[derive(Debug, Clone)]
pub struct TaskHandle {
    id: Uuid,
    due_at: DateTime<Utc>,
    cancelled: Arc<AtomicBool>,
    abort: Option<AbortHandle>,
}

impl TaskHandle {
    /// Handle for a task due after `delay`, not yet bound to a runtime task.
    pub fn new(delay: Duration) -> Self {
        let delay = chrono::Duration::from_std(delay).unwrap_or_else(|_| chrono::Duration::days(3650));
        Self {
            id: Uuid::new_v4(),
            due_at: Utc::now() + delay,
            cancelled: Arc::new(AtomicBool::new(false)),
            abort: None,
        }
    }

    fn with_abort(mut self, abort: AbortHandle) -> Self {
        self.abort = Some(abort);
        self
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn due_at(&self) -> DateTime<Utc> {
        self.due_at
    }

    /// Withdraw the task. Returns false if it was already cancelled.
    pub fn cancel(&self) -> bool {
        if self.cancelled.swap(true, Ordering::SeqCst) {
            return false;
        }
        if let Some(abort) = &self.abort {
            abort.abort();
        }
        log::debug!("Delayed task {} cancelled", self.id);
        true
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::SeqCst)
    }
}

pub trait DelayedTaskScheduler: Send + Sync {
    fn schedule(&self, task: DelayedTask, delay: Duration) -> TaskHandle;
}

/// Runs tasks on a tokio runtime after a `tokio::time::sleep`.
pub struct TokioScheduler {
    runtime: tokio::runtime::Handle,
}

impl TokioScheduler {
    pub fn new(runtime: tokio::runtime::Handle) -> Self {
        Self { runtime }
    }

    /// Bind to the runtime the caller is running on.
    pub fn current() -> Self {
        Self::new(tokio::runtime::Handle::current())
    }
}

impl DelayedTaskScheduler for TokioScheduler {
    fn schedule(&self, task: DelayedTask, delay: Duration) -> TaskHandle {
        let handle = TaskHandle::new(delay);
        let cancelled = handle.cancelled.clone();
        let id = handle.id;

        let join = self.runtime.spawn(async move {
            tokio::time::sleep(delay).await;
            if cancelled.load(Ordering::SeqCst) {
                return;
            }
            log::debug!("Delayed task {} firing", id);
            task.await;
        });

        log::debug!("Delayed task {} scheduled in {:?}", id, delay);
        handle.with_abort(join.abort_handle())
    }
}
