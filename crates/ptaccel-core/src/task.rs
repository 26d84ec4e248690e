// # Task Orchestrator
//
// Runs long operations one at a time and reports on them.
//
// ## States
//
// - `done`: idle. The message is the outcome of the last task, or "无任务".
// - `running`: a heavy task holds the slot; the message tracks its progress.
//
// ## Guarantees
//
// - At most one heavy task runs at a time. A second request is rejected
//   with `TaskAlreadyRunning`, not queued, and the status is left untouched.
// - Reading the status never waits on a running task.
// - Every started task ends in `done` with a final message, even if its
//   body panics or the task future is dropped. A body that returns,
//   successfully or not, is followed by exactly one notification.

use std::future::Future;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use serde::{Deserialize, Serialize};
use tokio::sync::watch;
use tokio_stream::wrappers::WatchStream;

use crate::config::NotifyConfig;
use crate::error::{Error, Result};
use crate::notify::NotificationDispatcher;
use crate::traits::ConfigStore;

/// Message of the initial idle status
pub const IDLE_MESSAGE: &str = "无任务";

/// Heavy task families
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskKind {
    /// Speed test, tracker IP sync and hosts rewrite
    SpeedTestAndHosts,
    /// Hosts rewrite only
    UpdateHosts,
    /// Clear managed sections, then rewrite
    ClearAndUpdateHosts,
}

impl TaskKind {
    /// Notification title
    pub fn title(&self) -> &'static str {
        match self {
            TaskKind::SpeedTestAndHosts => "IP优选与Hosts更新",
            TaskKind::UpdateHosts => "仅更新Hosts",
            TaskKind::ClearAndUpdateHosts => "清空并更新Hosts",
        }
    }

    /// Status message while the task starts
    pub fn start_message(&self) -> &'static str {
        match self {
            TaskKind::SpeedTestAndHosts => "正在执行定时IP优选任务",
            TaskKind::UpdateHosts => "正在更新hosts",
            TaskKind::ClearAndUpdateHosts => "正在清空并更新hosts",
        }
    }

    /// Prefix of the final message when the task fails
    pub fn failure_prefix(&self) -> &'static str {
        match self {
            TaskKind::SpeedTestAndHosts => "定时任务失败",
            TaskKind::UpdateHosts => "更新hosts失败",
            TaskKind::ClearAndUpdateHosts => "清空并更新hosts失败",
        }
    }
}

/// Task state
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TaskState {
    /// A task holds the slot
    Running,
    /// Idle
    Done,
}

/// Process-wide task status
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TaskStatus {
    /// Current state
    pub status: TaskState,
    /// Progress or outcome message
    pub message: String,
}

impl TaskStatus {
    /// Initial status
    pub fn idle() -> Self {
        Self::done(IDLE_MESSAGE)
    }

    /// Idle status with `message`
    pub fn done(message: impl Into<String>) -> Self {
        Self {
            status: TaskState::Done,
            message: message.into(),
        }
    }

    /// Running status with `message`
    pub fn running(message: impl Into<String>) -> Self {
        Self {
            status: TaskState::Running,
            message: message.into(),
        }
    }

    /// Whether a task holds the slot
    pub fn is_running(&self) -> bool {
        self.status == TaskState::Running
    }
}

impl Default for TaskStatus {
    fn default() -> Self {
        Self::idle()
    }
}

/// Handle a task body uses to publish progress
#[derive(Clone)]
pub struct TaskProgress {
    status: Arc<watch::Sender<TaskStatus>>,
}

impl TaskProgress {
    /// Replace the running message
    pub fn report(&self, message: impl Into<String>) {
        let message = message.into();
        tracing::info!("Task progress: {}", message);
        self.status.send_replace(TaskStatus::running(message));
    }
}

/// Releases the slot when dropped
///
/// Dropped before `finish` (the body panicked or the task future was
/// dropped), it also replaces the running status with a failure message.
struct SlotGuard {
    running: Arc<AtomicBool>,
    status: Arc<watch::Sender<TaskStatus>>,
    kind: TaskKind,
    finished: bool,
}

impl SlotGuard {
    /// Publish the final status and release the slot
    fn finish(mut self, final_status: TaskStatus) {
        self.status.send_replace(final_status);
        self.finished = true;
    }
}

impl Drop for SlotGuard {
    fn drop(&mut self) {
        if !self.finished {
            if std::thread::panicking() {
                tracing::error!("Task {:?} panicked", self.kind);
            } else {
                tracing::warn!("Task {:?} was cancelled", self.kind);
            }
            self.status.send_replace(TaskStatus::done(format!(
                "{}: 任务异常终止",
                self.kind.failure_prefix()
            )));
        }
        self.running.store(false, Ordering::SeqCst);
    }
}

/// Serializes heavy tasks and publishes their status
#[derive(Clone)]
pub struct TaskOrchestrator {
    running: Arc<AtomicBool>,
    status: Arc<watch::Sender<TaskStatus>>,
    store: Arc<dyn ConfigStore>,
    dispatcher: NotificationDispatcher,
}

impl TaskOrchestrator {
    /// Create an idle orchestrator
    ///
    /// `store` is read after every task for the current notify settings.
    pub fn new(store: Arc<dyn ConfigStore>, dispatcher: NotificationDispatcher) -> Self {
        let (status, _) = watch::channel(TaskStatus::idle());
        Self {
            running: Arc::new(AtomicBool::new(false)),
            status: Arc::new(status),
            store,
            dispatcher,
        }
    }

    /// Current status, without waiting on a running task
    pub fn status(&self) -> TaskStatus {
        self.status.borrow().clone()
    }

    /// Receiver that observes every status change
    pub fn subscribe(&self) -> watch::Receiver<TaskStatus> {
        self.status.subscribe()
    }

    /// Status changes as a stream, starting with the current value
    pub fn status_stream(&self) -> WatchStream<TaskStatus> {
        WatchStream::new(self.status.subscribe())
    }

    /// Whether a task currently holds the slot
    pub fn is_busy(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }

    /// Run `work` as a heavy task of `kind`
    ///
    /// `work` receives a [`TaskProgress`] handle and returns the final message
    /// on success. A failure becomes `"<failure prefix>: <error>"`. Either way
    /// the slot is released and a notification is dispatched before this
    /// returns the final status.
    ///
    /// # Errors
    ///
    /// `TaskAlreadyRunning` if another task holds the slot. Failures of
    /// `work` are never returned as errors.
    pub async fn run_heavy_task<F, Fut>(&self, kind: TaskKind, work: F) -> Result<TaskStatus>
    where
        F: FnOnce(TaskProgress) -> Fut,
        Fut: Future<Output = Result<String>>,
    {
        if self
            .running
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .is_err()
        {
            let current = self.status();
            tracing::warn!("Rejected {:?}: {}", kind, current.message);
            return Err(Error::TaskAlreadyRunning(current.message));
        }

        let guard = SlotGuard {
            running: Arc::clone(&self.running),
            status: Arc::clone(&self.status),
            kind,
            finished: false,
        };

        tracing::info!("Task {:?} started", kind);
        self.status.send_replace(TaskStatus::running(kind.start_message()));

        let progress = TaskProgress {
            status: Arc::clone(&self.status),
        };
        let message = match work(progress).await {
            Ok(message) => {
                tracing::info!("Task {:?} finished: {}", kind, message);
                message
            }
            Err(e) => {
                tracing::error!("Task {:?} failed: {}", kind, e);
                format!("{}: {}", kind.failure_prefix(), e)
            }
        };

        let final_status = TaskStatus::done(message);
        guard.finish(final_status.clone());

        let notify = match self.store.load().await {
            Ok(doc) => doc.notify,
            Err(e) => {
                tracing::warn!("Using default notify settings: {}", e);
                NotifyConfig::default()
            }
        };
        let report = self
            .dispatcher
            .dispatch(&notify, kind.title(), &final_status.message, None)
            .await;
        tracing::debug!(
            "Task {:?} notification: {} sent, {} failed",
            kind,
            report.delivered.len(),
            report.failed.len()
        );

        Ok(final_status)
    }
}
