// src/activity/mod.rs

//! Activity-host boundary.
//!
//! An *activity* is the external owner of a unit of work. The pausable task
//! engine needs three things from it:
//! - an optional cancellation token it may link against,
//! - a single slot for "the pausable task attached to this unit of work",
//! - a place to report that the unit is pausable, so dashboards and cancel
//!   buttons can call back into `pause`/`resume`/`cancel`.
//!
//! - [`Activity`] is the handle (cancellation, progress surface, attached
//!   pausable task, completion mirror).
//! - [`host`] provides the [`ActivityHost`] trait and the Tokio-backed
//!   production host.

pub mod host;

use std::fmt;
use std::future::Future;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, PoisonError};

use tokio::sync::watch;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::engine::{PausableTask, PauseStatus, TaskOutcome};
use crate::errors::{Result, TaskError};

pub use host::{ActivityHost, TokioActivityHost, UnitWork};

tokio::task_local! {
    static CURRENT_ACTIVITY: Activity;
}

static NEXT_ACTIVITY_ID: AtomicU64 = AtomicU64::new(1);

/// Last progress reported by a unit of work.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Progress {
    /// Completed fraction in `0.0..=1.0`, if known.
    pub fraction: Option<f32>,
    pub message: Option<String>,
}

/// Handle to a unit of work started by an [`ActivityHost`].
///
/// Cloning shares the same activity.
#[derive(Clone)]
pub struct Activity {
    inner: Arc<ActivityInner>,
}

struct ActivityInner {
    id: u64,
    name: String,
    cancellation: Option<CancellationToken>,
    progress: watch::Sender<Progress>,
    attached: Mutex<Option<PausableTask>>,
    completion: watch::Sender<Option<TaskOutcome>>,
}

impl fmt::Debug for Activity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Activity")
            .field("id", &self.inner.id)
            .field("name", &self.inner.name)
            .field("cancellable", &self.is_cancellable())
            .field("pausable", &self.is_pausable())
            .finish_non_exhaustive()
    }
}

impl Activity {
    pub fn new(name: impl Into<String>, cancellation: Option<CancellationToken>) -> Self {
        let (progress, _) = watch::channel(Progress::default());
        let (completion, _) = watch::channel(None);
        Self {
            inner: Arc::new(ActivityInner {
                id: NEXT_ACTIVITY_ID.fetch_add(1, Ordering::Relaxed),
                name: name.into(),
                cancellation,
                progress,
                attached: Mutex::new(None),
                completion,
            }),
        }
    }

    /// The activity whose unit of work is currently executing, if any.
    pub fn current() -> Option<Activity> {
        CURRENT_ACTIVITY.try_with(Activity::clone).ok()
    }

    /// Run `fut` with `self` as the ambient activity.
    pub async fn scope<F>(self, fut: F) -> F::Output
    where
        F: Future,
    {
        CURRENT_ACTIVITY.scope(self, fut).await
    }

    pub fn id(&self) -> u64 {
        self.inner.id
    }

    pub fn name(&self) -> &str {
        &self.inner.name
    }

    // ---- cancellation -------------------------------------------------------------

    pub fn cancellation(&self) -> Option<CancellationToken> {
        self.inner.cancellation.clone()
    }

    pub fn is_cancellable(&self) -> bool {
        self.inner.cancellation.is_some()
    }

    /// Cancel the unit of work. Returns `false` if it is not cancellable.
    pub fn cancel(&self) -> bool {
        match &self.inner.cancellation {
            Some(token) => {
                debug!(activity = %self.name(), "activity cancelled");
                token.cancel();
                true
            }
            None => false,
        }
    }

    // ---- progress surface ---------------------------------------------------------

    pub fn report_progress(&self, fraction: Option<f32>, message: impl Into<String>) {
        let progress = Progress {
            fraction: fraction.map(|f| f.clamp(0.0, 1.0)),
            message: Some(message.into()),
        };
        self.inner.progress.send_replace(progress);
    }

    pub fn progress(&self) -> Progress {
        self.inner.progress.borrow().clone()
    }

    /// Receiver that observes every progress report.
    pub fn subscribe_progress(&self) -> watch::Receiver<Progress> {
        self.inner.progress.subscribe()
    }

    // ---- attached pausable task ---------------------------------------------------

    /// Register `task` as the pausable task of this unit of work.
    ///
    /// Fails with [`TaskError::ActivityBusy`] while another incomplete task
    /// is attached, and with [`TaskError::AlreadyStarted`] if `task` itself
    /// is already attached and running.
    pub fn attach_pausable(&self, task: PausableTask) -> Result<()> {
        let mut slot = self.inner.attached.lock().unwrap_or_else(PoisonError::into_inner);

        if let Some(existing) = slot.as_ref() {
            if !existing.is_completed() {
                let err = if PausableTask::ptr_eq(existing, &task) {
                    TaskError::AlreadyStarted
                } else {
                    TaskError::ActivityBusy(self.inner.name.clone())
                };
                warn!(
                    activity = %self.name(),
                    attached = %existing.name(),
                    task = %task.name(),
                    "pausable task slot is occupied"
                );
                return Err(err);
            }
        }

        debug!(activity = %self.name(), task = %task.name(), "pausable task attached");
        *slot = Some(task);
        Ok(())
    }

    /// Clear the slot if it still holds `task`.
    pub fn detach_pausable(&self, task: &PausableTask) -> bool {
        let mut slot = self.inner.attached.lock().unwrap_or_else(PoisonError::into_inner);
        match slot.as_ref() {
            Some(existing) if PausableTask::ptr_eq(existing, task) => {
                *slot = None;
                debug!(activity = %self.name(), task = %task.name(), "pausable task detached");
                true
            }
            _ => false,
        }
    }

    pub fn attached_pausable(&self) -> Option<PausableTask> {
        self.inner
            .attached
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// `true` while a pausable task is attached; dashboards offer
    /// pause/resume only then.
    pub fn is_pausable(&self) -> bool {
        self.attached_pausable().is_some()
    }

    /// Forward a pause request to the attached task.
    ///
    /// `Ok(None)` if no pausable task is attached.
    pub async fn pause(&self) -> Result<Option<PauseStatus>> {
        match self.attached_pausable() {
            Some(task) => Ok(Some(task.pause().await?)),
            None => Ok(None),
        }
    }

    /// Forward a resume to the attached task. Returns `false` if none.
    pub async fn resume(&self) -> Result<bool> {
        match self.attached_pausable() {
            Some(task) => {
                task.resume().await?;
                Ok(true)
            }
            None => Ok(false),
        }
    }

    // ---- completion mirror --------------------------------------------------------

    /// Record the unit's terminal outcome. Only the first call has an effect.
    pub fn complete(&self, outcome: TaskOutcome) -> bool {
        self.inner.completion.send_if_modified(|slot| {
            if slot.is_some() {
                return false;
            }
            *slot = Some(outcome);
            true
        })
    }

    pub fn outcome(&self) -> Option<TaskOutcome> {
        self.inner.completion.borrow().clone()
    }

    pub fn is_completed(&self) -> bool {
        self.inner.completion.borrow().is_some()
    }

    /// Resolves with the unit's terminal outcome.
    pub async fn wait(&self) -> TaskOutcome {
        let mut rx = self.inner.completion.subscribe();
        loop {
            match rx.wait_for(Option::is_some).await {
                Ok(done) => {
                    if let Some(outcome) = (*done).clone() {
                        return outcome;
                    }
                }
                // The sender lives as long as `self`.
                Err(_) => std::future::pending::<()>().await,
            }
        }
    }
}
