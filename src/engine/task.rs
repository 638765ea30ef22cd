// src/engine/task.rs

//! Public, thread-safe API of a pausable task.

use std::fmt;
use std::future::Future;
use std::sync::{Arc, OnceLock};

use tokio::sync::watch;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::activity::{Activity, ActivityHost};
use crate::config::TaskOptions;
use crate::engine::core::{TaskCore, TaskSnapshot};
use crate::engine::driver;
use crate::engine::listeners::{ListenerId, Listeners};
use crate::engine::operation::{BoxFuture, PausableOperation};
use crate::engine::state::{
    PauseRequest, PauseState, PauseStatus, PausedStateChanged, TaskOutcome, TaskState,
};
use crate::engine::token::SuspensionToken;
use crate::errors::{Result, TaskError};

/// A long-running operation that can be paused, resumed and cancelled by
/// any number of uncoordinated callers.
///
/// `PausableTask` is a cheap handle (`Clone` shares the same task). At most
/// one driver ever runs the operation, and cancellation always wins over
/// pausing.
#[derive(Clone)]
pub struct PausableTask {
    inner: Arc<Inner>,
}

pub(crate) struct Inner {
    name: String,
    pub(crate) operation: Arc<dyn PausableOperation>,
    core: watch::Sender<TaskCore>,
    pub(crate) listeners: Listeners,
    activity: OnceLock<Activity>,
}

impl fmt::Debug for PausableTask {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let snapshot = self.snapshot();
        f.debug_struct("PausableTask")
            .field("name", &self.inner.name)
            .field("state", &snapshot.state)
            .field("pause_state", &snapshot.pause_state)
            .field("episode", &snapshot.episode)
            .finish_non_exhaustive()
    }
}

impl PausableTask {
    pub fn new(operation: impl PausableOperation, options: TaskOptions) -> Self {
        Self::from_arc(Arc::new(operation), options)
    }

    /// Like [`PausableTask::new`], for an operation that is shared elsewhere.
    pub fn from_arc(operation: Arc<dyn PausableOperation>, options: TaskOptions) -> Self {
        let (core, _) = watch::channel(TaskCore::new(options.cancellable));
        Self {
            inner: Arc::new(Inner {
                name: options.name,
                operation,
                core,
                listeners: Listeners::default(),
                activity: OnceLock::new(),
            }),
        }
    }

    pub fn name(&self) -> &str {
        &self.inner.name
    }

    /// `true` if both handles refer to the same task.
    pub fn ptr_eq(a: &PausableTask, b: &PausableTask) -> bool {
        Arc::ptr_eq(&a.inner, &b.inner)
    }

    // ---- starting ---------------------------------------------------------------

    /// Start the task as a new unit of work registered with `host`.
    ///
    /// The task owns its true cancellation token (if cancellable) and shares
    /// it with the returned [`Activity`]. Must be called from within a Tokio
    /// runtime when the host spawns onto one.
    pub fn run(&self, host: &dyn ActivityHost) -> Result<Activity> {
        let true_cancel = self.is_cancellable().then(CancellationToken::new);
        let token = SuspensionToken::linked_to(true_cancel.as_ref());

        self.transition(|core| core.start(true_cancel.clone(), token))
            .inspect_err(|err| warn!(task = %self.name(), error = %err, "run rejected"))?;

        info!(
            task = %self.name(),
            cancellable = true_cancel.is_some(),
            "starting pausable task"
        );

        let task = self.clone();
        let activity = host.start_unit(
            self.name(),
            true_cancel,
            Box::new(move |activity: Activity| -> BoxFuture<'static, TaskOutcome> {
                // Registered before the host schedules the work, so the slot is
                // never observed empty while the driver runs.
                if let Err(err) = activity.attach_pausable(task.clone()) {
                    warn!(task = %task.name(), error = %err, "could not attach to new activity");
                }
                let _ = task.inner.activity.set(activity.clone());
                Box::pin(driver::drive(task, Some(activity)))
            }),
        );

        Ok(activity)
    }

    /// Run the task inside the ambient activity (see [`Activity::current`]).
    ///
    /// The driver runs inline and this future resolves with the terminal
    /// outcome. Fails if there is no ambient activity, if the activity already
    /// has an incomplete pausable task attached, or if this task already
    /// started. If the activity is not cancellable, neither is the task.
    pub async fn run_with_current_activity(&self) -> Result<TaskOutcome> {
        let activity = Activity::current().ok_or(TaskError::NoCurrentActivity)?;
        if self.state().is_started() {
            return Err(TaskError::AlreadyStarted);
        }

        let true_cancel = activity.cancellation();
        if true_cancel.is_none() && self.is_cancellable() {
            warn!(
                task = %self.name(),
                activity = %activity.name(),
                "current activity is not cancellable; task will not be cancellable either"
            );
        }
        let token = SuspensionToken::linked_to(true_cancel.as_ref());

        activity.attach_pausable(self.clone())?;
        if let Err(err) = self.transition(|core| core.start(true_cancel, token)) {
            activity.detach_pausable(self);
            return Err(err);
        }
        let _ = self.inner.activity.set(activity.clone());

        info!(
            task = %self.name(),
            activity = %activity.name(),
            "running pausable task with current activity"
        );

        Ok(driver::drive(self.clone(), Some(activity)).await)
    }

    // ---- pausing ----------------------------------------------------------------

    /// Request a pause and wait until the task is `AfterPaused` (or terminal).
    ///
    /// Every successful call that returns [`PauseStatus::Paused`] must be
    /// matched by exactly one [`PausableTask::resume`]. Concurrent callers
    /// all succeed; the task stays paused until every one of them resumed.
    ///
    /// If this future is dropped before it resolves, its pause request is
    /// withdrawn again.
    pub async fn pause(&self) -> Result<PauseStatus> {
        let request = self.request_pause()?;
        if request.already_completed {
            return Ok(PauseStatus::Completed);
        }
        let hold = PauseHold::new(self);

        let snapshot = self
            .wait_until(|core| {
                core.state() == TaskState::AfterPaused || core.state().is_terminal()
            })
            .await;
        hold.keep();

        if snapshot.state.is_terminal() {
            Ok(PauseStatus::Completed)
        } else {
            Ok(PauseStatus::Paused)
        }
    }

    /// Fire-and-forget pause request.
    ///
    /// Unless `already_completed` is reported, the request is recorded and
    /// must be matched by a later [`PausableTask::resume`].
    pub fn request_pause(&self) -> Result<PauseRequest> {
        let decision = self
            .transition(|core| core.request_pause())
            .inspect_err(|err| warn!(task = %self.name(), error = %err, "pause rejected"))?;

        if let Some(token) = decision.signal {
            debug!(task = %self.name(), "pause requested; signalling suspension token");
            token.signal();
        }
        Ok(decision.request)
    }

    /// Release one pause request and wait until it has been honoured.
    ///
    /// Returns once the task has re-entered `Running`, went back to paused
    /// because another caller paused it again, or reached a terminal state.
    /// While other pause requests are outstanding this keeps waiting.
    ///
    /// Dropping the future still releases the pause; the task then resumes
    /// without waiting for this caller.
    pub async fn resume(&self) -> Result<()> {
        let generation = match self.transition(|core| core.request_resume()) {
            Ok(Some(generation)) => generation,
            Ok(None) => return Ok(()),
            Err(err) => {
                warn!(task = %self.name(), error = %err, "resume rejected");
                return Err(err);
            }
        };
        let ack = PendingAck::new(self);

        self.wait_until(|core| {
            core.pause_state() == PauseState::Continue
                || core.drain_generation() > generation
                || core.state().is_terminal()
        })
        .await;

        ack.acknowledge();

        self.wait_until(|core| {
            core.drain_generation() > generation || core.state().is_terminal()
        })
        .await;

        debug!(task = %self.name(), "resume honoured");
        Ok(())
    }

    /// Pause if running, resume if paused.
    ///
    /// Returns the resulting paused state, or `None` if the task never
    /// started or already finished.
    pub async fn toggle_paused(&self) -> Result<Option<bool>> {
        let snapshot = self.snapshot();
        if !snapshot.state.is_started() || snapshot.state.is_terminal() {
            return Ok(None);
        }

        if snapshot.pause_requests > 0 {
            self.resume().await?;
        } else if self.pause().await? == PauseStatus::Completed {
            return Ok(None);
        }

        let after = self.state();
        if after.is_terminal() {
            Ok(None)
        } else {
            Ok(Some(after.is_paused()))
        }
    }

    /// Run `operation` while the task is guaranteed not to be mid-episode.
    ///
    /// - `Running`: pauses, runs `operation`, then resumes and waits until
    ///   the task runs again.
    /// - `AfterPaused`: holds an extra pause request for the duration of
    ///   `operation`, so another caller's resume cannot restart the task
    ///   underneath it. The request is released without waiting for the
    ///   task to run again.
    /// - `BeforePaused` (i.e. from `on_paused`) or not yet started: runs
    ///   immediately.
    /// - terminal: runs immediately, unless the task faulted and
    ///   `can_operate_on_error` is false, or it was cancelled and
    ///   `can_operate_on_cancelled` is false; then returns `Ok(None)`.
    ///
    /// A pause taken here is released even if `operation` panics or the
    /// future is dropped. Must not be awaited from inside the task's own
    /// `run_operation`.
    pub async fn operate_while_paused<F, Fut, T>(
        &self,
        operation: F,
        can_operate_on_error: bool,
        can_operate_on_cancelled: bool,
    ) -> Result<Option<T>>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = T>,
    {
        let state = self.state();

        match state {
            TaskState::Running | TaskState::AfterPaused => {
                if self.pause().await? == PauseStatus::Completed {
                    return Ok(self
                        .operate_after_completion(
                            operation,
                            can_operate_on_error,
                            can_operate_on_cancelled,
                        )
                        .await);
                }

                let hold = PauseHold::new(self);
                let out = operation().await;

                if state == TaskState::Running {
                    hold.keep();
                    self.resume().await?;
                } else {
                    drop(hold);
                }
                Ok(Some(out))
            }
            _ if state.is_terminal() => Ok(self
                .operate_after_completion(operation, can_operate_on_error, can_operate_on_cancelled)
                .await),
            _ => Ok(Some(operation().await)),
        }
    }

    async fn operate_after_completion<F, Fut, T>(
        &self,
        operation: F,
        can_operate_on_error: bool,
        can_operate_on_cancelled: bool,
    ) -> Option<T>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = T>,
    {
        let state = self.state();
        let allowed = match state {
            TaskState::Faulted => can_operate_on_error,
            TaskState::BeforeCancelled | TaskState::AfterCancelled => can_operate_on_cancelled,
            _ => true,
        };

        if allowed {
            Some(operation().await)
        } else {
            debug!(task = %self.name(), ?state, "skipping operate_while_paused on finished task");
            None
        }
    }

    // ---- cancelling -------------------------------------------------------------

    /// Signal the true cancellation token.
    ///
    /// Returns `Ok(false)` if the task already finished or cancellation was
    /// already requested.
    pub fn request_cancellation(&self) -> Result<bool> {
        let token = self
            .transition(|core| core.request_cancellation())
            .inspect_err(|err| warn!(task = %self.name(), error = %err, "cancellation rejected"))?;

        match token {
            Some(token) => {
                info!(task = %self.name(), "cancellation requested");
                token.cancel();
                Ok(true)
            }
            None => Ok(false),
        }
    }

    /// Request cancellation and wait for the terminal outcome.
    ///
    /// The outcome is `Cancelled` unless the task finished on its own first.
    pub async fn cancel(&self) -> Result<TaskOutcome> {
        self.request_cancellation()?;
        Ok(self.wait_for_completion().await)
    }

    // ---- completion -------------------------------------------------------------

    /// Resolves once the task has reached a terminal state and `on_completed`
    /// has run. May be called before, during or after the run; every call
    /// observes the same outcome.
    pub async fn wait_for_completion(&self) -> TaskOutcome {
        loop {
            let snapshot = self.wait_until(|core| core.outcome().is_some()).await;
            if let Some(outcome) = snapshot.outcome {
                return outcome;
            }
        }
    }

    // ---- status -----------------------------------------------------------------

    pub fn state(&self) -> TaskState {
        self.inner.core.borrow().state()
    }

    pub fn pause_state(&self) -> PauseState {
        self.inner.core.borrow().pause_state()
    }

    /// Outstanding pause requests not yet released by a resume.
    pub fn pause_requests(&self) -> u32 {
        self.inner.core.borrow().counters().pause_requests()
    }

    /// 1-based number of the current episode; 0 before start.
    pub fn episode(&self) -> u32 {
        self.inner.core.borrow().episode()
    }

    pub fn is_started(&self) -> bool {
        self.state().is_started()
    }

    /// `true` while the driver sits between two episodes because of a pause.
    pub fn is_paused(&self) -> bool {
        self.state().is_paused()
    }

    /// `true` once the completion record is published.
    pub fn is_completed(&self) -> bool {
        self.inner.core.borrow().outcome().is_some()
    }

    pub fn is_cancellable(&self) -> bool {
        self.inner.core.borrow().is_cancellable()
    }

    pub fn outcome(&self) -> Option<TaskOutcome> {
        self.inner.core.borrow().outcome().cloned()
    }

    /// The captured failure if the task faulted.
    pub fn exception(&self) -> Option<Arc<anyhow::Error>> {
        self.outcome().and_then(|outcome| outcome.error().cloned())
    }

    /// The activity this task was registered with, once started.
    pub fn activity(&self) -> Option<Activity> {
        self.inner.activity.get().cloned()
    }

    pub fn snapshot(&self) -> TaskSnapshot {
        self.inner.core.borrow().snapshot()
    }

    // ---- listeners --------------------------------------------------------------

    /// Subscribe to "paused state changed" notifications.
    ///
    /// Delivered on the thread that drove the transition, after every
    /// `AfterPaused` and every re-entry into `Running`. Errors and panics
    /// from `listener` are logged and ignored.
    pub fn on_paused_state_changed<F>(&self, listener: F) -> ListenerId
    where
        F: Fn(&PausedStateChanged) -> anyhow::Result<()> + Send + Sync + 'static,
    {
        self.inner.listeners.add(listener)
    }

    pub fn remove_listener(&self, id: ListenerId) -> bool {
        self.inner.listeners.remove(id)
    }

    pub fn listener_count(&self) -> usize {
        self.inner.listeners.len()
    }

    // ---- internals --------------------------------------------------------------

    /// Apply one atomic transition to the core.
    ///
    /// Waiters are only woken if the transition actually changed something.
    pub(crate) fn transition<R>(&self, f: impl FnOnce(&mut TaskCore) -> R) -> R {
        let mut out = None;
        self.inner.core.send_if_modified(|core| {
            let before = core.version();
            out = Some(f(core));
            core.version() != before
        });
        match out {
            Some(out) => out,
            None => unreachable!("send_if_modified always runs its closure"),
        }
    }

    /// Block until `predicate` holds for the core, then return a snapshot.
    pub(crate) async fn wait_until(
        &self,
        mut predicate: impl FnMut(&TaskCore) -> bool,
    ) -> TaskSnapshot {
        let mut rx = self.inner.core.subscribe();
        match rx.wait_for(|core| predicate(core)).await {
            Ok(core) => core.snapshot(),
            // The sender lives as long as `self`; fall back to a plain read.
            Err(_) => self.snapshot(),
        }
    }

    /// Like [`PausableTask::wait_until`], but also wakes when the true
    /// cancellation token fires, even if it was cancelled directly by the
    /// activity host.
    pub(crate) async fn wait_until_or_cancelled(
        &self,
        predicate: impl FnMut(&TaskCore) -> bool,
    ) {
        let true_cancel = self.inner.core.borrow().true_cancel_token();
        match true_cancel {
            Some(token) => {
                tokio::select! {
                    _ = self.wait_until(predicate) => {}
                    _ = token.cancelled() => {}
                }
            }
            None => {
                self.wait_until(predicate).await;
            }
        }
    }

    pub(crate) fn current_token(&self) -> Option<SuspensionToken> {
        self.inner.core.borrow().current_token()
    }

    pub(crate) fn true_cancel_token(&self) -> Option<CancellationToken> {
        self.inner.core.borrow().true_cancel_token()
    }

    pub(crate) fn inner(&self) -> &Inner {
        &self.inner
    }
}

/// One pause request owned by an in-flight call.
///
/// Withdrawn on drop unless [`PauseHold::keep`] hands it over to the caller.
struct PauseHold<'a> {
    task: &'a PausableTask,
    armed: bool,
}

impl<'a> PauseHold<'a> {
    fn new(task: &'a PausableTask) -> Self {
        Self { task, armed: true }
    }

    fn keep(mut self) {
        self.armed = false;
    }
}

impl Drop for PauseHold<'_> {
    fn drop(&mut self) {
        if self.armed && self.task.transition(|core| core.withdraw_pause()) {
            debug!(task = %self.task.name(), "pause request withdrawn");
        }
    }
}

/// The `unpause_requests` slot taken by a resume caller.
///
/// Acknowledged on drop if the caller never got to do it.
struct PendingAck<'a> {
    task: &'a PausableTask,
    pending: bool,
}

impl<'a> PendingAck<'a> {
    fn new(task: &'a PausableTask) -> Self {
        Self {
            task,
            pending: true,
        }
    }

    fn acknowledge(mut self) {
        self.pending = false;
        self.task.transition(|core| core.acknowledge_resume());
    }
}

impl Drop for PendingAck<'_> {
    fn drop(&mut self) {
        if self.pending {
            debug!(task = %self.task.name(), "resume caller went away; acknowledging");
            self.task.transition(|core| core.acknowledge_resume());
        }
    }
}
