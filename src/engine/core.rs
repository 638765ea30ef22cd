// src/engine/core.rs

//! Pure state machine of a pausable task.
//!
//! [`TaskCore`] is the single state struct (task state, pause state, both
//! request counters, the active suspension token) that every transition goes
//! through. Each method performs one complete transition and returns a
//! decision describing what the caller must do next *outside* the lock
//! (signal a token, run a hook, notify listeners).
//!
//! The struct itself performs no IO and never awaits; `PausableTask` keeps it
//! inside a `tokio::sync::watch` channel so that every transition wakes the
//! waiters that depend on it.

use tokio_util::sync::CancellationToken;

use crate::engine::counters::PauseRequestCounter;
use crate::engine::state::{PauseRequest, PauseState, TaskOutcome, TaskState};
use crate::engine::token::SuspensionToken;
use crate::errors::{Result, TaskError};

/// Outcome of a pause request, decided under the state lock.
#[derive(Debug, Clone)]
pub struct PauseDecision {
    pub request: PauseRequest,
    /// Token to signal once the lock is released (first pause of an episode).
    pub signal: Option<SuspensionToken>,
}

/// How the driver must interpret an interrupted episode.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Interruption {
    /// True cancellation was requested; wins over any pending pause.
    Cancel,
    /// A pause was requested; the task is now `BeforePaused`.
    Pause { is_first_episode: bool, episode: u32 },
    /// Nobody asked the episode to stop; the task is now `Faulted`.
    Unexpected,
}

/// One step of the pause drain performed by the driver.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DrainStep {
    /// Preconditions not met yet; wait for the next transition.
    Waiting,
    /// Cancellation arrived while paused; the task is now `BeforeCancelled`.
    Cancelled,
    /// Every pause request was resumed; `pause_state` is now `Continue`.
    Draining,
    /// Every resume caller acknowledged; the task re-entered `Running`.
    Resumed { episode: u32 },
    /// New pause requests arrived during the drain; back to `Paused`.
    Repaused,
}

/// Cloneable read-only view of the core, used by waiters and status reads.
#[derive(Debug, Clone)]
pub struct TaskSnapshot {
    pub state: TaskState,
    pub pause_state: PauseState,
    pub pause_requests: u32,
    pub unpause_requests: u32,
    pub episode: u32,
    pub drain_generation: u64,
    pub outcome: Option<TaskOutcome>,
}

#[derive(Debug)]
pub struct TaskCore {
    state: TaskState,
    pause_state: PauseState,
    counters: PauseRequestCounter,
    /// 1-based number of the current (or last) episode; 0 before start.
    episode: u32,
    /// Bumped every time the driver leaves the unpause drain.
    drain_generation: u64,
    cancellable: bool,
    cancel_requested: bool,
    true_cancel: Option<CancellationToken>,
    suspension: Option<SuspensionToken>,
    outcome: Option<TaskOutcome>,
    /// Bumped by every mutation; lets the owner skip waking waiters on reads.
    version: u64,
}

impl TaskCore {
    pub fn new(cancellable: bool) -> Self {
        Self {
            state: TaskState::WaitingForActivation,
            pause_state: PauseState::NotRequested,
            counters: PauseRequestCounter::new(),
            episode: 0,
            drain_generation: 0,
            cancellable,
            cancel_requested: false,
            true_cancel: None,
            suspension: None,
            outcome: None,
            version: 0,
        }
    }

    pub fn state(&self) -> TaskState {
        self.state
    }

    pub fn pause_state(&self) -> PauseState {
        self.pause_state
    }

    pub fn counters(&self) -> PauseRequestCounter {
        self.counters
    }

    pub fn episode(&self) -> u32 {
        self.episode
    }

    pub fn drain_generation(&self) -> u64 {
        self.drain_generation
    }

    pub fn is_cancellable(&self) -> bool {
        self.cancellable
    }

    pub fn outcome(&self) -> Option<&TaskOutcome> {
        self.outcome.as_ref()
    }

    pub fn version(&self) -> u64 {
        self.version
    }

    pub fn current_token(&self) -> Option<SuspensionToken> {
        self.suspension.clone()
    }

    pub fn true_cancel_token(&self) -> Option<CancellationToken> {
        self.true_cancel.clone()
    }

    /// Cancellation was requested through the API or directly on the true
    /// cancellation token (e.g. by the activity host).
    pub fn is_cancel_requested(&self) -> bool {
        self.cancel_requested
            || self
                .true_cancel
                .as_ref()
                .is_some_and(CancellationToken::is_cancelled)
    }

    pub fn snapshot(&self) -> TaskSnapshot {
        TaskSnapshot {
            state: self.state,
            pause_state: self.pause_state,
            pause_requests: self.counters.pause_requests(),
            unpause_requests: self.counters.unpause_requests(),
            episode: self.episode,
            drain_generation: self.drain_generation,
            outcome: self.outcome.clone(),
        }
    }

    fn touch(&mut self) {
        self.version = self.version.wrapping_add(1);
    }

    // ---- caller-side transitions -------------------------------------------------

    /// `WaitingForActivation -> Running` with the first episode's token.
    ///
    /// A task without a true cancellation token is not cancellable, whatever
    /// it was constructed with.
    pub fn start(
        &mut self,
        true_cancel: Option<CancellationToken>,
        token: SuspensionToken,
    ) -> Result<()> {
        if self.state.is_started() {
            return Err(TaskError::AlreadyStarted);
        }
        if true_cancel.is_none() {
            self.cancellable = false;
        }
        self.true_cancel = true_cancel;
        self.suspension = Some(token);
        self.state = TaskState::Running;
        self.pause_state = PauseState::NotRequested;
        self.episode = 1;
        self.touch();
        Ok(())
    }

    pub fn request_pause(&mut self) -> Result<PauseDecision> {
        if !self.state.is_started() {
            return Err(TaskError::NotStarted);
        }
        if self.state.is_terminal() {
            return Ok(PauseDecision {
                request: PauseRequest {
                    already_completed: true,
                    already_paused: false,
                },
                signal: None,
            });
        }

        self.counters.add_pause();
        let already_paused = self.state == TaskState::AfterPaused;
        let mut signal = None;

        match self.pause_state {
            PauseState::NotRequested => {
                self.pause_state = PauseState::Requested;
                signal = self.suspension.clone();
            }
            PauseState::UnpauseRequested => {
                // Reclaimed before the driver started draining.
                self.pause_state = PauseState::Paused;
            }
            PauseState::Requested | PauseState::Paused | PauseState::Continue => {}
        }

        self.touch();
        Ok(PauseDecision {
            request: PauseRequest {
                already_completed: false,
                already_paused,
            },
            signal,
        })
    }

    /// Release one pause request.
    ///
    /// Returns the drain generation the caller must see advance, or `None`
    /// if the task already finished (nothing to wait for).
    pub fn request_resume(&mut self) -> Result<Option<u64>> {
        if !self.state.is_started() {
            return Err(TaskError::NotStarted);
        }
        if self.state.is_terminal() {
            return Ok(None);
        }

        let remaining = self
            .counters
            .release_pause()
            .ok_or(TaskError::ResumeWithoutPause)?;

        if remaining == 0 && self.pause_state == PauseState::Paused {
            self.pause_state = PauseState::UnpauseRequested;
        }

        self.touch();
        Ok(Some(self.drain_generation))
    }

    pub fn acknowledge_resume(&mut self) {
        self.counters.acknowledge_unpause();
        self.touch();
    }

    /// Release one pause request whose caller will never wait for the
    /// resume to be honoured (the caller went away, or it only held the
    /// pause for a short callback).
    ///
    /// Equivalent to `request_resume` immediately followed by
    /// `acknowledge_resume`. Returns `false` if there was nothing to release.
    pub fn withdraw_pause(&mut self) -> bool {
        if !self.state.is_started() || self.state.is_terminal() {
            return false;
        }
        let Some(remaining) = self.counters.release_pause() else {
            return false;
        };
        self.counters.acknowledge_unpause();

        if remaining == 0 && self.pause_state == PauseState::Paused {
            self.pause_state = PauseState::UnpauseRequested;
        }
        self.touch();
        true
    }

    /// Record a true cancellation request.
    ///
    /// Returns the token to signal outside the lock, or `None` when there is
    /// nothing left to cancel.
    pub fn request_cancellation(&mut self) -> Result<Option<CancellationToken>> {
        if !self.cancellable {
            return Err(TaskError::NotCancellable);
        }
        if !self.state.is_started() {
            return Err(TaskError::NotStarted);
        }
        if self.state.is_terminal() || self.cancel_requested {
            return Ok(None);
        }
        self.cancel_requested = true;
        self.touch();
        Ok(self.true_cancel.clone())
    }

    // ---- driver-side transitions -------------------------------------------------

    /// The episode returned normally: `Running -> BeforeCompleted`.
    pub fn episode_completed(&mut self) {
        self.state = TaskState::BeforeCompleted;
        self.suspension = None;
        self.touch();
    }

    /// The episode failed: `Running -> Faulted`.
    pub fn episode_faulted(&mut self) {
        self.state = TaskState::Faulted;
        self.suspension = None;
        self.touch();
    }

    /// Triage an interrupted episode. Cancellation always wins over pausing.
    pub fn episode_interrupted(&mut self) -> Interruption {
        self.suspension = None;
        let decision = if self.is_cancel_requested() {
            self.state = TaskState::BeforeCancelled;
            Interruption::Cancel
        } else if self.pause_state == PauseState::Requested {
            self.state = TaskState::BeforePaused;
            Interruption::Pause {
                is_first_episode: self.episode == 1,
                episode: self.episode,
            }
        } else {
            self.state = TaskState::Faulted;
            Interruption::Unexpected
        };
        self.touch();
        decision
    }

    /// `BeforePaused -> AfterPaused`, once `on_paused` has run.
    pub fn mark_paused(&mut self) -> u32 {
        self.state = TaskState::AfterPaused;
        self.pause_state = if self.counters.pause_requests() > 0 {
            PauseState::Paused
        } else {
            PauseState::UnpauseRequested
        };
        self.touch();
        self.episode
    }

    /// Wake-up condition for the first drain phase.
    pub fn can_leave_pause(&self) -> bool {
        self.counters.pause_requests() == 0 || self.is_cancel_requested()
    }

    /// Wake-up condition for the second drain phase.
    pub fn can_finish_drain(&self) -> bool {
        self.counters.unpause_requests() == 0 || self.is_cancel_requested()
    }

    /// First drain phase: every pause caller has resumed.
    pub fn try_begin_unpause(&mut self) -> DrainStep {
        if self.is_cancel_requested() {
            self.cancel_while_paused();
            return DrainStep::Cancelled;
        }
        if self.counters.pause_requests() > 0 {
            return DrainStep::Waiting;
        }
        self.pause_state = PauseState::Continue;
        self.touch();
        DrainStep::Draining
    }

    /// Second drain phase: every resume caller has acknowledged.
    ///
    /// `token` becomes the next episode's suspension token if the task
    /// re-enters `Running`; otherwise it is dropped.
    pub fn try_finish_unpause(&mut self, token: SuspensionToken) -> DrainStep {
        if self.is_cancel_requested() {
            self.cancel_while_paused();
            return DrainStep::Cancelled;
        }
        if self.counters.unpause_requests() > 0 {
            return DrainStep::Waiting;
        }

        self.drain_generation += 1;

        let step = if self.counters.is_settled() {
            self.state = TaskState::Running;
            self.pause_state = PauseState::NotRequested;
            self.episode += 1;
            self.suspension = Some(token);
            DrainStep::Resumed {
                episode: self.episode,
            }
        } else {
            self.pause_state = PauseState::Paused;
            DrainStep::Repaused
        };
        self.touch();
        step
    }

    fn cancel_while_paused(&mut self) {
        self.state = TaskState::BeforeCancelled;
        self.touch();
    }

    /// Publish the completion record; releases every waiter.
    pub fn finish(&mut self, outcome: TaskOutcome) {
        self.state = outcome.final_state();
        self.outcome = Some(outcome);
        self.touch();
    }
}
