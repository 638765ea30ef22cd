// src/engine/state.rs

//! State enums and value types shared by the core, the driver and callers.

use std::fmt;
use std::sync::Arc;

/// Lifecycle state of a pausable task.
///
/// Advances monotonically within an episode:
///
/// ```text
/// WaitingForActivation -> Running -> {BeforePaused -> AfterPaused -> Running}*
///     -> BeforeCompleted -> AfterCompleted
///     -> BeforeCancelled -> AfterCancelled
///     -> Faulted
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TaskState {
    WaitingForActivation,
    Running,
    BeforePaused,
    AfterPaused,
    BeforeCompleted,
    AfterCompleted,
    BeforeCancelled,
    AfterCancelled,
    Faulted,
}

impl TaskState {
    /// `true` once `run`/`run_with_current_activity` has claimed the task.
    pub fn is_started(self) -> bool {
        self != TaskState::WaitingForActivation
    }

    /// `true` once no further episode will ever run.
    ///
    /// This includes the `Before*` states, where `on_completed` is still
    /// executing and waiters have not been released yet.
    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            TaskState::BeforeCompleted
                | TaskState::AfterCompleted
                | TaskState::BeforeCancelled
                | TaskState::AfterCancelled
                | TaskState::Faulted
        )
    }

    /// `true` while the driver sits between two episodes because of a pause.
    pub fn is_paused(self) -> bool {
        matches!(self, TaskState::BeforePaused | TaskState::AfterPaused)
    }

    pub fn is_cancelled(self) -> bool {
        matches!(self, TaskState::BeforeCancelled | TaskState::AfterCancelled)
    }

    pub fn is_completed_successfully(self) -> bool {
        matches!(self, TaskState::BeforeCompleted | TaskState::AfterCompleted)
    }
}

/// Secondary pause clock, independent of [`TaskState`].
///
/// - `NotRequested`: the task runs and nobody asked it to pause.
/// - `Requested`: a pause was requested and the suspension token signalled,
///   but the running episode has not stopped yet.
/// - `Paused`: the task is paused and at least one pause request is outstanding.
/// - `UnpauseRequested`: every pause request has been resumed; the driver has
///   not started draining resume callers yet.
/// - `Continue`: the driver is waiting for every resume caller to acknowledge
///   before it re-enters `Running`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PauseState {
    NotRequested,
    Requested,
    Paused,
    UnpauseRequested,
    Continue,
}

/// Completion record of a task: exactly one of success, cancellation or fault.
#[derive(Debug, Clone)]
pub enum TaskOutcome {
    Completed,
    Cancelled,
    /// The captured failure of the operation (or of the engine on its behalf).
    Faulted(Arc<anyhow::Error>),
}

impl TaskOutcome {
    pub fn is_completed(&self) -> bool {
        matches!(self, TaskOutcome::Completed)
    }

    pub fn is_cancelled(&self) -> bool {
        matches!(self, TaskOutcome::Cancelled)
    }

    pub fn is_faulted(&self) -> bool {
        matches!(self, TaskOutcome::Faulted(_))
    }

    /// The captured failure, if the task faulted.
    pub fn error(&self) -> Option<&Arc<anyhow::Error>> {
        match self {
            TaskOutcome::Faulted(err) => Some(err),
            _ => None,
        }
    }

    /// Terminal state that pairs with this outcome.
    pub fn final_state(&self) -> TaskState {
        match self {
            TaskOutcome::Completed => TaskState::AfterCompleted,
            TaskOutcome::Cancelled => TaskState::AfterCancelled,
            TaskOutcome::Faulted(_) => TaskState::Faulted,
        }
    }
}

impl fmt::Display for TaskOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TaskOutcome::Completed => write!(f, "completed"),
            TaskOutcome::Cancelled => write!(f, "cancelled"),
            TaskOutcome::Faulted(err) => write!(f, "faulted: {err:#}"),
        }
    }
}

/// Result of [`crate::engine::PausableTask::pause`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PauseStatus {
    /// The task reached `AfterPaused`.
    Paused,
    /// The task reached a terminal state instead; no resume is needed.
    Completed,
}

/// Non-blocking status report of [`crate::engine::PausableTask::request_pause`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct PauseRequest {
    /// The task had already finished; nothing was recorded.
    pub already_completed: bool,
    /// The task was already sitting in `AfterPaused`.
    pub already_paused: bool,
}

/// Payload of the "paused state changed" broadcast.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PausedStateChanged {
    pub task: String,
    pub paused: bool,
    /// Episode that was interrupted (when pausing) or entered (when resuming).
    pub episode: u32,
}
