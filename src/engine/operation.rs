// src/engine/operation.rs

//! The user-supplied side of a pausable task.
//!
//! A [`PausableOperation`] is invoked once per *episode*. Pausing does not
//! freeze a call stack: after a resume, `run_operation` is simply called
//! again with `is_first_episode = false`, so any progress that must survive a
//! pause has to be stored by the operation itself.

use std::future::Future;
use std::pin::Pin;

use thiserror::Error;

use crate::engine::state::TaskState;
use crate::engine::task::PausableTask;
use crate::engine::token::SuspensionToken;

/// Boxed, sendable future used at the trait seams of this crate.
pub type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

/// How an episode ended, other than by finishing its work.
#[derive(Error, Debug)]
pub enum EpisodeError {
    /// The episode observed its [`SuspensionToken`] and stopped.
    ///
    /// This is expected control flow: the engine decides whether it meant
    /// "pause" or "cancel".
    #[error("episode interrupted by its suspension token")]
    Interrupted,

    /// Any other failure; fatal to the task.
    #[error(transparent)]
    Failed(#[from] anyhow::Error),
}

/// Work driven by a [`PausableTask`].
///
/// Hooks receive the owning task so they can call back into its public API
/// (for example [`PausableTask::operate_while_paused`] from `on_paused`).
/// Errors returned by hooks are logged and otherwise ignored.
pub trait PausableOperation: Send + Sync + 'static {
    /// Run one episode.
    ///
    /// Must return `Err(EpisodeError::Interrupted)` promptly once `token`
    /// is signalled. Returning `Ok(())` completes the task.
    fn run_operation(
        &self,
        token: SuspensionToken,
        is_first_episode: bool,
    ) -> BoxFuture<'_, Result<(), EpisodeError>>;

    /// Called after an episode stopped for a pause, before the task is
    /// reported as `AfterPaused`.
    fn on_paused<'a>(
        &'a self,
        _task: &'a PausableTask,
        _is_first_episode: bool,
    ) -> BoxFuture<'a, anyhow::Result<()>> {
        Box::pin(async { Ok(()) })
    }

    /// Called exactly once when the task reaches a terminal state, before
    /// waiters are released. `state` is `BeforeCompleted`, `BeforeCancelled`
    /// or `Faulted`.
    fn on_completed<'a>(
        &'a self,
        _task: &'a PausableTask,
        _state: TaskState,
    ) -> BoxFuture<'a, anyhow::Result<()>> {
        Box::pin(async { Ok(()) })
    }
}

/// Closure-backed [`PausableOperation`] with no-op hooks.
pub struct OperationFn<F> {
    f: F,
}

/// Wrap `f(token, is_first_episode)` as a [`PausableOperation`].
pub fn operation_fn<F, Fut>(f: F) -> OperationFn<F>
where
    F: Fn(SuspensionToken, bool) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<(), EpisodeError>> + Send + 'static,
{
    OperationFn { f }
}

impl<F, Fut> PausableOperation for OperationFn<F>
where
    F: Fn(SuspensionToken, bool) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<(), EpisodeError>> + Send + 'static,
{
    fn run_operation(
        &self,
        token: SuspensionToken,
        is_first_episode: bool,
    ) -> BoxFuture<'_, Result<(), EpisodeError>> {
        Box::pin((self.f)(token, is_first_episode))
    }
}
