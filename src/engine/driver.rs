// src/engine/driver.rs

//! The episode loop.
//!
//! Exactly one driver runs per task. It repeatedly:
//! 1. runs one episode with the current suspension token,
//! 2. on normal return, completes the task,
//! 3. on interruption, asks the core whether that meant cancel or pause,
//! 4. while paused, drains pause requests to zero, then resume
//!    acknowledgements to zero, and only then re-enters `Running` with a
//!    fresh token,
//! 5. on any other failure, faults the task.
//!
//! Hooks and listeners always run with the state lock released, so they may
//! call back into the public API.

use std::any::Any;
use std::sync::Arc;

use anyhow::anyhow;
use tracing::{debug, error, info, warn};

use crate::activity::Activity;
use crate::engine::core::{DrainStep, Interruption};
use crate::engine::operation::EpisodeError;
use crate::engine::state::{PausedStateChanged, TaskOutcome};
use crate::engine::task::PausableTask;
use crate::engine::token::SuspensionToken;
use crate::errors::TaskError;

/// How a pause ended.
enum PauseExit {
    Resumed,
    Cancelled,
}

/// Drive `task` from its first episode to a terminal outcome.
///
/// `activity` is the unit of work the task is registered with; it is made
/// ambient for every episode and the task is detached from it before the
/// outcome is published.
pub(crate) async fn drive(task: PausableTask, activity: Option<Activity>) -> TaskOutcome {
    let mut is_first_episode = true;

    let outcome = loop {
        let Some(token) = task.current_token() else {
            // Only reachable if the task was never started.
            break TaskOutcome::Faulted(Arc::new(anyhow!(TaskError::NotStarted)));
        };

        debug!(
            task = %task.name(),
            episode = task.episode(),
            is_first_episode,
            "starting episode"
        );

        match run_episode(&task, activity.as_ref(), token, is_first_episode).await {
            Ok(()) => {
                task.transition(|core| core.episode_completed());
                break complete(&task, activity.as_ref(), TaskOutcome::Completed).await;
            }
            Err(EpisodeError::Interrupted) => {
                match task.transition(|core| core.episode_interrupted()) {
                    Interruption::Cancel => {
                        break complete(&task, activity.as_ref(), TaskOutcome::Cancelled).await;
                    }
                    Interruption::Pause {
                        is_first_episode: first,
                        episode,
                    } => match pause(&task, first, episode).await {
                        PauseExit::Resumed => {
                            is_first_episode = false;
                        }
                        PauseExit::Cancelled => {
                            break complete(&task, activity.as_ref(), TaskOutcome::Cancelled).await;
                        }
                    },
                    Interruption::Unexpected => {
                        error!(task = %task.name(), "episode interrupted without a pause or cancel request");
                        let err = anyhow!(TaskError::UnexpectedInterruption);
                        break complete(&task, activity.as_ref(), TaskOutcome::Faulted(Arc::new(err))).await;
                    }
                }
            }
            Err(EpisodeError::Failed(err)) => {
                error!(task = %task.name(), error = %format!("{err:#}"), "operation failed");
                task.transition(|core| core.episode_faulted());
                break complete(&task, activity.as_ref(), TaskOutcome::Faulted(Arc::new(err))).await;
            }
        }
    };

    info!(task = %task.name(), %outcome, "pausable task finished");
    outcome
}

/// Run a single episode on its own Tokio task so that a panicking operation
/// faults the task instead of tearing down the driver.
async fn run_episode(
    task: &PausableTask,
    activity: Option<&Activity>,
    token: SuspensionToken,
    is_first_episode: bool,
) -> Result<(), EpisodeError> {
    let operation = Arc::clone(&task.inner().operation);
    let episode = async move { operation.run_operation(token, is_first_episode).await };

    let handle = match activity {
        Some(activity) => tokio::spawn(activity.clone().scope(episode)),
        None => tokio::spawn(episode),
    };

    match handle.await {
        Ok(result) => result,
        Err(join_err) if join_err.is_panic() => {
            let message = panic_message(join_err.into_panic());
            Err(EpisodeError::Failed(anyhow!("operation panicked: {message}")))
        }
        Err(join_err) => Err(EpisodeError::Failed(anyhow!(
            "operation did not finish: {join_err}"
        ))),
    }
}

fn panic_message(payload: Box<dyn Any + Send>) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        s.to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "<non-string panic payload>".to_string()
    }
}

/// `BeforePaused` -> `on_paused` -> `AfterPaused` -> drain -> `Running`.
async fn pause(task: &PausableTask, is_first_episode: bool, episode: u32) -> PauseExit {
    if let Err(err) = task
        .inner()
        .operation
        .on_paused(task, is_first_episode)
        .await
    {
        warn!(task = %task.name(), error = %format!("{err:#}"), "on_paused hook failed; ignoring");
    }

    task.transition(|core| core.mark_paused());
    info!(task = %task.name(), episode, "task paused");
    notify(task, true, episode);

    loop {
        // Phase 1: every pause caller has resumed.
        loop {
            task.wait_until_or_cancelled(|core| core.can_leave_pause())
                .await;
            match task.transition(|core| core.try_begin_unpause()) {
                DrainStep::Cancelled => return PauseExit::Cancelled,
                DrainStep::Draining => break,
                _ => continue,
            }
        }

        // Phase 2: every resume caller has acknowledged.
        let step = loop {
            task.wait_until_or_cancelled(|core| core.can_finish_drain())
                .await;
            let token = SuspensionToken::linked_to(task.true_cancel_token().as_ref());
            match task.transition(|core| core.try_finish_unpause(token)) {
                DrainStep::Waiting => continue,
                step => break step,
            }
        };

        match step {
            DrainStep::Cancelled => return PauseExit::Cancelled,
            DrainStep::Resumed { episode } => {
                info!(task = %task.name(), episode, "task resumed");
                notify(task, false, episode);
                return PauseExit::Resumed;
            }
            DrainStep::Repaused => {
                debug!(task = %task.name(), "paused again while draining resumes");
            }
            DrainStep::Waiting | DrainStep::Draining => {}
        }
    }
}

/// Run `on_completed`, leave the activity, then publish the completion record.
async fn complete(
    task: &PausableTask,
    activity: Option<&Activity>,
    outcome: TaskOutcome,
) -> TaskOutcome {
    // `BeforeCompleted`, `BeforeCancelled` or `Faulted`, set by the transition
    // that ended the run.
    let state = task.state();

    if let Err(err) = task.inner().operation.on_completed(task, state).await {
        warn!(task = %task.name(), error = %format!("{err:#}"), "on_completed hook failed; ignoring");
    }

    if let Some(activity) = activity {
        activity.detach_pausable(task);
    }

    let published = outcome.clone();
    task.transition(move |core| core.finish(published));
    outcome
}

fn notify(task: &PausableTask, paused: bool, episode: u32) {
    let event = PausedStateChanged {
        task: task.name().to_string(),
        paused,
        episode,
    };
    task.inner().listeners.notify(&event);
}
