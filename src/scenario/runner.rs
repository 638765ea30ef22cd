// src/scenario/runner.rs

use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use tokio::task::{JoinError, JoinSet};
use tokio::time::Instant;
use tracing::{debug, info, warn};

use crate::activity::TokioActivityHost;
use crate::config::{ScenarioAction, ScenarioFile};
use crate::engine::{PausableTask, TaskOutcome};
use crate::errors::{Result, TaskError};
use crate::scenario::CountingOperation;
use crate::types::ScenarioActionKind;

/// What happened during a scenario run.
#[derive(Debug, Clone)]
pub struct ScenarioReport {
    pub outcome: TaskOutcome,
    pub steps_done: u32,
    pub episodes: u32,
    /// Human-readable log of actions and paused-state changes, in order.
    pub events: Vec<String>,
}

/// Run `scenario` to completion on a fresh [`TokioActivityHost`].
pub async fn run_scenario(scenario: &ScenarioFile) -> Result<ScenarioReport> {
    let operation = Arc::new(CountingOperation::from_task(&scenario.task));
    let task = PausableTask::from_arc(operation.clone(), scenario.task.options());

    let events = Arc::new(Mutex::new(Vec::new()));
    {
        let events = Arc::clone(&events);
        task.on_paused_state_changed(move |change| {
            let line = if change.paused {
                format!("paused (episode {})", change.episode)
            } else {
                format!("resumed (episode {})", change.episode)
            };
            events
                .lock()
                .unwrap_or_else(PoisonError::into_inner)
                .push(line);
            Ok(())
        });
    }

    let host = TokioActivityHost::new();
    let start = Instant::now();
    let activity = task.run(&host)?;
    info!(task = %task.name(), activity = activity.id(), "scenario started");

    // Each action is an independent caller: a resume may block until a
    // later action resumes too. The first caller to fail stops the run.
    let mut callers: JoinSet<Result<()>> = JoinSet::new();
    let mut actions = scenario.action.iter().copied();
    let mut next = actions.next();

    while let Some(action) = next {
        let due = start + Duration::from_millis(action.at_ms);
        tokio::select! {
            _ = tokio::time::sleep_until(due) => {
                let task = task.clone();
                let events = Arc::clone(&events);
                callers.spawn(async move {
                    let line = apply_action(&task, &action).await?;
                    debug!(%line, "scenario action applied");
                    events
                        .lock()
                        .unwrap_or_else(PoisonError::into_inner)
                        .push(line);
                    Ok(())
                });
                next = actions.next();
            }
            Some(joined) = callers.join_next() => {
                if let Err(err) = flatten(joined) {
                    return Err(abandon(&task, callers, err).await);
                }
            }
        }
    }

    while let Some(joined) = callers.join_next().await {
        if let Err(err) = flatten(joined) {
            return Err(abandon(&task, callers, err).await);
        }
    }

    let outcome = task.wait_for_completion().await;
    let events = events
        .lock()
        .unwrap_or_else(PoisonError::into_inner)
        .clone();

    Ok(ScenarioReport {
        outcome,
        steps_done: operation.steps_done(),
        episodes: operation.episodes(),
        events,
    })
}

fn flatten(joined: std::result::Result<Result<()>, JoinError>) -> Result<()> {
    joined.map_err(|join_err| TaskError::Other(join_err.into()))?
}

/// Tear down after a failed action: abort the remaining callers, then
/// cancel the task and wait for it if it can be cancelled.
async fn abandon(
    task: &PausableTask,
    mut callers: JoinSet<Result<()>>,
    err: TaskError,
) -> TaskError {
    warn!(task = %task.name(), error = %err, "scenario action failed; stopping the run");
    callers.abort_all();
    while callers.join_next().await.is_some() {}

    if task.is_cancellable() {
        if let Err(cancel_err) = task.request_cancellation() {
            warn!(task = %task.name(), error = %cancel_err, "could not cancel after failure");
        }
        let outcome = task.wait_for_completion().await;
        debug!(task = %task.name(), %outcome, "task stopped after failed action");
    }
    err
}

async fn apply_action(task: &PausableTask, action: &ScenarioAction) -> Result<String> {
    let result = match action.kind {
        ScenarioActionKind::Pause => format!("{:?}", task.pause().await?),
        ScenarioActionKind::RequestPause => format!("{:?}", task.request_pause()?),
        ScenarioActionKind::Resume => {
            task.resume().await?;
            format!("{:?}", task.state())
        }
        ScenarioActionKind::Toggle => match task.toggle_paused().await? {
            Some(true) => "paused".to_string(),
            Some(false) => "running".to_string(),
            None => "finished".to_string(),
        },
        ScenarioActionKind::Cancel => format!("{}", task.cancel().await?),
    };
    Ok(format!("{}ms {} -> {}", action.at_ms, action.kind, result))
}
