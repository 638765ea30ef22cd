// src/config/validate.rs

use crate::config::model::{RawScenarioFile, ScenarioFile};
use crate::errors::{Result, TaskError};
use crate::types::ScenarioActionKind;

impl TryFrom<RawScenarioFile> for ScenarioFile {
    type Error = TaskError;

    fn try_from(raw: RawScenarioFile) -> std::result::Result<Self, Self::Error> {
        validate_scenario(&raw)?;
        Ok(ScenarioFile::new_unchecked(raw.task, raw.action))
    }
}

fn validate_scenario(raw: &RawScenarioFile) -> Result<()> {
    validate_task(raw)?;
    validate_action_order(raw)?;
    validate_pause_pairing(raw)?;
    Ok(())
}

fn validate_task(raw: &RawScenarioFile) -> Result<()> {
    let task = &raw.task;

    if task.name.trim().is_empty() {
        return Err(TaskError::ConfigError(
            "[task].name must not be empty".to_string(),
        ));
    }
    if task.steps == 0 {
        return Err(TaskError::ConfigError(
            "[task].steps must be >= 1 (got 0)".to_string(),
        ));
    }
    if task.step_ms == 0 {
        return Err(TaskError::ConfigError(
            "[task].step_ms must be >= 1 (got 0)".to_string(),
        ));
    }
    if let Some(fail_at) = task.fail_at_step {
        if fail_at >= task.steps {
            return Err(TaskError::ConfigError(format!(
                "[task].fail_at_step ({fail_at}) must be < steps ({})",
                task.steps
            )));
        }
    }
    Ok(())
}

fn validate_action_order(raw: &RawScenarioFile) -> Result<()> {
    for pair in raw.action.windows(2) {
        if pair[1].at_ms < pair[0].at_ms {
            return Err(TaskError::ConfigError(format!(
                "actions must be ordered by at_ms: {} at {}ms follows {} at {}ms",
                pair[1].kind, pair[1].at_ms, pair[0].kind, pair[0].at_ms
            )));
        }
    }
    Ok(())
}

/// Every `resume` needs an earlier, unreleased pause; `cancel` needs a
/// cancellable task; the script must not leave the task paused forever.
fn validate_pause_pairing(raw: &RawScenarioFile) -> Result<()> {
    let mut outstanding: u32 = 0;
    let mut cancelled = false;

    for (idx, action) in raw.action.iter().enumerate() {
        match action.kind {
            ScenarioActionKind::Pause | ScenarioActionKind::RequestPause => outstanding += 1,
            ScenarioActionKind::Resume => {
                if outstanding == 0 {
                    return Err(TaskError::ConfigError(format!(
                        "action #{idx} (resume at {}ms) has no matching pause",
                        action.at_ms
                    )));
                }
                outstanding -= 1;
            }
            ScenarioActionKind::Toggle => {
                if outstanding > 0 {
                    outstanding -= 1;
                } else {
                    outstanding += 1;
                }
            }
            ScenarioActionKind::Cancel => {
                if !raw.task.cancellable {
                    return Err(TaskError::ConfigError(format!(
                        "action #{idx} (cancel at {}ms) targets a non-cancellable task",
                        action.at_ms
                    )));
                }
                cancelled = true;
            }
        }
    }

    // A task left paused without a cancel would never finish.
    if outstanding > 0 && !cancelled {
        return Err(TaskError::ConfigError(format!(
            "{outstanding} pause action(s) are never resumed and the task is never cancelled"
        )));
    }
    Ok(())
}
