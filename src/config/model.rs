// src/config/model.rs

use serde::Deserialize;

use crate::types::ScenarioActionKind;

/// Construction options of a pausable task.
///
/// ```toml
/// [task]
/// name = "indexer"
/// cancellable = true
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct TaskOptions {
    /// Human-readable name used in logs, activities and listener events.
    #[serde(default = "default_task_name")]
    pub name: String,

    /// Whether the task owns a true cancellation token.
    ///
    /// A non-cancellable task rejects `request_cancellation` / `cancel`.
    #[serde(default = "default_cancellable")]
    pub cancellable: bool,
}

fn default_task_name() -> String {
    "pausable-task".to_string()
}

fn default_cancellable() -> bool {
    true
}

impl Default for TaskOptions {
    fn default() -> Self {
        Self {
            name: default_task_name(),
            cancellable: default_cancellable(),
        }
    }
}

impl TaskOptions {
    pub fn named(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Self::default()
        }
    }

    pub fn cancellable(mut self, cancellable: bool) -> Self {
        self.cancellable = cancellable;
        self
    }
}

/// Scenario file as read from TOML, before validation.
///
/// ```toml
/// [task]
/// name = "demo"
/// steps = 40
/// step_ms = 25
///
/// [[action]]
/// at_ms = 200
/// kind = "pause"
///
/// [[action]]
/// at_ms = 600
/// kind = "resume"
/// ```
#[derive(Debug, Clone, Deserialize)]
pub struct RawScenarioFile {
    #[serde(default)]
    pub task: ScenarioTask,

    /// Scripted actions, applied in file order.
    #[serde(default)]
    pub action: Vec<ScenarioAction>,
}

/// `[task]` section of a scenario: options plus the shape of the demo work.
#[derive(Debug, Clone, Deserialize)]
pub struct ScenarioTask {
    #[serde(default = "default_task_name")]
    pub name: String,

    #[serde(default = "default_cancellable")]
    pub cancellable: bool,

    /// Number of units of work the demo operation performs.
    #[serde(default = "default_steps")]
    pub steps: u32,

    /// Duration of one unit of work, in milliseconds.
    #[serde(default = "default_step_ms")]
    pub step_ms: u64,

    /// Fail the operation when it reaches this (0-based) step.
    #[serde(default)]
    pub fail_at_step: Option<u32>,
}

fn default_steps() -> u32 {
    20
}

fn default_step_ms() -> u64 {
    50
}

impl Default for ScenarioTask {
    fn default() -> Self {
        Self {
            name: default_task_name(),
            cancellable: default_cancellable(),
            steps: default_steps(),
            step_ms: default_step_ms(),
            fail_at_step: None,
        }
    }
}

impl ScenarioTask {
    pub fn options(&self) -> TaskOptions {
        TaskOptions {
            name: self.name.clone(),
            cancellable: self.cancellable,
        }
    }
}

/// One `[[action]]` entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
pub struct ScenarioAction {
    /// Offset from the start of the run.
    pub at_ms: u64,
    pub kind: ScenarioActionKind,
}

/// A validated scenario.
///
/// Normally constructed through `TryFrom<RawScenarioFile>` (see `validate.rs`).
#[derive(Debug, Clone)]
pub struct ScenarioFile {
    pub task: ScenarioTask,
    pub action: Vec<ScenarioAction>,
}

impl ScenarioFile {
    /// Skip validation. Running such a scenario may fail part-way.
    pub fn new_unchecked(task: ScenarioTask, action: Vec<ScenarioAction>) -> Self {
        Self { task, action }
    }
}
