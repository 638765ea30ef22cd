#![allow(dead_code)]

use pausable_task::config::{RawScenarioFile, ScenarioAction, ScenarioFile, ScenarioTask};
use pausable_task::types::ScenarioActionKind;

/// Builder for `ScenarioFile` to simplify test setup.
pub struct ScenarioBuilder {
    scenario: RawScenarioFile,
}

impl ScenarioBuilder {
    pub fn new(name: &str) -> Self {
        Self {
            scenario: RawScenarioFile {
                task: ScenarioTask {
                    name: name.to_string(),
                    ..ScenarioTask::default()
                },
                action: Vec::new(),
            },
        }
    }

    pub fn steps(mut self, steps: u32, step_ms: u64) -> Self {
        self.scenario.task.steps = steps;
        self.scenario.task.step_ms = step_ms;
        self
    }

    pub fn cancellable(mut self, val: bool) -> Self {
        self.scenario.task.cancellable = val;
        self
    }

    pub fn fail_at_step(mut self, step: u32) -> Self {
        self.scenario.task.fail_at_step = Some(step);
        self
    }

    pub fn action(mut self, at_ms: u64, kind: ScenarioActionKind) -> Self {
        self.scenario.action.push(ScenarioAction { at_ms, kind });
        self
    }

    /// The unvalidated scenario, for exercising validation errors.
    pub fn raw(self) -> RawScenarioFile {
        self.scenario
    }

    pub fn build(self) -> ScenarioFile {
        ScenarioFile::try_from(self.scenario).expect("Failed to build valid scenario from builder")
    }

    /// A scenario that skips validation, for scripts that fail at run time.
    pub fn build_unchecked(self) -> ScenarioFile {
        ScenarioFile::new_unchecked(self.scenario.task, self.scenario.action)
    }
}
