// src/scenario/counting.rs

use std::sync::atomic::{AtomicU32, Ordering};
use std::time::Duration;

use anyhow::anyhow;
use tracing::{debug, info};

use crate::activity::Activity;
use crate::config::ScenarioTask;
use crate::engine::{
    BoxFuture, EpisodeError, PausableOperation, PausableTask, SuspensionToken, TaskState,
};

/// Performs `steps` units of work of `step` each.
///
/// Completed steps are stored on the operation, so a resumed episode picks
/// up where the interrupted one stopped; the step in flight when a pause
/// arrives is redone.
#[derive(Debug)]
pub struct CountingOperation {
    steps: u32,
    step: Duration,
    fail_at_step: Option<u32>,
    done: AtomicU32,
    episodes: AtomicU32,
}

impl CountingOperation {
    pub fn new(steps: u32, step: Duration) -> Self {
        Self {
            steps,
            step,
            fail_at_step: None,
            done: AtomicU32::new(0),
            episodes: AtomicU32::new(0),
        }
    }

    pub fn failing_at(mut self, step: u32) -> Self {
        self.fail_at_step = Some(step);
        self
    }

    pub fn from_task(task: &ScenarioTask) -> Self {
        let op = Self::new(task.steps, Duration::from_millis(task.step_ms));
        match task.fail_at_step {
            Some(step) => op.failing_at(step),
            None => op,
        }
    }

    pub fn steps_done(&self) -> u32 {
        self.done.load(Ordering::SeqCst)
    }

    pub fn episodes(&self) -> u32 {
        self.episodes.load(Ordering::SeqCst)
    }

    async fn count(&self, token: SuspensionToken) -> Result<(), EpisodeError> {
        let activity = Activity::current();

        loop {
            let done = self.done.load(Ordering::SeqCst);
            if done >= self.steps {
                return Ok(());
            }
            if self.fail_at_step == Some(done) {
                return Err(anyhow!("step {done} failed").into());
            }

            token.sleep(self.step).await?;

            let done = self.done.fetch_add(1, Ordering::SeqCst) + 1;
            if let Some(activity) = &activity {
                activity.report_progress(
                    Some(done as f32 / self.steps as f32),
                    format!("step {done}/{}", self.steps),
                );
            }
        }
    }
}

impl PausableOperation for CountingOperation {
    fn run_operation(
        &self,
        token: SuspensionToken,
        is_first_episode: bool,
    ) -> BoxFuture<'_, Result<(), EpisodeError>> {
        let episode = self.episodes.fetch_add(1, Ordering::SeqCst) + 1;
        debug!(
            episode,
            is_first_episode,
            done = self.steps_done(),
            "counting episode started"
        );
        Box::pin(self.count(token))
    }

    fn on_paused<'a>(
        &'a self,
        task: &'a PausableTask,
        _is_first_episode: bool,
    ) -> BoxFuture<'a, anyhow::Result<()>> {
        Box::pin(async move {
            info!(task = %task.name(), done = self.steps_done(), "paused");
            Ok(())
        })
    }

    fn on_completed<'a>(
        &'a self,
        task: &'a PausableTask,
        state: TaskState,
    ) -> BoxFuture<'a, anyhow::Result<()>> {
        Box::pin(async move {
            info!(task = %task.name(), ?state, done = self.steps_done(), "counting finished");
            Ok(())
        })
    }
}
