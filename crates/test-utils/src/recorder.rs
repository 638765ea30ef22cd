use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use anyhow::anyhow;
use pausable_task::engine::BoxFuture;
use pausable_task::{EpisodeError, PausableOperation, PausableTask, SuspensionToken, TaskState};

/// Shared record of everything a [`RecordingOperation`] was asked to do.
#[derive(Default)]
struct RecorderState {
    runs: Mutex<Vec<bool>>,
    paused_hooks: Mutex<Vec<bool>>,
    completed_hooks: Mutex<Vec<TaskState>>,
    finish: AtomicBool,
    fail: Mutex<Option<String>>,
    spurious_interrupt: AtomicBool,
    fail_on_paused_hook: AtomicBool,
}

/// Test-side handle controlling and inspecting a [`RecordingOperation`].
#[derive(Clone, Default)]
pub struct Recorder {
    state: Arc<RecorderState>,
}

/// Operation that loops, checking its suspension token every 5ms, until the
/// test tells it to finish or fail.
pub struct RecordingOperation {
    state: Arc<RecorderState>,
    poll: Duration,
}

impl Recorder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn operation(&self) -> RecordingOperation {
        RecordingOperation {
            state: Arc::clone(&self.state),
            poll: Duration::from_millis(5),
        }
    }

    /// `is_first_episode` of every `run_operation` call, in order.
    pub fn run_calls(&self) -> Vec<bool> {
        self.state.runs.lock().unwrap().clone()
    }

    /// `is_first_episode` of every `on_paused` call, in order.
    pub fn paused_calls(&self) -> Vec<bool> {
        self.state.paused_hooks.lock().unwrap().clone()
    }

    pub fn completed_calls(&self) -> Vec<TaskState> {
        self.state.completed_hooks.lock().unwrap().clone()
    }

    /// Let the current (or next) episode return `Ok(())`.
    pub fn finish(&self) {
        self.state.finish.store(true, Ordering::SeqCst);
    }

    /// Let the current (or next) episode fail with `message`.
    pub fn fail(&self, message: &str) {
        *self.state.fail.lock().unwrap() = Some(message.to_string());
    }

    /// Make the episode report an interruption nobody asked for.
    pub fn interrupt_spuriously(&self) {
        self.state.spurious_interrupt.store(true, Ordering::SeqCst);
    }

    /// Make `on_paused` return an error.
    pub fn fail_on_paused_hook(&self) {
        self.state.fail_on_paused_hook.store(true, Ordering::SeqCst);
    }
}

impl PausableOperation for RecordingOperation {
    fn run_operation(
        &self,
        token: SuspensionToken,
        is_first_episode: bool,
    ) -> BoxFuture<'_, Result<(), EpisodeError>> {
        self.state.runs.lock().unwrap().push(is_first_episode);

        Box::pin(async move {
            loop {
                if let Some(message) = self.state.fail.lock().unwrap().clone() {
                    return Err(anyhow!(message).into());
                }
                if self.state.finish.load(Ordering::SeqCst) {
                    return Ok(());
                }
                if self.state.spurious_interrupt.load(Ordering::SeqCst) {
                    return Err(EpisodeError::Interrupted);
                }
                token.check()?;
                tokio::time::sleep(self.poll).await;
            }
        })
    }

    fn on_paused<'a>(
        &'a self,
        _task: &'a PausableTask,
        is_first_episode: bool,
    ) -> BoxFuture<'a, anyhow::Result<()>> {
        Box::pin(async move {
            self.state.paused_hooks.lock().unwrap().push(is_first_episode);
            if self.state.fail_on_paused_hook.load(Ordering::SeqCst) {
                return Err(anyhow!("on_paused hook failure"));
            }
            Ok(())
        })
    }

    fn on_completed<'a>(
        &'a self,
        _task: &'a PausableTask,
        state: TaskState,
    ) -> BoxFuture<'a, anyhow::Result<()>> {
        Box::pin(async move {
            self.state.completed_hooks.lock().unwrap().push(state);
            Ok(())
        })
    }
}
