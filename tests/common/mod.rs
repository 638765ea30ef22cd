#![allow(dead_code, unused_imports)]

pub use pausable_task_test_utils::builders;
pub use pausable_task_test_utils::recorder::{Recorder, RecordingOperation};
pub use pausable_task_test_utils::{init_tracing, wait_for_state, wait_until, with_timeout};

use pausable_task::{PausableTask, TaskOptions, TokioActivityHost};

/// Start a recorder-backed task on a fresh host and wait for its first episode.
pub async fn start_recorded(name: &str, cancellable: bool) -> (PausableTask, Recorder) {
    let recorder = Recorder::new();
    let task = PausableTask::new(
        recorder.operation(),
        TaskOptions::named(name).cancellable(cancellable),
    );
    let host = TokioActivityHost::new();
    task.run(&host).expect("task should start");

    let watcher = recorder.clone();
    wait_until("first episode started", move || !watcher.run_calls().is_empty()).await;
    (task, recorder)
}
