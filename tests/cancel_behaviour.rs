mod common;
use crate::common::{Recorder, init_tracing, start_recorded, wait_for_state, with_timeout};

use std::error::Error;
use std::time::Duration;

use pausable_task::errors::TaskError;
use pausable_task::{PausableTask, PauseStatus, TaskOptions, TaskState, TokioActivityHost};

type TestResult = Result<(), Box<dyn Error>>;

#[tokio::test]
async fn cancel_while_running() -> TestResult {
    init_tracing();
    with_timeout(async {
        let (task, recorder) = start_recorded("cancel-running", true).await;

        let outcome = task.cancel().await?;
        assert!(outcome.is_cancelled());
        assert!(task.state().is_cancelled());
        assert!(task.exception().is_none());
        assert_eq!(recorder.completed_calls(), vec![TaskState::BeforeCancelled]);
        assert!(recorder.paused_calls().is_empty());
        Ok(())
    })
    .await
}

#[tokio::test]
async fn cancel_wins_while_paused() -> TestResult {
    init_tracing();
    with_timeout(async {
        let (task, recorder) = start_recorded("cancel-paused", true).await;

        task.pause().await?;
        task.pause().await?;
        assert_eq!(task.pause_requests(), 2);

        // Outstanding pause requests do not hold back cancellation.
        let outcome = task.cancel().await?;
        assert!(outcome.is_cancelled());
        assert_eq!(task.state(), TaskState::AfterCancelled);
        assert_eq!(recorder.run_calls().len(), 1, "no further episode after cancel");
        Ok(())
    })
    .await
}

#[tokio::test]
async fn cancel_wins_over_a_pending_pause() -> TestResult {
    init_tracing();
    with_timeout(async {
        let (task, recorder) = start_recorded("cancel-vs-pause", true).await;

        // Both land before the episode notices its token.
        task.request_pause()?;
        assert!(task.request_cancellation()?);

        let outcome = task.wait_for_completion().await;
        assert!(outcome.is_cancelled());
        assert!(recorder.paused_calls().is_empty(), "cancel must not run on_paused");
        Ok(())
    })
    .await
}

#[tokio::test]
async fn pausers_waiting_on_a_cancelled_task_are_released() -> TestResult {
    init_tracing();
    with_timeout(async {
        let (task, _recorder) = start_recorded("release-pausers", true).await;

        task.pause().await?;
        let resumer = {
            let task = task.clone();
            tokio::spawn(async move { task.resume().await })
        };
        // The resumer is blocked behind our second pause request.
        assert_eq!(task.pause().await?, PauseStatus::Paused);

        task.cancel().await?;
        resumer.await??;
        Ok(())
    })
    .await
}

#[tokio::test]
async fn repeated_cancellation_is_harmless() -> TestResult {
    init_tracing();
    with_timeout(async {
        let (task, _recorder) = start_recorded("double-cancel", true).await;

        assert!(task.request_cancellation()?);
        assert!(!task.request_cancellation()?);

        let first = task.cancel().await?;
        let second = task.cancel().await?;
        assert!(first.is_cancelled());
        assert!(second.is_cancelled());
        Ok(())
    })
    .await
}

#[tokio::test]
async fn cancelling_the_activity_cancels_the_task() -> TestResult {
    init_tracing();
    with_timeout(async {
        let recorder = Recorder::new();
        let task = PausableTask::new(recorder.operation(), TaskOptions::named("host-cancel"));
        let activity = task.run(&TokioActivityHost::new())?;

        task.pause().await?;
        assert!(activity.cancel());

        let outcome = activity.wait().await;
        assert!(outcome.is_cancelled());
        assert!(task.outcome().is_some_and(|o| o.is_cancelled()));
        Ok(())
    })
    .await
}

#[tokio::test]
async fn non_cancellable_task_rejects_cancel() -> TestResult {
    init_tracing();
    with_timeout(async {
        let (task, recorder) = start_recorded("not-cancellable", false).await;
        assert!(!task.is_cancellable());

        let err = task.request_cancellation().unwrap_err();
        assert!(matches!(err, TaskError::NotCancellable));

        // Still pausable, and finishes normally.
        task.pause().await?;
        task.resume().await?;
        recorder.finish();
        assert!(task.wait_for_completion().await.is_completed());
        Ok(())
    })
    .await
}

#[tokio::test]
async fn cancel_before_start_is_rejected() -> TestResult {
    init_tracing();
    let task = PausableTask::new(Recorder::new().operation(), TaskOptions::named("idle"));

    assert!(matches!(
        task.request_cancellation().unwrap_err(),
        TaskError::NotStarted
    ));
    assert_eq!(task.state(), TaskState::WaitingForActivation);
    Ok(())
}

#[tokio::test]
async fn cancel_after_completion_keeps_the_outcome() -> TestResult {
    init_tracing();
    with_timeout(async {
        let (task, recorder) = start_recorded("cancel-late", true).await;
        recorder.finish();
        wait_for_state(&task, TaskState::AfterCompleted).await;

        assert!(!task.request_cancellation()?);
        assert!(task.cancel().await?.is_completed());
        tokio::time::sleep(Duration::from_millis(20)).await;
        assert_eq!(task.state(), TaskState::AfterCompleted);
        Ok(())
    })
    .await
}
