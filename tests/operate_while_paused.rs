mod common;
use crate::common::{Recorder, init_tracing, start_recorded, wait_until, with_timeout};

use std::error::Error;
use std::sync::Arc;
use std::time::Duration;
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};

use pausable_task::engine::BoxFuture;
use pausable_task::{
    EpisodeError, PausableOperation, PausableTask, SuspensionToken, TaskOptions, TaskState,
    TokioActivityHost,
};

type TestResult = Result<(), Box<dyn Error>>;

#[tokio::test]
async fn running_task_is_paused_around_the_callback() -> TestResult {
    init_tracing();
    with_timeout(async {
        let (task, recorder) = start_recorded("operate-running", true).await;

        let inspected = task.clone();
        let seen = task
            .operate_while_paused(|| async move { inspected.state() }, false, false)
            .await?;
        assert_eq!(seen, Some(TaskState::AfterPaused));

        // Resumed afterwards, with a restarted episode.
        assert_eq!(task.state(), TaskState::Running);
        assert_eq!(task.pause_requests(), 0);
        assert_eq!(recorder.paused_calls(), vec![true]);

        task.cancel().await?;
        Ok(())
    })
    .await
}

#[tokio::test]
async fn paused_task_runs_the_callback_immediately() -> TestResult {
    init_tracing();
    with_timeout(async {
        let (task, recorder) = start_recorded("operate-paused", true).await;
        task.pause().await?;

        let out = task.operate_while_paused(|| async { 7 }, false, false).await?;
        assert_eq!(out, Some(7));
        assert_eq!(task.state(), TaskState::AfterPaused);
        assert_eq!(task.pause_requests(), 1);
        assert_eq!(recorder.paused_calls().len(), 1);

        task.resume().await?;
        task.cancel().await?;
        Ok(())
    })
    .await
}

#[tokio::test]
async fn resume_from_another_caller_waits_for_the_callback() -> TestResult {
    init_tracing();
    with_timeout(async {
        let (task, recorder) = start_recorded("operate-held", true).await;
        task.pause().await?;

        let owner = task.clone();
        let inspected = task.clone();
        let (seen, held, resumer) = task
            .operate_while_paused(
                move || async move {
                    // The owner of the first pause lets go mid-callback.
                    let resumer = tokio::spawn(async move { owner.resume().await });
                    tokio::time::sleep(Duration::from_millis(100)).await;
                    (inspected.state(), inspected.pause_requests(), resumer)
                },
                false,
                false,
            )
            .await?
            .ok_or("callback was skipped")?;

        assert_eq!(seen, TaskState::AfterPaused);
        assert_eq!(held, 1);
        assert_eq!(recorder.run_calls().len(), 1);

        // The callback's own request is gone; the owner's resume goes through.
        resumer.await??;
        assert_eq!(task.state(), TaskState::Running);
        assert_eq!(task.pause_requests(), 0);
        assert_eq!(task.snapshot().unpause_requests, 0);
        assert_eq!(recorder.paused_calls().len(), 1);

        task.cancel().await?;
        Ok(())
    })
    .await
}

#[tokio::test]
async fn panicking_callback_releases_its_pause() -> TestResult {
    init_tracing();
    with_timeout(async {
        let (task, recorder) = start_recorded("operate-panic", true).await;

        let caller = task.clone();
        let joined = tokio::spawn(async move {
            caller
                .operate_while_paused::<_, _, ()>(
                    || async { panic!("callback failed") },
                    false,
                    false,
                )
                .await
        })
        .await;
        assert!(joined.is_err_and(|err| err.is_panic()));

        let watcher = recorder.clone();
        wait_until("second episode started", move || watcher.run_calls().len() == 2).await;
        assert_eq!(task.state(), TaskState::Running);
        assert_eq!(task.pause_requests(), 0);
        assert_eq!(task.snapshot().unpause_requests, 0);

        task.cancel().await?;
        Ok(())
    })
    .await
}

#[tokio::test]
async fn terminal_task_respects_the_flags() -> TestResult {
    init_tracing();
    with_timeout(async {
        let (completed, recorder) = start_recorded("operate-completed", true).await;
        recorder.finish();
        completed.wait_for_completion().await;
        let out = completed.operate_while_paused(|| async { "ran" }, false, false).await?;
        assert_eq!(out, Some("ran"));

        let (cancelled, _recorder) = start_recorded("operate-cancelled", true).await;
        cancelled.cancel().await?;
        let skipped = cancelled.operate_while_paused(|| async { "ran" }, true, false).await?;
        assert_eq!(skipped, None);
        let allowed = cancelled.operate_while_paused(|| async { "ran" }, false, true).await?;
        assert_eq!(allowed, Some("ran"));

        let (faulted, recorder) = start_recorded("operate-faulted", true).await;
        recorder.fail("boom");
        faulted.wait_for_completion().await;
        let skipped = faulted.operate_while_paused(|| async { "ran" }, false, true).await?;
        assert_eq!(skipped, None);
        let allowed = faulted.operate_while_paused(|| async { "ran" }, true, false).await?;
        assert_eq!(allowed, Some("ran"));
        Ok(())
    })
    .await
}

#[tokio::test]
async fn task_that_never_started_runs_the_callback() -> TestResult {
    init_tracing();
    let task = PausableTask::new(Recorder::new().operation(), TaskOptions::named("not-started"));
    let out = task.operate_while_paused(|| async { 1 }, false, false).await?;
    assert_eq!(out, Some(1));
    assert_eq!(task.state(), TaskState::WaitingForActivation);
    Ok(())
}

/// Calls back into the task's public API from `on_paused`.
struct ReentrantOperation {
    hook_ran: AtomicBool,
    episodes: AtomicU32,
}

impl PausableOperation for ReentrantOperation {
    fn run_operation(
        &self,
        token: SuspensionToken,
        _is_first_episode: bool,
    ) -> BoxFuture<'_, Result<(), EpisodeError>> {
        self.episodes.fetch_add(1, Ordering::SeqCst);
        Box::pin(async move {
            token.interrupted().await;
            Err(EpisodeError::Interrupted)
        })
    }

    fn on_paused<'a>(
        &'a self,
        task: &'a PausableTask,
        _is_first_episode: bool,
    ) -> BoxFuture<'a, anyhow::Result<()>> {
        Box::pin(async move {
            let state = task.state();
            let ran = task
                .operate_while_paused(|| async { task.pause_requests() }, false, false)
                .await?;
            assert_eq!(state, TaskState::BeforePaused);
            assert_eq!(ran, Some(1));
            self.hook_ran.store(true, Ordering::SeqCst);
            Ok(())
        })
    }
}

#[tokio::test]
async fn on_paused_may_call_back_into_the_task() -> TestResult {
    init_tracing();
    with_timeout(async {
        let operation = Arc::new(ReentrantOperation {
            hook_ran: AtomicBool::new(false),
            episodes: AtomicU32::new(0),
        });
        let task = PausableTask::from_arc(operation.clone(), TaskOptions::named("reentrant"));
        task.run(&TokioActivityHost::new())?;

        task.pause().await?;
        assert!(operation.hook_ran.load(Ordering::SeqCst));
        task.resume().await?;
        assert_eq!(task.state(), TaskState::Running);

        task.cancel().await?;
        assert_eq!(operation.episodes.load(Ordering::SeqCst), 2);
        Ok(())
    })
    .await
}
