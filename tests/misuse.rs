mod common;
use crate::common::{Recorder, init_tracing, start_recorded, with_timeout};

use std::error::Error;

use pausable_task::errors::TaskError;
use pausable_task::{PausableTask, TaskOptions, TaskState, TokioActivityHost};

type TestResult = Result<(), Box<dyn Error>>;

#[tokio::test]
async fn resume_without_pause_is_an_error() -> TestResult {
    init_tracing();
    with_timeout(async {
        let (task, _recorder) = start_recorded("excess-resume", true).await;

        let err = task.resume().await.unwrap_err();
        assert!(matches!(err, TaskError::ResumeWithoutPause));
        assert_eq!(task.state(), TaskState::Running);

        // One pause, two resumes: the second one is rejected and the
        // counters are left untouched.
        task.pause().await?;
        task.resume().await?;
        assert!(matches!(
            task.resume().await.unwrap_err(),
            TaskError::ResumeWithoutPause
        ));
        let snapshot = task.snapshot();
        assert_eq!(snapshot.pause_requests, 0);
        assert_eq!(snapshot.unpause_requests, 0);

        task.cancel().await?;
        Ok(())
    })
    .await
}

#[tokio::test]
async fn running_twice_is_an_error() -> TestResult {
    init_tracing();
    with_timeout(async {
        let host = TokioActivityHost::new();
        let (task, _recorder) = start_recorded("double-run", true).await;

        let err = task.run(&host).unwrap_err();
        assert!(matches!(err, TaskError::AlreadyStarted));
        assert!(host.running().is_empty(), "rejected run starts no unit");
        assert_eq!(task.episode(), 1);

        task.cancel().await?;
        assert!(matches!(task.run(&host).unwrap_err(), TaskError::AlreadyStarted));
        Ok(())
    })
    .await
}

#[tokio::test]
async fn pause_and_resume_before_start_are_errors() -> TestResult {
    init_tracing();
    let task = PausableTask::new(Recorder::new().operation(), TaskOptions::named("idle"));

    assert!(matches!(task.request_pause().unwrap_err(), TaskError::NotStarted));
    assert!(matches!(task.pause().await.unwrap_err(), TaskError::NotStarted));
    assert!(matches!(task.resume().await.unwrap_err(), TaskError::NotStarted));
    assert_eq!(task.toggle_paused().await?, None);
    assert_eq!(task.pause_requests(), 0);
    assert!(!task.is_completed());
    Ok(())
}
