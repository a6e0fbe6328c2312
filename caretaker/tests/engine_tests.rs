//! Engine tests: mutual exclusion per task id, event loop and cancellation

mod common;

use caretaker::errors::EngineError;
use caretaker::scheduler::{FireEvent, Trigger};
use caretaker::{RetryPolicy, RunStatus, TaskSpec};
use common::fixtures::{FlakyTask, Harness, PanickingTask, SlowTask};
use std::sync::Arc;
use std::time::Duration;

fn spec(id: &str) -> TaskSpec {
    TaskSpec {
        id: id.to_string(),
        schedule: Some("0 0 3 * * *".to_string()),
        command_ref: format!("test:{}", id),
        timeout: Duration::from_secs(10),
        retry_policy: RetryPolicy::none(),
    }
}

#[tokio::test]
async fn test_second_fire_while_running_is_refused() {
    let harness = Harness::new().await;
    let engine = harness.engine();
    let task = SlowTask::new(20, Duration::from_millis(10));
    engine.register(spec("slow"), task.clone()).await.unwrap();

    let first = engine.fire("slow", Trigger::Schedule).await.unwrap();
    let second = engine.fire("slow", Trigger::Manual).await;

    assert!(matches!(second, Err(EngineError::TaskBusy { .. })));
    assert_eq!(engine.active().await.total_active, 1);

    let outcome = first.handle.await.unwrap();
    assert!(outcome.succeeded());
    assert_eq!(outcome.run_id, first.run_id);
    assert_eq!(task.calls(), 1, "refused fire did not queue a second run");

    // free again once the run completed
    let third = engine.run_now("slow").await.unwrap();
    assert!(third.succeeded());
    assert_eq!(third.trigger, Trigger::Manual);
    assert_eq!(engine.active().await.total_active, 0);
}

#[tokio::test]
async fn test_different_tasks_run_concurrently() {
    let harness = Harness::new().await;
    let engine = harness.engine();
    engine
        .register(spec("a"), SlowTask::new(10, Duration::from_millis(10)))
        .await
        .unwrap();
    engine
        .register(spec("b"), SlowTask::new(10, Duration::from_millis(10)))
        .await
        .unwrap();

    let a = engine.fire("a", Trigger::Schedule).await.unwrap();
    let b = engine.fire("b", Trigger::Schedule).await.unwrap();
    assert_eq!(engine.active().await.total_active, 2);

    assert!(a.handle.await.unwrap().succeeded());
    assert!(b.handle.await.unwrap().succeeded());
}

#[tokio::test]
async fn test_cancel_stops_running_task() {
    let harness = Harness::new().await;
    let engine = harness.engine();
    engine
        .register(spec("slow"), SlowTask::new(100, Duration::from_millis(10)))
        .await
        .unwrap();

    let fired = engine.fire("slow", Trigger::Manual).await.unwrap();
    engine.cancel("slow").await.unwrap();
    let outcome = fired.handle.await.unwrap();

    assert_eq!(outcome.status, RunStatus::Cancelled);
    assert!(matches!(
        engine.cancel("slow").await,
        Err(EngineError::NotFound { kind: "RunningTask", .. })
    ));
}

#[tokio::test]
async fn test_unknown_and_deregistered_tasks_are_not_found() {
    let harness = Harness::new().await;
    let engine = harness.engine();
    engine.register(spec("once"), FlakyTask::new(0)).await.unwrap();

    assert!(matches!(
        engine.register(spec("once"), FlakyTask::new(0)).await,
        Err(EngineError::DuplicateTask { .. })
    ));
    assert_eq!(engine.task("once").await.unwrap().kind, "flaky");

    engine.deregister("once").await.unwrap();
    assert!(engine.tasks().await.is_empty());
    assert!(matches!(
        engine.fire("once", Trigger::Manual).await,
        Err(EngineError::NotFound { kind: "Task", .. })
    ));
}

#[tokio::test]
async fn test_event_loop_fires_tasks_from_channel() {
    let harness = Harness::new().await;
    let engine = harness.engine();
    let task = FlakyTask::new(0);
    engine.register(spec("scheduled"), task.clone()).await.unwrap();

    let handle = engine.spawn_event_loop().await;
    assert!(handle.is_some());
    assert!(
        engine.spawn_event_loop().await.is_none(),
        "only one loop per engine"
    );

    engine
        .sender()
        .send(FireEvent::new("scheduled", Trigger::Schedule))
        .await
        .unwrap();

    let mut status = None;
    for _ in 0..100 {
        let runs = harness
            .database
            .get_task_runs(Some("scheduled"), 10)
            .await
            .unwrap();
        if let Some(run) = runs.first().filter(|r| r.status != "running") {
            status = Some(run.status.clone());
            break;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }

    assert_eq!(status.as_deref(), Some("succeeded"));
    assert_eq!(task.calls(), 1);
}

#[tokio::test]
async fn test_panicking_task_does_not_stay_busy() {
    let harness = Harness::new().await;
    let engine = harness.engine();
    engine
        .register(spec("panicking"), Arc::new(PanickingTask))
        .await
        .unwrap();

    let first = engine.run_now("panicking").await.unwrap();
    assert_eq!(first.status, RunStatus::Failed);
    assert_eq!(engine.active().await.total_active, 0);

    let second = engine.run_now("panicking").await;
    assert!(
        !matches!(second, Err(EngineError::TaskBusy { .. })),
        "id stayed claimed after a panic"
    );
    assert_eq!(second.unwrap().status, RunStatus::Failed);
}
