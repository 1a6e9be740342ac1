//! Actor lifecycle, events, completion and retention.

use std::time::Duration;

use qsched::{Error, SchedulerConfig, SchedulerEvent, TaskId, TaskSpec, TaskStatus};

use crate::fixtures::{drain_events, fast_decay_config, ml_pair, scheduler, scheduler_with};

#[tokio::test]
async fn test_create_emits_task_created() {
    let s = scheduler();
    let mut rx = s.subscribe();
    let task = s.create_task(TaskSpec::new("emit")).await.unwrap();

    let events = drain_events(&mut rx);
    assert!(events.iter().any(|e| matches!(
        e,
        SchedulerEvent::TaskCreated { task_id, name } if *task_id == task.id && name == "emit"
    )));
}

#[tokio::test]
async fn test_complete_task_reports_outcome_once() {
    let s = scheduler();
    let mut rx = s.subscribe();
    let task = s.create_task(TaskSpec::new("job")).await.unwrap();

    let done = s.complete_task(task.id, false, 300).await.unwrap();
    assert_eq!(done.status, TaskStatus::Failed);
    assert_eq!(done.actual_duration_ms, Some(300));
    assert!(drain_events(&mut rx).iter().any(|e| matches!(
        e,
        SchedulerEvent::TaskCompleted { success: false, .. }
    )));

    let again = s.complete_task(task.id, true, 10).await.unwrap_err();
    assert!(matches!(again, Error::Validation(_)));
    let missing = s
        .complete_task(TaskId::new(), true, 10)
        .await
        .unwrap_err();
    assert!(matches!(missing, Error::TaskNotFound(_)));
}

#[tokio::test]
async fn test_running_actors_measure_periodically() {
    let s = scheduler_with(SchedulerConfig {
        adaptation_interval_ms: 100,
        ..fast_decay_config()
    });
    for i in 0..4 {
        s.create_task(TaskSpec::new(format!("t{i}"))).await.unwrap();
    }

    s.start();
    assert!(s.is_running());
    s.start();

    tokio::time::sleep(Duration::from_millis(450)).await;
    let metrics = s.get_metrics().await;
    assert!(metrics.measurement_cycles >= 2, "cycles = {}", metrics.measurement_cycles);
    assert!(metrics.measurement_count >= 1);
    assert!(metrics.average_cycle_ms.is_some());

    s.shutdown().await;
    assert!(!s.is_running());
}

#[tokio::test]
async fn test_shutdown_is_idempotent_and_clears_state() {
    let s = scheduler_with(fast_decay_config());
    let (a, b) = ml_pair();
    s.create_task(a).await.unwrap();
    s.create_task(b).await.unwrap();
    s.start();

    s.shutdown().await;
    s.shutdown().await;

    assert!(s.is_shut_down());
    let metrics = s.get_metrics().await;
    assert_eq!(metrics.task_count, 0);
    assert_eq!(metrics.state_count, 0);
    assert_eq!(metrics.entanglement_count, 0);
    assert_eq!(metrics.telemetry_records, 0);

    let err = s.create_task(TaskSpec::new("late")).await.unwrap_err();
    assert!(matches!(err, Error::Validation(_)));

    s.start();
    assert!(!s.is_running());
}

#[tokio::test]
async fn test_shutdown_without_start() {
    let s = scheduler();
    s.create_task(TaskSpec::new("idle")).await.unwrap();
    s.shutdown().await;
    assert_eq!(s.task_count().await, 0);
}

#[tokio::test]
async fn test_completed_tasks_are_retired() {
    let s = scheduler_with(SchedulerConfig {
        completed_retention_ms: 0,
        ..fast_decay_config()
    });
    let (a, b) = ml_pair();
    let a = s.create_task(a).await.unwrap();
    let b = s.create_task(b).await.unwrap();
    assert!(s.get_state(&b.id).unwrap().entangled);

    s.complete_task(a.id, true, 100).await.unwrap();
    tokio::time::sleep(Duration::from_millis(5)).await;
    let report = s.maintain_coherence_now().await;

    assert_eq!(report.removed, 1);
    assert!(s.get_task(&a.id).await.is_none());
    assert!(s.get_state(&a.id).is_none());
    assert!(s.entanglements_of(&b.id).await.is_empty());
    assert!(!s.get_state(&b.id).unwrap().entangled);

    let metrics = s.get_metrics().await;
    assert_eq!(metrics.task_count, 1);
    assert_eq!(metrics.state_count, 1);
    assert_eq!(metrics.entanglement_count, 0);
}

#[tokio::test]
async fn test_failed_tasks_are_kept() {
    let s = scheduler_with(SchedulerConfig {
        completed_retention_ms: 0,
        ..fast_decay_config()
    });
    let task = s.create_task(TaskSpec::new("broken")).await.unwrap();
    s.complete_task(task.id, false, 100).await.unwrap();
    tokio::time::sleep(Duration::from_millis(5)).await;

    assert_eq!(s.maintain_coherence_now().await.removed, 0);
    assert!(s.get_task(&task.id).await.is_some());
}

#[tokio::test]
async fn test_nil_id_is_rejected_before_anything_changes() {
    let s = scheduler();
    let mut rx = s.subscribe();
    let nil = TaskId(uuid::Uuid::nil());

    let err = s.create_task(TaskSpec::new("nil").with_id(nil)).await.unwrap_err();
    assert!(matches!(err, Error::Validation(_)));
    assert_eq!(s.task_count().await, 0);
    assert!(s.get_state(&nil).is_none());
    assert!(drain_events(&mut rx).is_empty());

    let err = s.complete_task(nil, true, 10).await.unwrap_err();
    assert!(matches!(err, Error::TaskNotFound(_)));
    assert_eq!(s.get_metrics().await.telemetry_records, 0);
}
