//! Measurement and coherence maintenance driven through the public API.

use std::time::Duration;

use qsched::{SchedulerConfig, SchedulerEvent, TaskSpec, TaskStatus};

use crate::fixtures::{
    drain_events, fast_decay_config, let_coherence_decay, ml_pair, scheduler, scheduler_with,
};

fn is_working_status(status: TaskStatus) -> bool {
    matches!(
        status,
        TaskStatus::Planning | TaskStatus::Executing | TaskStatus::Optimizing
    )
}

#[tokio::test]
async fn test_decayed_states_are_measured() {
    let s = scheduler_with(fast_decay_config());
    let mut ids = Vec::new();
    for i in 0..5 {
        ids.push(s.create_task(TaskSpec::new(format!("t{i}"))).await.unwrap().id);
    }
    let mut rx = s.subscribe();

    let_coherence_decay().await;
    let report = s.measure_now().await;

    assert_eq!(report.measured, 5);
    assert_eq!(report.failures, 0);
    for id in &ids {
        let task = s.get_task(id).await.unwrap();
        assert!(is_working_status(task.status), "unexpected status {}", task.status);
        let state = s.get_state(id).unwrap();
        assert_eq!(state.measurement_count, 1);
        assert_eq!(state.collapse_history.len(), 1);
        assert!((0.5..1.0).contains(&state.coherence));
    }

    let metrics = s.get_metrics().await;
    assert_eq!(metrics.measurement_count, 5);
    assert_eq!(metrics.measurement_cycles, 1);

    let completed = drain_events(&mut rx)
        .into_iter()
        .filter(|e| matches!(e, SchedulerEvent::MeasurementCompleted { .. }))
        .count();
    assert_eq!(completed, 5);
}

#[tokio::test]
async fn test_fresh_states_are_mostly_left_alone() {
    let s = scheduler();
    for i in 0..10 {
        s.create_task(TaskSpec::new(format!("t{i}"))).await.unwrap();
    }
    // Every state is near full coherence, so only the random
    // re-measurement can pick one.
    let report = s.measure_now().await;
    assert!(report.measured < 10);
}

#[tokio::test]
async fn test_propagation_keeps_partners_normalized() {
    let s = scheduler_with(fast_decay_config());
    let (a, b) = ml_pair();
    let a = s.create_task(a).await.unwrap();
    let b = s.create_task(b).await.unwrap();
    assert_eq!(s.entanglements_of(&a.id).await.len(), 1);

    let_coherence_decay().await;
    let report = s.measure_now().await;
    assert_eq!(report.measured, 2);

    for id in [a.id, b.id] {
        let state = s.get_state(&id).unwrap();
        assert!((state.probability_sum() - 1.0).abs() <= 1e-3);
        assert!(state.check_integrity().is_ok());
        assert!(state.entangled);
    }
}

#[tokio::test]
async fn test_finished_tasks_are_not_measured() {
    let s = scheduler_with(fast_decay_config());
    let done = s.create_task(TaskSpec::new("done")).await.unwrap();
    s.create_task(TaskSpec::new("open")).await.unwrap();
    s.complete_task(done.id, true, 120).await.unwrap();

    let_coherence_decay().await;
    let report = s.measure_now().await;

    assert_eq!(report.measured, 1);
    assert_eq!(s.get_task(&done.id).await.unwrap().status, TaskStatus::Completed);
    assert_eq!(s.get_state(&done.id).unwrap().measurement_count, 0);
}

#[tokio::test]
async fn test_collapsed_coherence_is_regenerated() {
    let s = scheduler_with(fast_decay_config());
    let task = s.create_task(TaskSpec::new("fragile")).await.unwrap();

    // exp(-300 / 100) is well under the regeneration threshold.
    tokio::time::sleep(Duration::from_millis(300)).await;
    let report = s.maintain_coherence_now().await;

    assert_eq!(report.decayed, 1);
    assert_eq!(report.regenerated, 1);
    assert_eq!(report.removed, 0);

    let state = s.get_state(&task.id).unwrap();
    assert_eq!(state.coherence, 0.8);
    assert_eq!(state.regenerations, 1);
    assert!((state.probability_sum() - 1.0).abs() <= 1e-3);
    assert_eq!(s.get_metrics().await.regenerations, 1);
}

#[tokio::test]
async fn test_finished_tasks_are_not_regenerated() {
    let s = scheduler_with(fast_decay_config());
    let task = s.create_task(TaskSpec::new("done")).await.unwrap();
    s.complete_task(task.id, false, 50).await.unwrap();

    tokio::time::sleep(Duration::from_millis(300)).await;
    let report = s.maintain_coherence_now().await;

    assert_eq!(report.regenerated, 0);
    assert!(s.get_state(&task.id).unwrap().coherence < 0.1);
}

#[tokio::test]
async fn test_maintenance_always_decays_at_least_five_percent() {
    let s = scheduler_with(fast_decay_config());
    let task = s.create_task(TaskSpec::new("steady")).await.unwrap();
    s.maintain_coherence_now().await;
    assert!(s.get_state(&task.id).unwrap().coherence <= 0.95);
}

#[tokio::test]
async fn test_cycle_over_threshold_reports_slow_cycle() {
    let s = scheduler_with(SchedulerConfig {
        slow_cycle_threshold_ms: 0,
        ..fast_decay_config()
    });
    for i in 0..3 {
        s.create_task(TaskSpec::new(format!("t{i}"))).await.unwrap();
    }
    let mut rx = s.subscribe();

    let_coherence_decay().await;
    let report = s.measure_now().await;
    assert_eq!(report.measured, 3);

    let slow: Vec<(f64, usize)> = drain_events(&mut rx)
        .into_iter()
        .filter_map(|e| match e {
            SchedulerEvent::SlowCycle {
                duration_ms,
                measured,
            } => Some((duration_ms, measured)),
            _ => None,
        })
        .collect();
    assert_eq!(slow.len(), 1);
    assert_eq!(slow[0].1, 3);
    assert!(slow[0].0 > 0.0);
}
