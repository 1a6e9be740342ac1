//! Task creation: validation, cycle detection and entanglement.

use qsched::core::EntanglementKind;
use qsched::{Error, ResourceEstimate, SchedulerEvent, TaskId, TaskSpec, TaskStatus};

use crate::fixtures::{drain_events, ml_pair, scheduler, scheduler_with, seeded_config};

#[tokio::test]
async fn test_empty_name_is_rejected() {
    let s = scheduler();
    let err = s.create_task(TaskSpec::new("")).await.unwrap_err();
    assert!(matches!(err, Error::Validation(_)));
    assert_eq!(s.task_count().await, 0);
}

#[tokio::test]
async fn test_new_task_starts_in_superposition_with_normalized_state() {
    let s = scheduler();
    let task = s.create_task(TaskSpec::new("index")).await.unwrap();
    assert_eq!(task.status, TaskStatus::Superposition);

    let state = s.get_state(&task.id).unwrap();
    let sum: f64 = state.candidates.iter().map(|c| c.probability).sum();
    assert!((sum - 1.0).abs() <= 1e-3);
    for c in &state.candidates {
        assert!((c.probability - c.amplitude * c.amplitude).abs() < 1e-9);
    }
    assert_eq!(state.coherence, 1.0);
}

#[tokio::test]
async fn test_self_dependency_is_a_cycle() {
    let s = scheduler();
    let id = TaskId::new();
    let err = s
        .create_task(TaskSpec::new("loop").with_id(id).with_dependencies([id]))
        .await
        .unwrap_err();
    assert!(matches!(err, Error::CircularDependency { .. }));
    assert!(s.get_state(&id).is_none());
}

#[tokio::test]
async fn test_two_task_cycle_through_pending_dependency() {
    let s = scheduler();
    let a = TaskId::new();
    let b = TaskId::new();

    s.create_task(TaskSpec::new("a").with_id(a).with_dependencies([b]))
        .await
        .unwrap();
    let err = s
        .create_task(TaskSpec::new("b").with_id(b).with_dependencies([a]))
        .await
        .unwrap_err();

    match err {
        Error::CircularDependency { task, path } => {
            assert_eq!(task, b);
            assert_eq!(path.first(), Some(&b));
            assert_eq!(path.last(), Some(&b));
            assert!(path.contains(&a));
        }
        other => panic!("expected a cycle, got {other:?}"),
    }
    assert_eq!(s.task_count().await, 1);
    assert!(s.get_state(&b).is_none());
}

#[tokio::test]
async fn test_acyclic_chain_is_accepted() {
    let s = scheduler();
    let a = s.create_task(TaskSpec::new("a")).await.unwrap();
    let b = s
        .create_task(TaskSpec::new("b").with_dependencies([a.id]))
        .await
        .unwrap();
    let c = s
        .create_task(TaskSpec::new("c").with_dependencies([a.id, b.id]))
        .await
        .unwrap();
    assert_eq!(s.task_count().await, 3);
    assert!(c.dependencies.contains(&a.id));
}

#[tokio::test]
async fn test_duplicate_id_is_rejected() {
    let s = scheduler();
    let id = TaskId::new();
    s.create_task(TaskSpec::new("a").with_id(id)).await.unwrap();
    let err = s
        .create_task(TaskSpec::new("again").with_id(id))
        .await
        .unwrap_err();
    assert!(matches!(err, Error::DuplicateTask(dup) if dup == id));
}

#[tokio::test]
async fn test_same_category_and_assignee_entangle_once() {
    let s = scheduler();
    let mut rx = s.subscribe();
    let (a, b) = ml_pair();
    let a = s.create_task(a).await.unwrap();
    let b = s.create_task(b).await.unwrap();

    let edges = s.entanglements_of(&a.id).await;
    assert_eq!(edges.len(), 1);
    let edge = &edges[0];
    assert_eq!(edge.partner_of(&a.id), Some(b.id));
    assert!((edge.correlation - 0.8).abs() < 1e-12);
    assert_eq!(edge.kind, EntanglementKind::Weak);

    assert!(s.get_state(&a.id).unwrap().entangled);
    assert!(s.get_state(&b.id).unwrap().entangled);
    assert_eq!(s.get_metrics().await.entanglement_count, 1);

    let created = drain_events(&mut rx)
        .into_iter()
        .filter(|e| matches!(e, SchedulerEvent::EntanglementCreated(_)))
        .count();
    assert_eq!(created, 1);
}

#[tokio::test]
async fn test_weak_correlation_does_not_entangle() {
    let s = scheduler();
    let a = s
        .create_task(TaskSpec::new("a").with_category("ml"))
        .await
        .unwrap();
    s.create_task(TaskSpec::new("b").with_category("ml").with_assignee("w2"))
        .await
        .unwrap();
    assert!(s.entanglements_of(&a.id).await.is_empty());
}

#[tokio::test]
async fn test_dependency_and_shared_resources_saturate_correlation() {
    let s = scheduler();
    let resources = ResourceEstimate::new(2.0, 4.0, 0.0);
    let a = s
        .create_task(
            TaskSpec::new("a")
                .with_category("etl")
                .with_assignee("w3")
                .with_resources(resources),
        )
        .await
        .unwrap();
    let b = s
        .create_task(
            TaskSpec::new("b")
                .with_category("etl")
                .with_assignee("w3")
                .with_resources(resources)
                .with_dependencies([a.id]),
        )
        .await
        .unwrap();

    let edges = s.entanglements_of(&b.id).await;
    assert_eq!(edges.len(), 1);
    assert_eq!(edges[0].correlation, 1.0);
    assert_eq!(edges[0].kind, EntanglementKind::Strong);
}

#[tokio::test]
async fn test_lower_threshold_links_more_tasks() {
    let s = scheduler_with(qsched::SchedulerConfig {
        entanglement_threshold: 0.4,
        ..seeded_config()
    });
    let a = s
        .create_task(TaskSpec::new("a").with_category("web"))
        .await
        .unwrap();
    for i in 0..3 {
        s.create_task(TaskSpec::new(format!("b{i}")).with_category("web"))
            .await
            .unwrap();
    }
    assert_eq!(s.entanglements_of(&a.id).await.len(), 3);
}

#[tokio::test]
async fn test_thousand_tasks_with_random_categories() {
    use rand::rngs::StdRng;
    use rand::{Rng, SeedableRng};

    let s = scheduler();
    let mut rng = StdRng::seed_from_u64(99);
    let categories = ["ml", "etl", "web", "infra", "batch"];
    for i in 0..1000 {
        let category = categories[rng.gen_range(0..categories.len())];
        s.create_task(TaskSpec::new(format!("t{i}")).with_category(category))
            .await
            .unwrap();
    }
    let metrics = s.get_metrics().await;
    assert_eq!(metrics.task_count, 1000);
    assert_eq!(metrics.state_count, 1000);
}
