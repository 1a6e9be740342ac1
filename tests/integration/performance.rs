//! Performance tests for qsched.
//!
//! Thresholds are loose enough for unoptimized builds; they catch
//! accidental quadratic behavior rather than measure tuning.
//!
//! Use `cargo test --test integration performance -- --nocapture` to see metrics.

use std::time::Instant;

use qsched::{SchedulerConfig, TaskId, TaskSpec};

use crate::fixtures::{fast_decay_config, let_coherence_decay, scheduler, scheduler_with};

/// Performance thresholds
const MAX_BULK_CREATE_MS: u128 = 10_000;
const MAX_MEASUREMENT_CYCLE_MS: u128 = 5_000;
const MAX_PLAN_MS: u128 = 2_000;

const CATEGORIES: [&str; 5] = ["ml", "etl", "web", "infra", "batch"];

#[tokio::test]
async fn test_bulk_create_past_sampling_threshold() {
    const TASKS: usize = 2_000;
    let s = scheduler();

    let start = Instant::now();
    for i in 0..TASKS {
        s.create_task(TaskSpec::new(format!("t{i}")).with_category(CATEGORIES[i % 5]))
            .await
            .unwrap();
    }
    let elapsed = start.elapsed().as_millis();

    println!(
        "Bulk create ({} tasks): {}ms (threshold: {}ms)",
        TASKS, elapsed, MAX_BULK_CREATE_MS
    );
    assert_eq!(s.task_count().await, TASKS);
    assert!(
        elapsed < MAX_BULK_CREATE_MS,
        "bulk create took {}ms, exceeds {}ms threshold",
        elapsed,
        MAX_BULK_CREATE_MS
    );
}

#[tokio::test]
async fn test_measurement_cycle_over_many_states() {
    const TASKS: usize = 500;
    let s = scheduler_with(SchedulerConfig {
        max_superposition_states: 16,
        ..fast_decay_config()
    });
    for i in 0..TASKS {
        s.create_task(TaskSpec::new(format!("t{i}"))).await.unwrap();
    }
    let_coherence_decay().await;

    let start = Instant::now();
    let report = s.measure_now().await;
    let elapsed = start.elapsed().as_millis();

    println!(
        "Measurement cycle ({} states, {} measured): {}ms (threshold: {}ms)",
        TASKS, report.measured, elapsed, MAX_MEASUREMENT_CYCLE_MS
    );
    assert_eq!(report.measured, TASKS);
    assert!(
        elapsed < MAX_MEASUREMENT_CYCLE_MS,
        "measurement cycle took {}ms, exceeds {}ms threshold",
        elapsed,
        MAX_MEASUREMENT_CYCLE_MS
    );
}

#[tokio::test]
async fn test_plan_for_long_chains() {
    const TASKS: usize = 1_000;
    let s = scheduler();
    let mut previous: Option<TaskId> = None;
    for i in 0..TASKS {
        let mut spec = TaskSpec::new(format!("step-{i}")).with_estimated_duration(10);
        if i % 4 != 0 {
            if let Some(prev) = previous {
                spec = spec.with_dependencies([prev]);
            }
        }
        previous = Some(s.create_task(spec).await.unwrap().id);
    }

    let start = Instant::now();
    let plan = s.get_optimal_execution_plan().await;
    let elapsed = start.elapsed().as_millis();

    println!(
        "Execution plan ({} tasks, {} batches): {}ms (threshold: {}ms)",
        TASKS,
        plan.batches.len(),
        elapsed,
        MAX_PLAN_MS
    );
    assert_eq!(plan.task_count(), TASKS);
    assert!(
        elapsed < MAX_PLAN_MS,
        "plan took {}ms, exceeds {}ms threshold",
        elapsed,
        MAX_PLAN_MS
    );
}
