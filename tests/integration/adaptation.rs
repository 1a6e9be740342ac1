//! Telemetry snapshots, adaptation and configuration prediction.

use chrono::{Duration, Utc};

use qsched::adaptive::{AdaptationRule, Metric, Parameter, RecordOutcome};
use qsched::orchestration::Severity;
use qsched::{
    Error, ExecutionRecord, ResourceUsage, SchedulerConfig, SchedulerEvent, TaskId,
    WorkloadCharacteristics,
};

use crate::fixtures::{drain_events, scheduler, scheduler_with, seeded_config};

#[tokio::test]
async fn test_snapshot_aggregates_recent_records() {
    let s = scheduler();
    let base = Utc::now();
    let runs = [(1000.0, true), (1500.0, true), (2000.0, false), (800.0, true)];
    for (i, (ms, ok)) in runs.into_iter().enumerate() {
        let record = ExecutionRecord::new(TaskId::new(), ms, ok)
            .at(base + Duration::milliseconds(200 * i as i64));
        s.record_execution(record).await.unwrap();
    }

    let metrics = s.get_metrics().await;
    assert_eq!(metrics.telemetry_records, 4);
    let snapshot = metrics.latest_snapshot.unwrap();
    assert_eq!(snapshot.sample_count, 4);
    assert!((snapshot.latency_ms - 1325.0).abs() < 1e-9);
    assert!((snapshot.success_rate - 0.75).abs() < 1e-9);
    assert!(snapshot.prediction_accuracy.is_none());
}

#[tokio::test]
async fn test_duplicate_record_is_dropped() {
    let s = scheduler();
    let id = TaskId::new();
    let at = Utc::now();
    let first = s
        .record_execution(ExecutionRecord::new(id, 500.0, true).at(at))
        .await
        .unwrap();
    let second = s
        .record_execution(
            ExecutionRecord::new(id, 500.0, true).at(at + Duration::milliseconds(50)),
        )
        .await
        .unwrap();

    assert!(matches!(first, RecordOutcome::Appended { .. }));
    assert_eq!(second, RecordOutcome::Duplicate);
    assert_eq!(s.get_metrics().await.telemetry_records, 1);
}

#[tokio::test]
async fn test_invalid_record_is_rejected() {
    let s = scheduler();
    let err = s
        .record_execution(ExecutionRecord::new(TaskId::new(), -1.0, true))
        .await
        .unwrap_err();
    assert!(matches!(err, Error::Validation(_)));
}

#[tokio::test]
async fn test_single_snapshot_adapts_nothing() {
    let s = scheduler();
    s.record_execution(ExecutionRecord::new(TaskId::new(), 1000.0, true))
        .await
        .unwrap();
    assert!(s.perform_adaptation().await.is_empty());
    assert_eq!(s.config().await, seeded_config());
}

#[tokio::test]
async fn test_latency_jump_tunes_latency_parameters() {
    let s = scheduler();
    let mut rx = s.subscribe();
    let base = Utc::now();
    s.record_execution(ExecutionRecord::new(TaskId::new(), 1000.0, true).at(base))
        .await
        .unwrap();
    s.record_execution(
        ExecutionRecord::new(TaskId::new(), 5000.0, true).at(base + Duration::milliseconds(200)),
    )
    .await
    .unwrap();

    let changes = s.perform_adaptation().await;
    let mut touched: Vec<Parameter> = changes.iter().map(|c| c.parameter).collect();
    touched.sort_by_key(|p| p.to_string());
    assert_eq!(
        touched,
        vec![
            Parameter::CoherenceTime,
            Parameter::EntanglementThreshold,
            Parameter::MeasurementInterval,
        ]
    );
    assert!(changes.iter().all(|c| c.metric == Some(Metric::Latency)));

    let config = s.config().await;
    assert!((config.entanglement_threshold - 0.84).abs() < 1e-9);
    assert_eq!(config.measurement_interval_ms, 1200);
    assert_eq!(config.coherence_time_ms, 9000);

    let applied = drain_events(&mut rx)
        .into_iter()
        .filter(|e| matches!(e, SchedulerEvent::AdaptationApplied(_)))
        .count();
    assert_eq!(applied, 3);
    assert_eq!(s.get_metrics().await.adaptations_applied, 3);

    // Same snapshot pair: nothing more to do.
    assert!(s.perform_adaptation().await.is_empty());
}

#[tokio::test]
async fn test_adaptation_disabled_by_empty_rules() {
    let s = scheduler_with(SchedulerConfig {
        adaptation_rules: Vec::new(),
        ..seeded_config()
    });
    let base = Utc::now();
    s.record_execution(ExecutionRecord::new(TaskId::new(), 1000.0, true).at(base))
        .await
        .unwrap();
    s.record_execution(
        ExecutionRecord::new(TaskId::new(), 9000.0, false).at(base + Duration::milliseconds(200)),
    )
    .await
    .unwrap();
    assert!(s.perform_adaptation().await.is_empty());
}

#[tokio::test]
async fn test_extreme_rules_stay_within_bounds() {
    let s = scheduler_with(SchedulerConfig {
        adaptation_rules: vec![AdaptationRule::new(
            Metric::Latency,
            0.01,
            &[
                (Parameter::MaxSuperpositionStates, 100.0),
                (Parameter::LearningRate, 100.0),
                (Parameter::EntanglementThreshold, 100.0),
            ],
        )],
        ..seeded_config()
    });

    let base = Utc::now();
    let mut ms = 100.0;
    for i in 0..10 {
        s.record_execution(
            ExecutionRecord::new(TaskId::new(), ms, true)
                .at(base + Duration::milliseconds(200 * i)),
        )
        .await
        .unwrap();
        s.perform_adaptation().await;
        ms *= 2.0;
    }

    let config = s.config().await;
    assert_eq!(config.max_superposition_states, 128);
    assert!((config.learning_rate - 0.1).abs() < 1e-12);
    assert!((config.entanglement_threshold - 0.99).abs() < 1e-12);
    for parameter in Parameter::ALL {
        let (lo, hi) = parameter.bounds();
        let value = parameter.get(&config);
        assert!((lo..=hi).contains(&value), "{parameter} = {value}");
    }
}

#[tokio::test]
async fn test_prediction_with_few_matches_is_uncertain() {
    let s = scheduler();
    let profile = ResourceUsage::new(0.5, 0.5, 0.0);
    let base = Utc::now();
    for i in 0..2 {
        s.record_execution(
            ExecutionRecord::new(TaskId::new(), 1000.0, true)
                .with_resources(profile)
                .at(base + Duration::milliseconds(200 * i)),
        )
        .await
        .unwrap();
    }

    let prediction = s
        .predict_optimal_configuration(&WorkloadCharacteristics {
            resource_profile: profile,
            expected_duration_ms: 1000.0,
        })
        .await;
    assert_eq!(prediction.matches, 2);
    assert!(prediction.confidence < 0.5);
}

#[tokio::test]
async fn test_prediction_follows_best_similar_run() {
    let s = scheduler();
    let profile = ResourceUsage::new(0.4, 0.6, 0.0);
    let base = Utc::now();
    for (i, ms) in [1200.0, 900.0, 1100.0, 1000.0].into_iter().enumerate() {
        s.record_execution(
            ExecutionRecord::new(TaskId::new(), ms, true)
                .with_resources(profile)
                .at(base + Duration::milliseconds(200 * i as i64)),
        )
        .await
        .unwrap();
    }

    let prediction = s
        .predict_optimal_configuration(&WorkloadCharacteristics {
            resource_profile: profile,
            expected_duration_ms: 1000.0,
        })
        .await;
    assert_eq!(prediction.matches, 4);
    assert!(prediction.confidence >= 0.5);
    assert_eq!(prediction.recommended.measurement_interval_ms, 900);
    assert_eq!(prediction.recommended.coherence_time_ms, 3600);
    assert_eq!(prediction.expected_duration_ms, Some(1050.0));
}

#[tokio::test]
async fn test_memory_pressure_warns_and_degrades_once() {
    let s = scheduler_with(SchedulerConfig {
        memory_window: 2,
        ..seeded_config()
    });
    let mut rx = s.subscribe();
    let base = Utc::now();
    let mut outcomes = Vec::new();
    for i in 0..4 {
        outcomes.push(
            s.record_execution(
                ExecutionRecord::new(TaskId::new(), 100.0, true)
                    .at(base + Duration::milliseconds(200 * i)),
            )
            .await
            .unwrap(),
        );
    }
    let pressured = outcomes
        .iter()
        .filter(|o| matches!(o, RecordOutcome::Appended { pressure: true, .. }))
        .count();
    assert_eq!(pressured, 1);
    assert_eq!(s.get_metrics().await.telemetry_records, 2);

    let events = drain_events(&mut rx);
    let warnings: Vec<&String> = events
        .iter()
        .filter_map(|e| match e {
            SchedulerEvent::Error {
                severity: Severity::Warning,
                message,
                ..
            } => Some(message),
            _ => None,
        })
        .collect();
    assert_eq!(warnings.len(), 1);
    assert!(warnings[0].contains("Memory pressure"), "{}", warnings[0]);
    assert!(events.iter().any(|e| matches!(
        e,
        SchedulerEvent::AdaptationApplied(change)
            if change.parameter == Parameter::MaxSuperpositionStates
    )));
    assert_eq!(s.config().await.max_superposition_states, 29);
}
