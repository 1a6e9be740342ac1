//! Closed-loop tuning of scheduler parameters from telemetry trends.

use crate::adaptive::rules::{Metric, Parameter};
use crate::adaptive::telemetry::{
    ExecutionRecord, MetricsSnapshot, RecordOutcome, ResourceUsage, TelemetryLog,
};
use crate::config::SchedulerConfig;
use crate::error::Result;
use crate::{qlog_debug, qlog_warn};
use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;

/// Most adaptations applied per cycle.
pub const MAX_ADAPTATIONS: usize = 3;
/// History size at which confidence stops being discounted.
pub const FULL_CONFIDENCE_HISTORY: f64 = 100.0;
/// Minimum similarity for a record to inform a prediction.
pub const SIMILARITY_THRESHOLD: f64 = 0.7;
/// Factor applied to `max_superposition_states` under overload.
pub const OVERLOAD_DEGRADATION: f64 = 0.9;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AdaptationCandidate {
    pub parameter: Parameter,
    pub metric: Metric,
    pub factor: f64,
    pub relative_change: f64,
    pub confidence: f64,
    pub improvement: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AppliedChange {
    pub parameter: Parameter,
    /// `None` when the change came from overload or memory-pressure degradation.
    pub metric: Option<Metric>,
    pub old_value: f64,
    pub new_value: f64,
    pub factor: f64,
    pub confidence: f64,
    pub applied_at: DateTime<Utc>,
}

/// What one measurement cycle cost.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CycleReport {
    pub duration_ms: f64,
    pub measured: usize,
    pub failures: usize,
}

/// What the learning hook concluded about a cycle.
#[derive(Debug, Clone, PartialEq)]
pub struct CycleLearning {
    pub average_cycle_ms: f64,
    pub slow: bool,
    pub degraded: Option<AppliedChange>,
}

/// Shape of an upcoming workload.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct WorkloadCharacteristics {
    pub resource_profile: ResourceUsage,
    pub expected_duration_ms: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RecommendedParameters {
    pub max_superposition_states: usize,
    pub measurement_interval_ms: u64,
    pub coherence_time_ms: u64,
    pub entanglement_threshold: f64,
    pub learning_rate: f64,
}

impl RecommendedParameters {
    fn from_config(config: &SchedulerConfig) -> Self {
        Self {
            max_superposition_states: config.max_superposition_states,
            measurement_interval_ms: config.measurement_interval_ms,
            coherence_time_ms: config.coherence_time_ms,
            entanglement_threshold: config.entanglement_threshold,
            learning_rate: config.learning_rate,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConfigurationPrediction {
    pub recommended: RecommendedParameters,
    pub confidence: f64,
    pub matches: usize,
    pub successful_matches: usize,
    pub expected_duration_ms: Option<f64>,
}

pub struct AdaptiveOptimizer {
    telemetry: TelemetryLog,
    /// Snapshot the last adaptation compared against.
    last_compared: Option<DateTime<Utc>>,
    cycle_average_ms: Option<f64>,
    applied_total: u64,
}

impl AdaptiveOptimizer {
    pub fn new(memory_window: usize) -> Self {
        Self {
            telemetry: TelemetryLog::new(memory_window),
            last_compared: None,
            cycle_average_ms: None,
            applied_total: 0,
        }
    }

    pub fn telemetry(&self) -> &TelemetryLog {
        &self.telemetry
    }

    pub fn applied_total(&self) -> u64 {
        self.applied_total
    }

    pub fn cycle_average_ms(&self) -> Option<f64> {
        self.cycle_average_ms
    }

    pub fn latest_snapshot(&self) -> Option<&MetricsSnapshot> {
        self.telemetry.latest_snapshot()
    }

    pub fn record_execution(
        &mut self,
        record: ExecutionRecord,
        config: &SchedulerConfig,
    ) -> Result<RecordOutcome> {
        let window = Duration::from_std(config.snapshot_window()).unwrap_or(Duration::MAX);
        let task = record.task_id;
        let outcome = self.telemetry.record(record, window)?;
        match outcome {
            RecordOutcome::Duplicate => qlog_debug!("Dropped duplicate execution record for {}", task),
            RecordOutcome::Appended { pressure: true, .. } => qlog_warn!(
                "Telemetry log full ({} records), evicting oldest",
                self.telemetry.capacity()
            ),
            RecordOutcome::Appended { .. } => {}
        }
        Ok(outcome)
    }

    /// Ranked candidates from the two newest snapshots, without applying.
    pub fn candidates(&self, config: &SchedulerConfig) -> Vec<AdaptationCandidate> {
        let Some((previous, current)) = self.telemetry.latest_pair() else {
            return Vec::new();
        };
        let history = (self.telemetry.len() as f64 / FULL_CONFIDENCE_HISTORY).min(1.0);

        let mut seen: HashSet<Parameter> = HashSet::new();
        let mut candidates = Vec::new();
        for rule in &config.adaptation_rules {
            let (Some(prev), Some(cur)) = (rule.metric.value(previous), rule.metric.value(current))
            else {
                continue;
            };
            if prev == 0.0 {
                continue;
            }
            let change = (cur - prev) / prev.abs();
            if change.abs() <= rule.change_threshold {
                continue;
            }
            let improvement = !rule.metric.is_degradation(change);
            if improvement && !config.respond_to_improvements {
                continue;
            }
            let confidence = (change.abs() * 2.0).min(0.9) * history;
            for adj in &rule.adjustments {
                if !seen.insert(adj.parameter) {
                    continue;
                }
                candidates.push(AdaptationCandidate {
                    parameter: adj.parameter,
                    metric: rule.metric,
                    factor: if improvement { 1.0 / adj.factor } else { adj.factor },
                    relative_change: change,
                    confidence,
                    improvement,
                });
            }
        }

        // Stable sort keeps rule order among equal magnitudes.
        candidates.sort_by(|a, b| b.relative_change.abs().total_cmp(&a.relative_change.abs()));
        candidates.truncate(MAX_ADAPTATIONS);
        candidates
    }

    /// Apply the top candidates to `config`. Each snapshot pair is acted on
    /// at most once.
    pub fn perform_adaptation(&mut self, config: &mut SchedulerConfig) -> Vec<AppliedChange> {
        let current = match self.telemetry.latest_pair() {
            Some((_, current)) => current.timestamp,
            None => return Vec::new(),
        };
        if self.last_compared == Some(current) {
            return Vec::new();
        }
        self.last_compared = Some(current);

        let now = Utc::now();
        let applied: Vec<AppliedChange> = self
            .candidates(config)
            .into_iter()
            .map(|c| {
                let old_value = c.parameter.get(config);
                let new_value = c.parameter.set(config, old_value * c.factor);
                qlog_debug!(
                    "Adapted {} {} -> {} ({} changed {:+.1}%, confidence {:.3})",
                    c.parameter,
                    old_value,
                    new_value,
                    c.metric,
                    c.relative_change * 100.0,
                    c.confidence
                );
                AppliedChange {
                    parameter: c.parameter,
                    metric: Some(c.metric),
                    old_value,
                    new_value,
                    factor: c.factor,
                    confidence: c.confidence,
                    applied_at: now,
                }
            })
            .collect();
        self.applied_total += applied.len() as u64;
        applied
    }

    /// Fold a cycle into the moving average; degrade state count when slow.
    pub fn learn_from_cycle(
        &mut self,
        report: &CycleReport,
        config: &mut SchedulerConfig,
    ) -> CycleLearning {
        let rate = config.learning_rate;
        let average = match self.cycle_average_ms {
            Some(avg) => avg * (1.0 - rate) + report.duration_ms * rate,
            None => report.duration_ms,
        };
        self.cycle_average_ms = Some(average);

        let slow = report.duration_ms > config.slow_cycle_threshold_ms as f64;
        let mut degraded = None;
        if slow {
            degraded = degrade_state_count(config);
            if degraded.is_some() {
                self.applied_total += 1;
            }
            qlog_warn!(
                "Slow measurement cycle: {:.0}ms for {} states ({} failures)",
                report.duration_ms,
                report.measured,
                report.failures
            );
        }
        CycleLearning {
            average_cycle_ms: average,
            slow,
            degraded,
        }
    }

    /// Recommend parameters from past runs that resemble `characteristics`.
    pub fn predict_optimal_configuration(
        &self,
        characteristics: &WorkloadCharacteristics,
        config: &SchedulerConfig,
    ) -> ConfigurationPrediction {
        let matches: Vec<&ExecutionRecord> = self
            .telemetry
            .records()
            .filter(|r| similarity(r, characteristics) >= SIMILARITY_THRESHOLD)
            .collect();
        let successful: Vec<&ExecutionRecord> =
            matches.iter().copied().filter(|r| r.success).collect();

        let mut recommended = RecommendedParameters::from_config(config);
        let best = successful.iter().max_by(|a, b| score(a).total_cmp(&score(b)));
        if let Some(best) = best {
            let level = best.optimization_level.unwrap_or(1.0);
            recommended.max_superposition_states = Parameter::MaxSuperpositionStates
                .clamp(config.max_superposition_states as f64 * level)
                as usize;
            recommended.measurement_interval_ms =
                Parameter::MeasurementInterval.clamp(best.duration_ms) as u64;
            recommended.coherence_time_ms =
                Parameter::CoherenceTime.clamp(best.duration_ms * 4.0) as u64;
        }

        let expected_duration_ms = if successful.is_empty() {
            None
        } else {
            Some(successful.iter().map(|r| r.duration_ms).sum::<f64>() / successful.len() as f64)
        };

        ConfigurationPrediction {
            recommended,
            confidence: prediction_confidence(matches.len()),
            matches: matches.len(),
            successful_matches: successful.len(),
            expected_duration_ms,
        }
    }

    pub fn clear(&mut self) {
        self.telemetry.clear();
        self.last_compared = None;
        self.cycle_average_ms = None;
    }
}

/// Shrink `max_superposition_states` by the overload factor. Returns `None`
/// when the bounded result would not be lower.
pub fn degrade_state_count(config: &mut SchedulerConfig) -> Option<AppliedChange> {
    let parameter = Parameter::MaxSuperpositionStates;
    let old_value = parameter.get(config);
    let target = parameter.clamp(old_value * OVERLOAD_DEGRADATION);
    if target >= old_value {
        return None;
    }
    let new_value = parameter.set(config, target);
    Some(AppliedChange {
        parameter,
        metric: None,
        old_value,
        new_value,
        factor: OVERLOAD_DEGRADATION,
        confidence: 1.0,
        applied_at: Utc::now(),
    })
}

fn similarity(record: &ExecutionRecord, characteristics: &WorkloadCharacteristics) -> f64 {
    let resource = record.resource_usage.similarity(&characteristics.resource_profile);
    let (a, b) = (record.duration_ms, characteristics.expected_duration_ms.max(0.0));
    let duration = match (a > 0.0, b > 0.0) {
        (true, true) => a.min(b) / a.max(b),
        (false, false) => 1.0,
        _ => 0.0,
    };
    0.6 * resource + 0.4 * duration
}

fn score(record: &ExecutionRecord) -> f64 {
    record.optimization_level.unwrap_or(1.0) / record.duration_ms.max(1.0)
}

/// Below 0.5 with fewer than three matches; approaches 0.95 with more.
fn prediction_confidence(matches: usize) -> f64 {
    if matches < 3 {
        0.15 * matches as f64
    } else {
        (0.5 + 0.05 * (matches - 3) as f64).min(0.95)
    }
}

impl std::fmt::Debug for AdaptiveOptimizer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AdaptiveOptimizer")
            .field("records", &self.telemetry.len())
            .field("snapshots", &self.telemetry.snapshot_count())
            .field("applied_total", &self.applied_total)
            .finish()
    }
}
