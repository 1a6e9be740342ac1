//! Adaptation rules: which metric moves which tunable, and by how much.

use crate::adaptive::telemetry::MetricsSnapshot;
use crate::config::SchedulerConfig;
use crate::error::{Error, Result};
use serde::{Deserialize, Serialize};

/// Telemetry metric a rule watches.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Metric {
    Throughput,
    Latency,
    SuccessRate,
    ResourceEfficiency,
    PredictionAccuracy,
}

impl Metric {
    /// Latency degrades upwards; everything else degrades downwards.
    pub fn higher_is_better(&self) -> bool {
        !matches!(self, Metric::Latency)
    }

    /// `None` when the snapshot has no data for this metric.
    pub fn value(&self, snapshot: &MetricsSnapshot) -> Option<f64> {
        match self {
            Metric::Throughput => Some(snapshot.throughput),
            Metric::Latency => Some(snapshot.latency_ms),
            Metric::SuccessRate => Some(snapshot.success_rate),
            Metric::ResourceEfficiency => Some(snapshot.resource_efficiency),
            Metric::PredictionAccuracy => snapshot.prediction_accuracy,
        }
    }

    /// True when a relative change of this sign is a degradation.
    pub fn is_degradation(&self, relative_change: f64) -> bool {
        if self.higher_is_better() {
            relative_change < 0.0
        } else {
            relative_change > 0.0
        }
    }
}

impl std::fmt::Display for Metric {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Metric::Throughput => "throughput",
            Metric::Latency => "latency",
            Metric::SuccessRate => "success_rate",
            Metric::ResourceEfficiency => "resource_efficiency",
            Metric::PredictionAccuracy => "prediction_accuracy",
        };
        write!(f, "{}", s)
    }
}

/// Tunable scheduler parameter.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Parameter {
    MaxSuperpositionStates,
    CoherenceTime,
    EntanglementThreshold,
    LearningRate,
    MeasurementInterval,
}

impl Parameter {
    pub const ALL: [Parameter; 5] = [
        Parameter::MaxSuperpositionStates,
        Parameter::CoherenceTime,
        Parameter::EntanglementThreshold,
        Parameter::LearningRate,
        Parameter::MeasurementInterval,
    ];

    /// Inclusive range adaptation may move the parameter within.
    pub fn bounds(&self) -> (f64, f64) {
        match self {
            Parameter::MaxSuperpositionStates => (4.0, 128.0),
            Parameter::CoherenceTime => (1_000.0, 60_000.0),
            Parameter::EntanglementThreshold => (0.1, 0.99),
            Parameter::LearningRate => (0.001, 0.1),
            Parameter::MeasurementInterval => (100.0, 10_000.0),
        }
    }

    fn is_integral(&self) -> bool {
        matches!(
            self,
            Parameter::MaxSuperpositionStates
                | Parameter::CoherenceTime
                | Parameter::MeasurementInterval
        )
    }

    /// Clamp into bounds, rounding integral parameters.
    pub fn clamp(&self, value: f64) -> f64 {
        let (lo, hi) = self.bounds();
        let v = if value.is_finite() { value } else { hi };
        let v = v.clamp(lo, hi);
        if self.is_integral() {
            v.round()
        } else {
            v
        }
    }

    pub fn get(&self, config: &SchedulerConfig) -> f64 {
        match self {
            Parameter::MaxSuperpositionStates => config.max_superposition_states as f64,
            Parameter::CoherenceTime => config.coherence_time_ms as f64,
            Parameter::EntanglementThreshold => config.entanglement_threshold,
            Parameter::LearningRate => config.learning_rate,
            Parameter::MeasurementInterval => config.measurement_interval_ms as f64,
        }
    }

    /// Store a clamped value and return what was stored.
    pub fn set(&self, config: &mut SchedulerConfig, value: f64) -> f64 {
        let v = self.clamp(value);
        match self {
            Parameter::MaxSuperpositionStates => config.max_superposition_states = v as usize,
            Parameter::CoherenceTime => config.coherence_time_ms = v as u64,
            Parameter::EntanglementThreshold => config.entanglement_threshold = v,
            Parameter::LearningRate => config.learning_rate = v,
            Parameter::MeasurementInterval => config.measurement_interval_ms = v as u64,
        }
        v
    }
}

impl std::fmt::Display for Parameter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Parameter::MaxSuperpositionStates => "max_superposition_states",
            Parameter::CoherenceTime => "coherence_time",
            Parameter::EntanglementThreshold => "entanglement_threshold",
            Parameter::LearningRate => "learning_rate",
            Parameter::MeasurementInterval => "measurement_interval",
        };
        write!(f, "{}", s)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ParameterAdjustment {
    pub parameter: Parameter,
    /// Multiplier applied on degradation; its inverse on improvement.
    pub factor: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AdaptationRule {
    pub metric: Metric,
    /// Minimum relative change that triggers the rule.
    pub change_threshold: f64,
    pub adjustments: Vec<ParameterAdjustment>,
}

impl AdaptationRule {
    pub fn new(metric: Metric, change_threshold: f64, adjustments: &[(Parameter, f64)]) -> Self {
        Self {
            metric,
            change_threshold,
            adjustments: adjustments
                .iter()
                .map(|&(parameter, factor)| ParameterAdjustment { parameter, factor })
                .collect(),
        }
    }

    pub fn validate(&self) -> Result<()> {
        if !self.change_threshold.is_finite() || self.change_threshold <= 0.0 {
            return Err(Error::Configuration(format!(
                "rule for {} has invalid change_threshold {}",
                self.metric, self.change_threshold
            )));
        }
        if let Some(bad) = self
            .adjustments
            .iter()
            .find(|a| !a.factor.is_finite() || a.factor <= 0.0)
        {
            return Err(Error::Configuration(format!(
                "rule for {} has invalid factor {} on {}",
                self.metric, bad.factor, bad.parameter
            )));
        }
        Ok(())
    }
}

/// Built-in rules. Order matters: when two rules name the same parameter
/// the earlier rule wins.
pub fn default_rules() -> Vec<AdaptationRule> {
    use Parameter::*;
    vec![
        AdaptationRule::new(
            Metric::Throughput,
            0.1,
            &[(MaxSuperpositionStates, 0.9), (MeasurementInterval, 1.1)],
        ),
        AdaptationRule::new(
            Metric::Latency,
            0.1,
            &[
                (EntanglementThreshold, 1.05),
                (MeasurementInterval, 1.2),
                (CoherenceTime, 0.9),
            ],
        ),
        AdaptationRule::new(
            Metric::SuccessRate,
            0.05,
            &[(CoherenceTime, 1.1), (LearningRate, 0.9)],
        ),
        AdaptationRule::new(
            Metric::ResourceEfficiency,
            0.1,
            &[(MaxSuperpositionStates, 0.85), (EntanglementThreshold, 1.05)],
        ),
        AdaptationRule::new(
            Metric::PredictionAccuracy,
            0.1,
            &[(LearningRate, 1.2), (MaxSuperpositionStates, 1.1)],
        ),
    ]
}
