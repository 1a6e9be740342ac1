//! Execution telemetry and the adaptive optimizer that tunes scheduler
//! parameters from it.

pub mod optimizer;
pub mod rules;
pub mod telemetry;

pub use optimizer::{
    AdaptationCandidate, AdaptiveOptimizer, AppliedChange, ConfigurationPrediction, CycleReport,
    RecommendedParameters, WorkloadCharacteristics,
};
pub use rules::{default_rules, AdaptationRule, Metric, Parameter, ParameterAdjustment};
pub use telemetry::{ExecutionRecord, MetricsSnapshot, RecordOutcome, ResourceUsage, TelemetryLog};
