use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::adaptive::rules::{default_rules, AdaptationRule};
use crate::{qlog_debug, Error, Result};

/// Upper bound for the adaptation interval: one day.
pub const MAX_ADAPTATION_INTERVAL_MS: u64 = 86_400_000;
/// Upper bound for completed-task retention: thirty days.
pub const MAX_RETENTION_MS: u64 = 30 * 86_400_000;

/// Live scheduler configuration.
///
/// Validated once at construction; afterwards only the adaptive optimizer
/// mutates it, always within `Parameter::bounds`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SchedulerConfig {
    pub max_superposition_states: usize,
    pub entanglement_threshold: f64,
    pub coherence_time_ms: u64,
    pub measurement_interval_ms: u64,
    pub adaptive_learning: bool,
    pub learning_rate: f64,
    pub adaptation_interval_ms: u64,
    pub memory_window: usize,

    pub rng_seed: Option<u64>,
    pub max_tasks: usize,
    pub completed_retention_ms: u64,
    pub slow_cycle_threshold_ms: u64,
    pub measurement_batch_size: usize,
    pub batch_pause_ms: u64,
    pub shutdown_grace_ms: u64,
    pub large_registry_threshold: usize,
    pub correlation_sample_size: usize,
    pub collapse_history_limit: usize,
    pub respond_to_improvements: bool,
    pub adaptation_rules: Vec<AdaptationRule>,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            max_superposition_states: 32,
            entanglement_threshold: 0.8,
            coherence_time_ms: 10_000,
            measurement_interval_ms: 1_000,
            adaptive_learning: true,
            learning_rate: 0.01,
            adaptation_interval_ms: 5_000,
            memory_window: 1_000,
            rng_seed: None,
            max_tasks: 10_000,
            completed_retention_ms: 60_000,
            slow_cycle_threshold_ms: 5_000,
            measurement_batch_size: 10,
            batch_pause_ms: 5,
            shutdown_grace_ms: 2_000,
            large_registry_threshold: 200,
            correlation_sample_size: 100,
            collapse_history_limit: 32,
            respond_to_improvements: false,
            adaptation_rules: default_rules(),
        }
    }
}

impl SchedulerConfig {
    pub fn qsched_dir() -> Result<PathBuf> {
        Ok(dirs::home_dir()
            .ok_or_else(|| Error::Configuration("no home directory".into()))?
            .join(".qsched"))
    }

    pub fn config_path() -> Result<PathBuf> {
        Ok(Self::qsched_dir()?.join("qsched.toml"))
    }

    /// Reject values outside the documented bounds.
    pub fn validate(&self) -> Result<()> {
        check(
            (1..=128).contains(&self.max_superposition_states),
            format!(
                "max_superposition_states must be in [1, 128], got {}",
                self.max_superposition_states
            ),
        )?;
        check(
            (0.0..=1.0).contains(&self.entanglement_threshold),
            format!(
                "entanglement_threshold must be in [0, 1], got {}",
                self.entanglement_threshold
            ),
        )?;
        check(
            (100..=3_600_000).contains(&self.coherence_time_ms),
            format!(
                "coherence_time_ms must be in [100, 3600000], got {}",
                self.coherence_time_ms
            ),
        )?;
        check(
            (100..=10_000).contains(&self.measurement_interval_ms),
            format!(
                "measurement_interval_ms must be in [100, 10000], got {}",
                self.measurement_interval_ms
            ),
        )?;
        check(
            (0.001..=0.1).contains(&self.learning_rate),
            format!("learning_rate must be in [0.001, 0.1], got {}", self.learning_rate),
        )?;
        check(
            (1..=MAX_ADAPTATION_INTERVAL_MS).contains(&self.adaptation_interval_ms),
            format!(
                "adaptation_interval_ms must be in [1, {}], got {}",
                MAX_ADAPTATION_INTERVAL_MS, self.adaptation_interval_ms
            ),
        )?;
        check(
            self.completed_retention_ms <= MAX_RETENTION_MS,
            format!(
                "completed_retention_ms must be at most {}, got {}",
                MAX_RETENTION_MS, self.completed_retention_ms
            ),
        )?;
        check(self.memory_window > 0, "memory_window must be positive".to_string())?;
        check(self.max_tasks > 0, "max_tasks must be positive".to_string())?;
        check(
            self.measurement_batch_size > 0,
            "measurement_batch_size must be positive".to_string(),
        )?;
        for rule in &self.adaptation_rules {
            rule.validate()?;
        }
        Ok(())
    }

    pub fn measurement_interval(&self) -> Duration {
        Duration::from_millis(self.measurement_interval_ms)
    }

    /// Coherence maintenance runs four times per coherence time.
    pub fn coherence_interval(&self) -> Duration {
        Duration::from_millis((self.coherence_time_ms / 4).max(1))
    }

    pub fn adaptation_interval(&self) -> Duration {
        Duration::from_millis(self.adaptation_interval_ms)
    }

    /// Telemetry window used for snapshots: twice the adaptation interval.
    pub fn snapshot_window(&self) -> Duration {
        Duration::from_millis(self.adaptation_interval_ms.saturating_mul(2))
    }

    /// Load from the default path; a missing file yields defaults.
    pub fn load_default() -> Result<Self> {
        Self::load(&Self::config_path()?)
    }

    /// Load and validate a TOML file; a missing file yields defaults.
    pub fn load(path: &Path) -> Result<Self> {
        qlog_debug!("SchedulerConfig::load path={}", path.display());
        if !path.exists() {
            qlog_debug!("Config file not found, using defaults");
            return Ok(Self::default());
        }
        let config: Self = toml::from_str(&fs::read_to_string(path)?)?;
        config.validate()?;
        qlog_debug!(
            "Config loaded: max_states={}, threshold={}, coherence_time={}ms, interval={}ms",
            config.max_superposition_states,
            config.entanglement_threshold,
            config.coherence_time_ms,
            config.measurement_interval_ms
        );
        Ok(config)
    }

    pub fn save(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            if !parent.exists() {
                fs::create_dir_all(parent)?;
            }
        }
        fs::write(path, toml::to_string_pretty(self)?)?;
        qlog_debug!("Config saved to {}", path.display());
        Ok(())
    }
}

fn check(ok: bool, msg: String) -> Result<()> {
    if ok {
        Ok(())
    } else {
        Err(Error::Configuration(msg))
    }
}
