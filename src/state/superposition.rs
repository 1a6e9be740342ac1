//! Weighted candidate-outcome state for a task and its generator.
//!
//! A `ProbabilisticState` holds an ordered list of candidates. After every
//! normalization each candidate's probability equals its amplitude squared
//! and the probabilities sum to one.

use crate::core::task::{Task, TaskId};
use crate::error::{Error, Result};
use chrono::{DateTime, Utc};
use rand::Rng;
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;
use std::f64::consts::TAU;
use uuid::Uuid;

/// Allowed deviation of the probability sum from 1.0.
pub const PROBABILITY_TOLERANCE: f64 = 1e-3;
/// Hard ceiling on candidates per state.
pub const MAX_CANDIDATES: usize = 128;
/// Coherence of a freshly generated state.
pub const INITIAL_COHERENCE: f64 = 1.0;
/// Coherence after regeneration. Below 1.0 so decay stays observable.
pub const REGENERATED_COHERENCE: f64 = 0.8;
/// Fraction of a propagation boost that is taken off the partner's coherence.
pub const PROPAGATION_COHERENCE_COST: f64 = 0.1;

/// Execution templates indexed by candidate ordinal: `(label, path)`.
const TEMPLATES: [(&str, &[&str]); 6] = [
    ("planning", &["analyze", "decompose", "schedule"]),
    ("executing", &["prepare", "execute", "verify"]),
    ("optimizing", &["profile", "optimize", "execute"]),
    ("executing", &["partition", "execute_parallel", "merge"]),
    ("planning", &["estimate", "allocate", "execute"]),
    ("optimizing", &["cache_lookup", "execute", "cache_store"]),
];

const DEFAULT_DURATION_MS: f64 = 1000.0;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StateCandidate {
    pub id: Uuid,
    pub label: String,
    pub amplitude: f64,
    pub phase: f64,
    pub probability: f64,
    pub execution_path: Vec<String>,
    pub resource_requirement: f64,
    /// Estimated completion time in milliseconds.
    pub estimated_completion: f64,
}

/// One sampling outcome, kept in the state's bounded history.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MeasurementRecord {
    pub candidate_id: Uuid,
    pub label: String,
    pub probability: f64,
    pub timestamp: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProbabilisticState {
    pub task_id: TaskId,
    pub candidates: Vec<StateCandidate>,
    /// Confidence in `[0, 1]`.
    pub coherence: f64,
    pub last_measurement: DateTime<Utc>,
    pub collapse_history: VecDeque<MeasurementRecord>,
    pub entangled: bool,
    pub measurement_count: u64,
    pub regenerations: u32,
}

impl ProbabilisticState {
    pub fn probability_sum(&self) -> f64 {
        self.candidates.iter().map(|c| c.probability).sum()
    }

    /// Rescale amplitudes to unit norm and derive probabilities from them.
    pub fn normalize(&mut self) -> Result<()> {
        let norm: f64 = self.candidates.iter().map(|c| c.amplitude * c.amplitude).sum();
        if !norm.is_finite() || norm <= 0.0 {
            return Err(Error::StateCorruption {
                task: self.task_id,
                reason: format!("amplitude norm is {}", norm),
            });
        }
        let scale = norm.sqrt();
        for c in &mut self.candidates {
            c.amplitude /= scale;
            c.probability = c.amplitude * c.amplitude;
        }
        Ok(())
    }

    /// Check the invariants measurement relies on.
    pub fn check_integrity(&self) -> Result<()> {
        if self.candidates.is_empty() {
            return Err(Error::StateCorruption {
                task: self.task_id,
                reason: "no candidates".into(),
            });
        }
        if self.candidates.iter().any(|c| !c.probability.is_finite() || c.probability < 0.0) {
            return Err(Error::StateCorruption {
                task: self.task_id,
                reason: "non-finite or negative probability".into(),
            });
        }
        let sum = self.probability_sum();
        if (sum - 1.0).abs() > PROBABILITY_TOLERANCE {
            return Err(Error::StateCorruption {
                task: self.task_id,
                reason: format!("probabilities sum to {:.6}", sum),
            });
        }
        Ok(())
    }

    /// Roulette selection: first candidate whose cumulative probability
    /// reaches `r`. Rounding slack falls to the last candidate.
    pub fn select(&self, r: f64) -> Option<usize> {
        let mut cumulative = 0.0;
        for (i, c) in self.candidates.iter().enumerate() {
            cumulative += c.probability;
            if r <= cumulative {
                return Some(i);
            }
        }
        self.candidates.len().checked_sub(1)
    }

    /// Sample one candidate and record it.
    ///
    /// Coherence is re-drawn from `[0.5, 1.0)` rather than restored.
    pub fn collapse<R: Rng + ?Sized>(
        &mut self,
        rng: &mut R,
        history_limit: usize,
    ) -> Result<MeasurementRecord> {
        self.check_integrity()?;

        let r: f64 = rng.gen();
        let index = self.select(r).ok_or_else(|| Error::Measurement {
            task: self.task_id,
            reason: "roulette selection found no candidate".into(),
        })?;
        let chosen = &self.candidates[index];
        let now = Utc::now();
        let record = MeasurementRecord {
            candidate_id: chosen.id,
            label: chosen.label.clone(),
            probability: chosen.probability,
            timestamp: now,
        };

        self.collapse_history.push_back(record.clone());
        while self.collapse_history.len() > history_limit.max(1) {
            self.collapse_history.pop_front();
        }
        self.last_measurement = now;
        self.coherence = rng.gen_range(0.5..1.0);
        self.measurement_count += 1;

        Ok(record)
    }

    /// Boost the first candidate carrying `label` by `effect`, renormalize,
    /// and pay a fraction of the effect in coherence.
    ///
    /// Returns false when no candidate matches.
    pub fn boost(&mut self, label: &str, effect: f64) -> Result<bool> {
        let Some(candidate) = self.candidates.iter_mut().find(|c| c.label == label) else {
            return Ok(false);
        };
        candidate.amplitude += effect;
        self.normalize()?;
        self.coherence = (self.coherence - effect * PROPAGATION_COHERENCE_COST).max(0.0);
        Ok(true)
    }

    /// Milliseconds since the last measurement.
    pub fn idle_ms(&self, now: DateTime<Utc>) -> f64 {
        (now - self.last_measurement).num_milliseconds().max(0) as f64
    }

    /// `exp(-idle / coherence_time)`.
    pub fn decay_factor(&self, now: DateTime<Utc>, coherence_time_ms: f64) -> f64 {
        (-self.idle_ms(now) / coherence_time_ms.max(1.0)).exp()
    }

    /// Coherence projected to `now` with exponential decay.
    pub fn effective_coherence(&self, now: DateTime<Utc>, coherence_time_ms: f64) -> f64 {
        self.coherence * self.decay_factor(now, coherence_time_ms)
    }
}

/// Builds candidate distributions for tasks.
#[derive(Debug, Clone, Copy, Default)]
pub struct SuperpositionGenerator;

impl SuperpositionGenerator {
    /// Generate a fresh state with `max_states` candidates (bounded to
    /// `[1, 128]`) and full coherence.
    ///
    /// # Errors
    /// `Configuration` when `max_states` is zero; `StateCorruption` if the
    /// drawn amplitudes cannot be normalized.
    pub fn generate<R: Rng + ?Sized>(
        &self,
        task: &Task,
        max_states: usize,
        rng: &mut R,
    ) -> Result<ProbabilisticState> {
        let candidates = self.candidates(task, max_states, rng)?;
        let mut state = ProbabilisticState {
            task_id: task.id,
            candidates,
            coherence: INITIAL_COHERENCE,
            last_measurement: Utc::now(),
            collapse_history: VecDeque::new(),
            entangled: false,
            measurement_count: 0,
            regenerations: 0,
        };
        state.normalize()?;
        Ok(state)
    }

    /// Replace a state's candidates in place, keeping history and counters.
    /// Coherence resets to `REGENERATED_COHERENCE`.
    pub fn regenerate<R: Rng + ?Sized>(
        &self,
        state: &mut ProbabilisticState,
        task: &Task,
        max_states: usize,
        rng: &mut R,
    ) -> Result<()> {
        let mut candidates = self.candidates(task, max_states, rng)?;
        std::mem::swap(&mut state.candidates, &mut candidates);
        if let Err(e) = state.normalize() {
            state.candidates = candidates;
            return Err(e);
        }
        state.coherence = REGENERATED_COHERENCE;
        state.last_measurement = Utc::now();
        state.regenerations += 1;
        Ok(())
    }

    fn candidates<R: Rng + ?Sized>(
        &self,
        task: &Task,
        max_states: usize,
        rng: &mut R,
    ) -> Result<Vec<StateCandidate>> {
        if max_states == 0 {
            return Err(Error::Configuration(
                "max_superposition_states must be at least 1".into(),
            ));
        }
        let count = max_states.min(MAX_CANDIDATES);
        // Priority -10..=10 maps to a 1/11..=21/11 weight.
        let priority_factor = (task.priority as f64 + 11.0) / 11.0;
        let base_duration = task
            .estimated_duration_ms
            .map(|d| d as f64)
            .unwrap_or(DEFAULT_DURATION_MS);

        Ok((0..count)
            .map(|ordinal| {
                let (label, path) = TEMPLATES[ordinal % TEMPLATES.len()];
                let amplitude: f64 = rng.gen_range(0.1..1.0);
                let phase: f64 = rng.gen_range(0.0..TAU);
                StateCandidate {
                    id: Uuid::new_v4(),
                    label: label.to_string(),
                    amplitude,
                    phase,
                    probability: 0.0,
                    execution_path: path.iter().map(|s| s.to_string()).collect(),
                    resource_requirement: amplitude * priority_factor * task.complexity,
                    estimated_completion: base_duration
                        * (path.len() as f64 / 3.0)
                        * (1.5 - 0.5 * amplitude),
                }
            })
            .collect())
    }
}
