//! Bounded execution telemetry and the windowed metric snapshots derived
//! from it.

use crate::core::task::TaskId;
use crate::error::{Error, Result};
use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, VecDeque};

/// Repeats of the same task inside this window are dropped.
pub const DEDUPE_WINDOW_MS: i64 = 100;
/// Snapshots retained.
pub const MAX_SNAPSHOTS: usize = 100;

/// Normalized utilization in `[0, 1]` per dimension.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct ResourceUsage {
    pub cpu: f64,
    pub memory: f64,
    pub gpu: f64,
}

impl ResourceUsage {
    pub fn new(cpu: f64, memory: f64, gpu: f64) -> Self {
        Self { cpu, memory, gpu }
    }

    pub fn mean(&self) -> f64 {
        (unit(self.cpu) + unit(self.memory) + unit(self.gpu)) / 3.0
    }

    /// `1 - mean absolute difference`, in `[0, 1]`.
    pub fn similarity(&self, other: &ResourceUsage) -> f64 {
        let diff = (unit(self.cpu) - unit(other.cpu)).abs()
            + (unit(self.memory) - unit(other.memory)).abs()
            + (unit(self.gpu) - unit(other.gpu)).abs();
        1.0 - diff / 3.0
    }
}

fn unit(v: f64) -> f64 {
    if v.is_finite() {
        v.clamp(0.0, 1.0)
    } else {
        0.0
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExecutionRecord {
    pub task_id: TaskId,
    pub timestamp: DateTime<Utc>,
    pub duration_ms: f64,
    pub success: bool,
    pub resource_usage: ResourceUsage,
    pub predicted_duration_ms: Option<f64>,
    /// Scheduler optimization level the run used, when known.
    pub optimization_level: Option<f64>,
}

impl ExecutionRecord {
    pub fn new(task_id: TaskId, duration_ms: f64, success: bool) -> Self {
        Self {
            task_id,
            timestamp: Utc::now(),
            duration_ms,
            success,
            resource_usage: ResourceUsage::default(),
            predicted_duration_ms: None,
            optimization_level: None,
        }
    }

    pub fn at(mut self, timestamp: DateTime<Utc>) -> Self {
        self.timestamp = timestamp;
        self
    }

    pub fn with_resources(mut self, usage: ResourceUsage) -> Self {
        self.resource_usage = usage;
        self
    }

    pub fn with_prediction(mut self, predicted_ms: f64) -> Self {
        self.predicted_duration_ms = Some(predicted_ms);
        self
    }

    pub fn with_optimization_level(mut self, level: f64) -> Self {
        self.optimization_level = Some(level);
        self
    }

    /// Reject a missing (nil) task id or a negative or non-finite duration.
    pub fn validate(&self) -> Result<()> {
        if self.task_id.0.is_nil() {
            return Err(Error::Validation("execution record has no task id".into()));
        }
        if !self.duration_ms.is_finite() || self.duration_ms < 0.0 {
            return Err(Error::Validation(format!(
                "execution record for {} has invalid duration {}",
                self.task_id, self.duration_ms
            )));
        }
        Ok(())
    }
}

/// Aggregate metrics over one telemetry window.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MetricsSnapshot {
    pub timestamp: DateTime<Utc>,
    pub sample_count: usize,
    /// Records per second.
    pub throughput: f64,
    pub latency_ms: f64,
    pub success_rate: f64,
    pub resource_efficiency: f64,
    /// `None` when no record in the window carried a prediction.
    pub prediction_accuracy: Option<f64>,
    pub composite_score: f64,
}

impl MetricsSnapshot {
    /// `None` for an empty window.
    pub fn compute(records: &[&ExecutionRecord], timestamp: DateTime<Utc>) -> Option<Self> {
        let n = records.len();
        if n == 0 {
            return None;
        }
        let count = n as f64;

        let first = records.iter().map(|r| r.timestamp).min()?;
        let last = records.iter().map(|r| r.timestamp).max()?;
        let span_secs = (last - first).num_milliseconds() as f64 / 1000.0;
        // Sub-second windows would inflate throughput.
        let throughput = count / span_secs.max(1.0);

        let latency_ms = records.iter().map(|r| r.duration_ms).sum::<f64>() / count;
        let success_rate = records.iter().filter(|r| r.success).count() as f64 / count;
        let resource_efficiency =
            (records.iter().map(|r| r.resource_usage.mean()).sum::<f64>() / count).min(1.0);

        let accuracies: Vec<f64> = records
            .iter()
            .filter_map(|r| r.predicted_duration_ms.map(|p| prediction_accuracy(r.duration_ms, p)))
            .collect();
        let prediction_accuracy = if accuracies.is_empty() {
            None
        } else {
            Some(accuracies.iter().sum::<f64>() / accuracies.len() as f64)
        };

        let latency_score = 1000.0 / (1000.0 + latency_ms);
        let composite_score = 0.35 * success_rate
            + 0.2 * latency_score
            + 0.25 * resource_efficiency
            + 0.2 * prediction_accuracy.unwrap_or(success_rate);

        Some(Self {
            timestamp,
            sample_count: n,
            throughput,
            latency_ms,
            success_rate,
            resource_efficiency,
            prediction_accuracy,
            composite_score,
        })
    }
}

/// `1 - relative error`, floored at zero.
fn prediction_accuracy(actual_ms: f64, predicted_ms: f64) -> f64 {
    if actual_ms <= 0.0 {
        return if predicted_ms <= 0.0 { 1.0 } else { 0.0 };
    }
    (1.0 - (actual_ms - predicted_ms).abs() / actual_ms).max(0.0)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RecordOutcome {
    Appended {
        /// An old record was evicted to make room.
        evicted: bool,
        /// First eviction since the log last had spare capacity.
        pressure: bool,
    },
    Duplicate,
}

/// FIFO-bounded execution history plus snapshots keyed by record time.
#[derive(Debug)]
pub struct TelemetryLog {
    records: VecDeque<ExecutionRecord>,
    capacity: usize,
    snapshots: BTreeMap<DateTime<Utc>, MetricsSnapshot>,
    pressure_reported: bool,
}

impl TelemetryLog {
    pub fn new(capacity: usize) -> Self {
        Self {
            records: VecDeque::new(),
            capacity: capacity.max(1),
            snapshots: BTreeMap::new(),
            pressure_reported: false,
        }
    }

    /// Validate, dedupe, append and re-snapshot over `window`.
    pub fn record(&mut self, record: ExecutionRecord, window: Duration) -> Result<RecordOutcome> {
        record.validate()?;

        let dedupe = Duration::milliseconds(DEDUPE_WINDOW_MS);
        let duplicate = self.records.iter().rev().any(|r| {
            r.task_id == record.task_id && (r.timestamp - record.timestamp).abs() < dedupe
        });
        if duplicate {
            return Ok(RecordOutcome::Duplicate);
        }

        let at = record.timestamp;
        self.records.push_back(record);

        let mut evicted = false;
        while self.records.len() > self.capacity {
            self.records.pop_front();
            evicted = true;
        }
        let pressure = evicted && !self.pressure_reported;
        if evicted {
            self.pressure_reported = true;
        } else if self.records.len() < self.capacity {
            self.pressure_reported = false;
        }

        self.snapshot_at(at, window);
        Ok(RecordOutcome::Appended { evicted, pressure })
    }

    fn snapshot_at(&mut self, at: DateTime<Utc>, window: Duration) {
        let start = at.checked_sub_signed(window).unwrap_or(DateTime::<Utc>::MIN_UTC);
        let in_window: Vec<&ExecutionRecord> = self
            .records
            .iter()
            .filter(|r| r.timestamp > start && r.timestamp <= at)
            .collect();
        if let Some(snapshot) = MetricsSnapshot::compute(&in_window, at) {
            self.snapshots.insert(at, snapshot);
        }
        while self.snapshots.len() > MAX_SNAPSHOTS {
            self.snapshots.pop_first();
        }
    }

    /// The two newest snapshots as `(previous, current)`.
    pub fn latest_pair(&self) -> Option<(&MetricsSnapshot, &MetricsSnapshot)> {
        let mut newest = self.snapshots.values().rev();
        let current = newest.next()?;
        let previous = newest.next()?;
        Some((previous, current))
    }

    pub fn latest_snapshot(&self) -> Option<&MetricsSnapshot> {
        self.snapshots.values().next_back()
    }

    pub fn records(&self) -> impl Iterator<Item = &ExecutionRecord> {
        self.records.iter()
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn snapshot_count(&self) -> usize {
        self.snapshots.len()
    }

    pub fn clear(&mut self) {
        self.records.clear();
        self.snapshots.clear();
        self.pressure_reported = false;
    }
}
