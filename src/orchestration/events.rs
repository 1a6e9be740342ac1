//! Scheduler notifications and the error sink collaborator.

use crate::adaptive::optimizer::AppliedChange;
use crate::core::correlation::Entanglement;
use crate::core::task::TaskId;
use crate::error::Error;
use crate::{qlog_error, qlog_warn};
use serde::{Deserialize, Serialize};

/// Capacity of the broadcast channel. Slow subscribers observe `Lagged`.
pub const EVENT_CHANNEL_CAPACITY: usize = 1024;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Severity {
    Warning,
    Critical,
}

/// Events emitted by the scheduler, delivered over a tokio broadcast channel.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum SchedulerEvent {
    TaskCreated {
        task_id: TaskId,
        name: String,
    },
    EntanglementCreated(Entanglement),
    MeasurementCompleted {
        task_id: TaskId,
        label: String,
        probability: f64,
        coherence: f64,
    },
    TaskCompleted {
        task_id: TaskId,
        success: bool,
    },
    AdaptationApplied(AppliedChange),
    /// A measurement cycle ran past the slow-cycle threshold.
    SlowCycle {
        duration_ms: f64,
        measured: usize,
    },
    Error {
        severity: Severity,
        task_id: Option<TaskId>,
        message: String,
    },
}

/// Receives failures that are isolated inside a periodic cycle and never
/// surfaced to a caller.
pub trait ErrorSink: Send + Sync {
    fn report(&self, context: &str, task: Option<TaskId>, error: &Error);
}

/// Default sink: writes to the scheduler log.
#[derive(Debug, Clone, Copy, Default)]
pub struct LogErrorSink;

impl ErrorSink for LogErrorSink {
    fn report(&self, context: &str, task: Option<TaskId>, error: &Error) {
        let task = task.map(|t| t.short()).unwrap_or_else(|| "-".into());
        if error.is_recoverable() {
            qlog_warn!("[{}] task={} {}", context, task, error);
        } else {
            qlog_error!("[{}] task={} {}", context, task, error);
        }
    }
}
