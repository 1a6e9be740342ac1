//! Task data model for the scheduler registry.
//!
//! A task is the canonical record a caller registers. Its probabilistic
//! state lives in the state store; the registry only holds the facts the
//! caller supplied plus the status the measurement cycle last collapsed to.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use uuid::Uuid;

/// Lowest accepted priority; lower values are clamped.
pub const PRIORITY_MIN: i32 = -10;
/// Highest accepted priority; higher values are clamped.
pub const PRIORITY_MAX: i32 = 10;

/// Unique identifier for a task.
///
/// Uses UUID v4 for generation and provides a short form display
/// for human-readable output.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TaskId(pub Uuid);

impl TaskId {
    /// Create a new unique task identifier.
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    /// Return first 8 characters of the UUID for display.
    pub fn short(&self) -> String {
        self.0.to_string()[..8].to_string()
    }
}

impl Default for TaskId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for TaskId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl std::str::FromStr for TaskId {
    type Err = uuid::Error;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        Ok(Self(Uuid::parse_str(s)?))
    }
}

/// Task status in its lifecycle.
///
/// A task starts in `Superposition`; measurement collapses it into one of
/// the working states; the outcome report finishes it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskStatus {
    /// Not yet measured.
    #[default]
    Superposition,
    Planning,
    Executing,
    Optimizing,
    Completed,
    Failed,
}

impl TaskStatus {
    /// Map a collapsed candidate label to a status.
    ///
    /// Unknown labels map to `Executing`. Measurement never produces a
    /// terminal status; only the outcome report does.
    pub fn from_label(label: &str) -> Self {
        match label {
            "planning" => TaskStatus::Planning,
            "optimizing" => TaskStatus::Optimizing,
            _ => TaskStatus::Executing,
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, TaskStatus::Completed | TaskStatus::Failed)
    }
}

impl std::fmt::Display for TaskStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            TaskStatus::Superposition => "superposition",
            TaskStatus::Planning => "planning",
            TaskStatus::Executing => "executing",
            TaskStatus::Optimizing => "optimizing",
            TaskStatus::Completed => "completed",
            TaskStatus::Failed => "failed",
        };
        write!(f, "{}", s)
    }
}

/// Resource estimate along fixed dimensions. Zero means "not used".
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ResourceEstimate {
    pub cpu: f64,
    pub memory: f64,
    pub gpu: f64,
    pub storage: f64,
    pub network: f64,
}

impl ResourceEstimate {
    pub fn new(cpu: f64, memory: f64, gpu: f64) -> Self {
        Self {
            cpu,
            memory,
            gpu,
            ..Default::default()
        }
    }

    fn dimensions(&self) -> [f64; 5] {
        [self.cpu, self.memory, self.gpu, self.storage, self.network]
    }

    /// Sum across all dimensions, used to scale candidate requirements.
    pub fn total(&self) -> f64 {
        self.dimensions().iter().sum()
    }

    /// Mean of min/max over dimensions where both estimates are nonzero.
    ///
    /// Returns 0.0 when no dimension is shared.
    pub fn overlap(&self, other: &ResourceEstimate) -> f64 {
        let ratios: Vec<f64> = self
            .dimensions()
            .iter()
            .zip(other.dimensions().iter())
            .filter(|(a, b)| **a > 0.0 && **b > 0.0)
            .map(|(a, b)| a.min(*b) / a.max(*b))
            .collect();

        if ratios.is_empty() {
            0.0
        } else {
            ratios.iter().sum::<f64>() / ratios.len() as f64
        }
    }
}

/// Caller-supplied description of a task to register.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct TaskSpec {
    /// Explicit id; generated when absent.
    pub id: Option<TaskId>,
    pub name: String,
    pub description: String,
    pub priority: i32,
    pub dependencies: Vec<TaskId>,
    pub category: Option<String>,
    pub assignee: Option<String>,
    pub resources: ResourceEstimate,
    /// Relative difficulty, scales candidate resource requirements.
    pub complexity: Option<f64>,
    pub estimated_duration_ms: Option<u64>,
}

impl TaskSpec {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Default::default()
        }
    }

    pub fn with_id(mut self, id: TaskId) -> Self {
        self.id = Some(id);
        self
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }

    pub fn with_priority(mut self, priority: i32) -> Self {
        self.priority = priority;
        self
    }

    pub fn with_dependencies(mut self, deps: impl IntoIterator<Item = TaskId>) -> Self {
        self.dependencies = deps.into_iter().collect();
        self
    }

    pub fn with_category(mut self, category: impl Into<String>) -> Self {
        self.category = Some(category.into());
        self
    }

    pub fn with_assignee(mut self, assignee: impl Into<String>) -> Self {
        self.assignee = Some(assignee.into());
        self
    }

    pub fn with_resources(mut self, resources: ResourceEstimate) -> Self {
        self.resources = resources;
        self
    }

    pub fn with_complexity(mut self, complexity: f64) -> Self {
        self.complexity = Some(complexity);
        self
    }

    pub fn with_estimated_duration(mut self, ms: u64) -> Self {
        self.estimated_duration_ms = Some(ms);
        self
    }
}

/// A registered task.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Task {
    pub id: TaskId,
    pub name: String,
    pub description: String,
    /// Always within `PRIORITY_MIN..=PRIORITY_MAX`.
    pub priority: i32,
    /// Ids this task depends on. May name tasks not registered yet.
    pub dependencies: HashSet<TaskId>,
    pub category: Option<String>,
    pub assignee: Option<String>,
    pub resources: ResourceEstimate,
    pub complexity: f64,
    pub estimated_duration_ms: Option<u64>,
    pub actual_duration_ms: Option<u64>,
    pub status: TaskStatus,
    pub created_at: DateTime<Utc>,
    pub completed_at: Option<DateTime<Utc>>,
}

impl Task {
    /// Build a task from a validated spec. Priority is clamped here.
    pub fn from_spec(spec: TaskSpec) -> Self {
        Self {
            id: spec.id.unwrap_or_default(),
            name: spec.name,
            description: spec.description,
            priority: clamp_priority(spec.priority),
            dependencies: spec.dependencies.into_iter().collect(),
            category: spec.category,
            assignee: spec.assignee,
            resources: spec.resources,
            complexity: spec.complexity.unwrap_or(1.0).max(0.0),
            estimated_duration_ms: spec.estimated_duration_ms,
            actual_duration_ms: None,
            status: TaskStatus::Superposition,
            created_at: Utc::now(),
            completed_at: None,
        }
    }

    /// Record the reported outcome.
    pub fn finish(&mut self, success: bool, actual_duration_ms: u64) {
        self.status = if success {
            TaskStatus::Completed
        } else {
            TaskStatus::Failed
        };
        self.actual_duration_ms = Some(actual_duration_ms);
        self.completed_at = Some(Utc::now());
    }

    pub fn is_finished(&self) -> bool {
        self.status.is_terminal()
    }

    pub fn depends_on(&self, other: &TaskId) -> bool {
        self.dependencies.contains(other)
    }
}

pub fn clamp_priority(priority: i32) -> i32 {
    priority.clamp(PRIORITY_MIN, PRIORITY_MAX)
}
