use thiserror::Error;

use crate::core::task::TaskId;

#[derive(Error, Debug)]
pub enum Error {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("TOML parse error: {0}")]
    TomlParse(#[from] toml::de::Error),

    #[error("TOML serialize error: {0}")]
    TomlSerialize(#[from] toml::ser::Error),

    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Circular dependency: task {} would close the cycle {}", .task, format_path(.path))]
    CircularDependency { task: TaskId, path: Vec<TaskId> },

    #[error("Task not found: {0}")]
    TaskNotFound(TaskId),

    #[error("Task already exists: {0}")]
    DuplicateTask(TaskId),

    #[error("Measurement failed for task {task}: {reason}")]
    Measurement { task: TaskId, reason: String },

    #[error("State corruption in task {task}: {reason}")]
    StateCorruption { task: TaskId, reason: String },

    #[error("System overload: {tasks} tasks registered (limit {limit})")]
    SystemOverload { tasks: usize, limit: usize },

    #[error("Memory pressure: telemetry log holds {records} records (window {limit})")]
    MemoryPressure { records: usize, limit: usize },

    #[error("Configuration error: {0}")]
    Configuration(String),

    #[error("Operation timed out after {0:?}")]
    Timeout(std::time::Duration),

    #[error("Task join error: {0}")]
    TaskJoin(String),
}

impl Error {
    /// Errors raised inside a periodic cycle that are handled locally by
    /// regenerating the affected state.
    pub fn is_recoverable(&self) -> bool {
        matches!(
            self,
            Error::Measurement { .. } | Error::StateCorruption { .. }
        )
    }
}

fn format_path(path: &[TaskId]) -> String {
    path.iter()
        .map(|id| id.short())
        .collect::<Vec<_>>()
        .join(" -> ")
}

pub type Result<T> = std::result::Result<T, Error>;
