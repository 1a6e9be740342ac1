pub mod adaptive;
pub mod config;
pub mod core;
pub mod error;
pub mod log;
pub mod state;

// Periodic background processes and the facade that owns them
pub mod actors;
pub mod orchestration;

pub use adaptive::{AppliedChange, ExecutionRecord, ResourceUsage, WorkloadCharacteristics};
pub use config::SchedulerConfig;
pub use crate::core::{ExecutionPlan, ResourceEstimate, Task, TaskId, TaskSpec, TaskStatus};
pub use error::{Error, Result};
pub use orchestration::{Scheduler, SchedulerEvent, SystemMetrics};
