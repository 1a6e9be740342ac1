//! Core domain models for the scheduler.
//!
//! Tasks and their dependency registry, the correlation graph that links
//! related tasks, and the execution plan derived from dependencies.

pub mod correlation;
pub mod plan;
pub mod registry;
pub mod task;

pub use correlation::{CorrelationGraph, Entanglement, EntanglementId, EntanglementKind};
pub use plan::{ExecutionPlan, PlanBatch};
pub use registry::TaskRegistry;
pub use task::{ResourceEstimate, Task, TaskId, TaskSpec, TaskStatus};
