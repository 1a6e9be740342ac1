//! Orchestration layer: the scheduler facade, its periodic cycles and the
//! events it emits.
//!
//! `measurement` and `coherence` hold the cycle logic; the actors in
//! `crate::actors` only decide when to run it.

pub mod coherence;
pub mod context;
pub mod events;
pub mod measurement;
mod scheduler;

pub use coherence::CoherenceReport;
pub use events::{ErrorSink, LogErrorSink, SchedulerEvent, Severity};
pub use measurement::MeasurementOutcome;
pub use scheduler::{Scheduler, SystemMetrics};
