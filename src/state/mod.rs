//! Per-task probabilistic state and its sharded storage.

pub mod store;
pub mod superposition;

pub use store::StateStore;
pub use superposition::{
    MeasurementRecord, ProbabilisticState, StateCandidate, SuperpositionGenerator,
    REGENERATED_COHERENCE,
};
