//! Integration test suite for qsched.
//!
//! These tests drive the public `Scheduler` facade end to end: task
//! creation and correlation, measurement and coherence cycles, telemetry
//! and adaptation, and the actor lifecycle.
//!
//! # Test Categories
//!
//! - `task_creation`: validation, cycle detection, entanglement scenarios
//! - `measurement`: collapse, propagation and coherence maintenance
//! - `adaptation`: telemetry windows, adaptation bounds, prediction
//! - `lifecycle`: actors, events and shutdown
//! - `performance`: bulk creation thresholds
//!
//! Randomness is seeded through `SchedulerConfig::rng_seed`.

mod fixtures;

mod task_creation;
mod measurement;
mod adaptation;
mod lifecycle;
mod performance;
