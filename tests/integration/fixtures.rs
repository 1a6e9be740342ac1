//! Test fixtures for integration tests.
//!
//! Provides helpers for:
//! - Seeded scheduler configurations
//! - Workload specs that do or do not correlate
//! - Draining the event channel

use std::time::Duration;

use tokio::sync::broadcast;

use qsched::{Scheduler, SchedulerConfig, SchedulerEvent, TaskSpec};

pub const SEED: u64 = 0x5eed;

/// Default configuration with a fixed seed.
pub fn seeded_config() -> SchedulerConfig {
    SchedulerConfig {
        rng_seed: Some(SEED),
        ..Default::default()
    }
}

/// Coherence decays so fast that a short sleep makes every state eligible.
pub fn fast_decay_config() -> SchedulerConfig {
    SchedulerConfig {
        coherence_time_ms: 100,
        measurement_interval_ms: 100,
        batch_pause_ms: 0,
        ..seeded_config()
    }
}

pub fn scheduler() -> Scheduler {
    Scheduler::new(seeded_config()).expect("default config is valid")
}

pub fn scheduler_with(config: SchedulerConfig) -> Scheduler {
    Scheduler::new(config).expect("test config is valid")
}

/// Two specs that correlate at exactly the default threshold.
pub fn ml_pair() -> (TaskSpec, TaskSpec) {
    (
        TaskSpec::new("train").with_category("ml").with_assignee("w1"),
        TaskSpec::new("evaluate").with_category("ml").with_assignee("w1"),
    )
}

/// Sleep long enough for `fast_decay_config` states to fall below 0.7.
pub async fn let_coherence_decay() {
    tokio::time::sleep(Duration::from_millis(60)).await;
}

/// Everything currently buffered on the channel.
pub fn drain_events(rx: &mut broadcast::Receiver<SchedulerEvent>) -> Vec<SchedulerEvent> {
    let mut events = Vec::new();
    while let Ok(event) = rx.try_recv() {
        events.push(event);
    }
    events
}
