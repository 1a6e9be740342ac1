//! State shared between the scheduler facade and its periodic actors.
//!
//! Lock order: optimizer -> config, and registry -> graph. Config is
//! otherwise cloned out and released before any other lock is taken.
//! State shards are leaf locks.

use crate::adaptive::optimizer::{AdaptiveOptimizer, AppliedChange};
use crate::config::SchedulerConfig;
use crate::core::correlation::CorrelationGraph;
use crate::core::registry::TaskRegistry;
use crate::core::task::TaskId;
use crate::error::Error;
use crate::orchestration::events::{ErrorSink, SchedulerEvent, Severity};
use crate::state::store::StateStore;
use crate::state::superposition::SuperpositionGenerator;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use tokio::sync::{broadcast, RwLock};

#[derive(Debug, Default)]
pub struct Counters {
    pub measurements: AtomicU64,
    pub measurement_failures: AtomicU64,
    pub regenerations: AtomicU64,
    pub cycles: AtomicU64,
}

impl Counters {
    pub fn bump(counter: &AtomicU64) {
        counter.fetch_add(1, Ordering::Relaxed);
    }

    pub fn read(counter: &AtomicU64) -> u64 {
        counter.load(Ordering::Relaxed)
    }
}

pub struct SchedulerContext {
    pub config: RwLock<SchedulerConfig>,
    pub registry: RwLock<TaskRegistry>,
    pub graph: RwLock<CorrelationGraph>,
    pub states: StateStore,
    pub optimizer: tokio::sync::Mutex<AdaptiveOptimizer>,
    pub generator: SuperpositionGenerator,
    pub counters: Counters,
    events: broadcast::Sender<SchedulerEvent>,
    error_sink: Arc<dyn ErrorSink>,
    rng: Mutex<StdRng>,
    shutting_down: AtomicBool,
}

impl SchedulerContext {
    pub fn new(
        config: SchedulerConfig,
        events: broadcast::Sender<SchedulerEvent>,
        error_sink: Arc<dyn ErrorSink>,
    ) -> Self {
        let rng = match config.rng_seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_entropy(),
        };
        Self {
            optimizer: tokio::sync::Mutex::new(AdaptiveOptimizer::new(config.memory_window)),
            config: RwLock::new(config),
            registry: RwLock::new(TaskRegistry::new()),
            graph: RwLock::new(CorrelationGraph::new()),
            states: StateStore::new(),
            generator: SuperpositionGenerator,
            counters: Counters::default(),
            events,
            error_sink,
            rng: Mutex::new(rng),
            shutting_down: AtomicBool::new(false),
        }
    }

    pub async fn config_snapshot(&self) -> SchedulerConfig {
        self.config.read().await.clone()
    }

    /// Independent generator seeded from the master RNG.
    pub fn fork_rng(&self) -> StdRng {
        let seed: u64 = self
            .rng
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .gen();
        StdRng::seed_from_u64(seed)
    }

    /// Broadcast an event. No subscribers is not an error.
    pub fn emit(&self, event: SchedulerEvent) {
        let _ = self.events.send(event);
    }

    pub fn subscribe(&self) -> broadcast::Receiver<SchedulerEvent> {
        self.events.subscribe()
    }

    /// Hand an isolated failure to the sink; critical ones are also emitted.
    pub fn report(&self, context: &str, task: Option<TaskId>, error: &Error) {
        self.error_sink.report(context, task, error);
        if !error.is_recoverable() {
            self.emit(SchedulerEvent::Error {
                severity: Severity::Critical,
                task_id: task,
                message: error.to_string(),
            });
        }
    }

    pub fn warn(&self, task: Option<TaskId>, error: &Error) {
        self.emit(SchedulerEvent::Error {
            severity: Severity::Warning,
            task_id: task,
            message: error.to_string(),
        });
    }

    pub fn is_shutting_down(&self) -> bool {
        self.shutting_down.load(Ordering::SeqCst)
    }

    /// Returns true for the first caller only.
    pub fn begin_shutdown(&self) -> bool {
        !self.shutting_down.swap(true, Ordering::SeqCst)
    }

    /// Regenerate one task's state in place, counting the attempt.
    pub async fn regenerate(&self, id: &TaskId, max_states: usize) -> crate::Result<()> {
        let registry = self.registry.read().await;
        let task = registry.get(id).ok_or(Error::TaskNotFound(*id))?;
        let mut rng = self.fork_rng();
        let result = self
            .states
            .with_state(id, |state| {
                self.generator.regenerate(state, task, max_states, &mut rng)
            })
            .unwrap_or(Err(Error::TaskNotFound(*id)));
        if result.is_ok() {
            Counters::bump(&self.counters.regenerations);
        }
        result
    }

    /// Run one adaptation pass against live configuration and announce
    /// every applied change.
    pub async fn adapt(&self) -> Vec<AppliedChange> {
        let changes = {
            let mut optimizer = self.optimizer.lock().await;
            let mut config = self.config.write().await;
            optimizer.perform_adaptation(&mut config)
        };
        for change in &changes {
            self.emit(SchedulerEvent::AdaptationApplied(change.clone()));
        }
        changes
    }

    /// Drop every task, state, entanglement and telemetry record.
    pub async fn clear(&self) {
        {
            let mut registry = self.registry.write().await;
            let mut graph = self.graph.write().await;
            registry.clear();
            graph.clear();
        }
        self.states.clear();
        self.optimizer.lock().await.clear();
    }
}

impl std::fmt::Debug for SchedulerContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SchedulerContext")
            .field("states", &self.states.len())
            .field("shutting_down", &self.is_shutting_down())
            .finish()
    }
}
