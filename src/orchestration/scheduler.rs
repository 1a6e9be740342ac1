//! Scheduler facade.
//!
//! The `Scheduler` owns the shared context and the periodic actors. Task
//! creation, outcome reporting, adaptation and metrics all go through it;
//! the actors call the same cycle functions as `measure_now` and
//! `maintain_coherence_now`.
//!
//! # Example
//!
//! ```ignore
//! use qsched::{Scheduler, SchedulerConfig, TaskSpec};
//!
//! let scheduler = Scheduler::new(SchedulerConfig::default())?;
//! scheduler.start();
//! let task = scheduler
//!     .create_task(TaskSpec::new("train").with_category("ml"))
//!     .await?;
//! scheduler.complete_task(task.id, true, 1200).await?;
//! println!("{:?}", scheduler.get_metrics().await);
//! scheduler.shutdown().await;
//! ```

use crate::actors::{ActorHandle, AdaptationActor, CoherenceActor, MeasurementActor};
use crate::adaptive::optimizer::{
    degrade_state_count, AppliedChange, ConfigurationPrediction, CycleReport,
    WorkloadCharacteristics,
};
use crate::adaptive::telemetry::{ExecutionRecord, MetricsSnapshot, RecordOutcome, ResourceUsage};
use crate::config::SchedulerConfig;
use crate::core::correlation::{correlation, correlation_candidates, Entanglement};
use crate::core::plan::{ExecutionPlan, DEFAULT_TASK_DURATION_MS};
use crate::core::task::{Task, TaskId, TaskSpec, TaskStatus, PRIORITY_MAX, PRIORITY_MIN};
use crate::error::{Error, Result};
use crate::orchestration::coherence::{self, CoherenceReport};
use crate::orchestration::context::{Counters, SchedulerContext};
use crate::orchestration::events::{
    ErrorSink, LogErrorSink, SchedulerEvent, EVENT_CHANNEL_CAPACITY,
};
use crate::orchestration::measurement;
use crate::state::superposition::ProbabilisticState;
use crate::{qlog, qlog_debug, qlog_warn};
use futures::future::join_all;
use serde::{Deserialize, Serialize};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::broadcast;
use tokio_util::sync::CancellationToken;

/// Point-in-time view of scheduler health.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SystemMetrics {
    pub task_count: usize,
    pub state_count: usize,
    pub entanglement_count: usize,
    pub measurement_count: u64,
    pub mean_coherence: f64,
    /// Mean estimated over mean actual duration of completed tasks, capped at 1.0.
    pub efficiency: f64,
    pub measurement_failures: u64,
    pub regenerations: u64,
    pub measurement_cycles: u64,
    pub telemetry_records: usize,
    pub adaptations_applied: u64,
    pub average_cycle_ms: Option<f64>,
    pub latest_snapshot: Option<MetricsSnapshot>,
}

pub struct Scheduler {
    ctx: Arc<SchedulerContext>,
    root: CancellationToken,
    actors: Mutex<Vec<ActorHandle>>,
}

impl Scheduler {
    /// Validate `config` and build an idle scheduler.
    ///
    /// # Errors
    /// `Configuration` for any out-of-range parameter.
    pub fn new(config: SchedulerConfig) -> Result<Self> {
        Self::with_error_sink(config, Arc::new(LogErrorSink))
    }

    pub fn with_error_sink(config: SchedulerConfig, sink: Arc<dyn ErrorSink>) -> Result<Self> {
        config.validate()?;
        qlog_debug!(
            "Scheduler::new max_states={} threshold={} coherence_time={}ms interval={}ms seed={:?}",
            config.max_superposition_states,
            config.entanglement_threshold,
            config.coherence_time_ms,
            config.measurement_interval_ms,
            config.rng_seed
        );
        let (events, _) = broadcast::channel(EVENT_CHANNEL_CAPACITY);
        Ok(Self {
            ctx: Arc::new(SchedulerContext::new(config, events, sink)),
            root: CancellationToken::new(),
            actors: Mutex::new(Vec::new()),
        })
    }

    /// Spawn the measurement, coherence and adaptation actors. Must be
    /// called from within a tokio runtime. No-op when already running or
    /// shut down.
    pub fn start(&self) {
        if self.ctx.is_shutting_down() {
            return;
        }
        let mut actors = self.lock_actors();
        if !actors.is_empty() {
            return;
        }
        actors.push(MeasurementActor::new(Arc::clone(&self.ctx)).spawn(&self.root));
        actors.push(CoherenceActor::new(Arc::clone(&self.ctx)).spawn(&self.root));
        actors.push(AdaptationActor::new(Arc::clone(&self.ctx)).spawn(&self.root));
        qlog!("Scheduler started with {} actors", actors.len());
    }

    pub fn is_running(&self) -> bool {
        !self.lock_actors().is_empty()
    }

    pub fn subscribe(&self) -> broadcast::Receiver<SchedulerEvent> {
        self.ctx.subscribe()
    }

    /// Snapshot of live configuration.
    pub async fn config(&self) -> SchedulerConfig {
        self.ctx.config_snapshot().await
    }

    /// Register a task, generate its state and link it to correlated tasks.
    ///
    /// Nothing is inserted unless every step succeeds.
    ///
    /// # Errors
    /// - `Validation` for an empty name or after shutdown
    /// - `DuplicateTask` for a reused id
    /// - `CircularDependency` when the dependencies would close a cycle
    /// - `SystemOverload` when the registry is at `max_tasks`
    pub async fn create_task(&self, spec: TaskSpec) -> Result<Task> {
        if self.ctx.is_shutting_down() {
            return Err(Error::Validation("scheduler is shut down".into()));
        }
        let config = self.ctx.config_snapshot().await;
        if !(PRIORITY_MIN..=PRIORITY_MAX).contains(&spec.priority) {
            qlog_warn!(
                "Priority {} for '{}' clamped to [{}, {}]",
                spec.priority,
                spec.name,
                PRIORITY_MIN,
                PRIORITY_MAX
            );
        }

        let mut registry = self.ctx.registry.write().await;
        if registry.len() >= config.max_tasks {
            let err = Error::SystemOverload {
                tasks: registry.len(),
                limit: config.max_tasks,
            };
            drop(registry);
            self.relieve_pressure(&err).await;
            return Err(err);
        }
        registry.validate(&spec)?;

        let task = Task::from_spec(spec);
        let mut rng = self.ctx.fork_rng();
        let state = self
            .ctx
            .generator
            .generate(&task, config.max_superposition_states, &mut rng)?;
        registry.insert(task.clone())?;
        self.ctx.states.insert(state);

        let correlated: Vec<(TaskId, f64)> = correlation_candidates(
            &registry,
            &task,
            config.large_registry_threshold,
            config.correlation_sample_size,
        )
        .into_iter()
        .map(|other| (other.id, correlation(&task, other)))
        .filter(|(_, c)| *c >= config.entanglement_threshold)
        .collect();

        let created: Vec<Entanglement> = if correlated.is_empty() {
            Vec::new()
        } else {
            let mut graph = self.ctx.graph.write().await;
            correlated
                .into_iter()
                .filter_map(|(other, c)| graph.entangle(task.id, other, c))
                .collect()
        };
        drop(registry);

        for edge in &created {
            self.ctx.states.with_state(&edge.task_a, |s| s.entangled = true);
            self.ctx.states.with_state(&edge.task_b, |s| s.entangled = true);
        }

        qlog_debug!(
            "Created task {} '{}' with {} entanglements",
            task.id.short(),
            task.name,
            created.len()
        );
        self.ctx.emit(SchedulerEvent::TaskCreated {
            task_id: task.id,
            name: task.name.clone(),
        });
        for edge in created {
            self.ctx.emit(SchedulerEvent::EntanglementCreated(edge));
        }
        Ok(task)
    }

    async fn relieve_pressure(&self, err: &Error) {
        qlog_warn!("{}", err);
        self.ctx.warn(None, err);
        let degraded = degrade_state_count(&mut *self.ctx.config.write().await);
        if let Some(change) = degraded {
            self.ctx.emit(SchedulerEvent::AdaptationApplied(change));
        }
    }

    pub async fn get_task(&self, id: &TaskId) -> Option<Task> {
        self.ctx.registry.read().await.get(id).cloned()
    }

    pub fn get_state(&self, id: &TaskId) -> Option<ProbabilisticState> {
        self.ctx.states.get(id)
    }

    pub async fn entanglements_of(&self, id: &TaskId) -> Vec<Entanglement> {
        self.ctx
            .graph
            .read()
            .await
            .entanglements_of(id)
            .into_iter()
            .cloned()
            .collect()
    }

    pub async fn task_count(&self) -> usize {
        self.ctx.registry.read().await.len()
    }

    /// Report the real outcome of a task's work.
    ///
    /// # Errors
    /// `TaskNotFound` for an unknown id, `Validation` if already finished or
    /// if the outcome cannot be recorded. The task is untouched on error.
    pub async fn complete_task(
        &self,
        id: TaskId,
        success: bool,
        actual_duration_ms: u64,
    ) -> Result<Task> {
        let (task, record) = {
            let mut registry = self.ctx.registry.write().await;
            let task = registry.get_mut(&id).ok_or(Error::TaskNotFound(id))?;
            if task.is_finished() {
                return Err(Error::Validation(format!(
                    "task {} already finished as {}",
                    id, task.status
                )));
            }
            let resources = task.resources;
            let mut record = ExecutionRecord::new(id, actual_duration_ms as f64, success)
                .with_resources(ResourceUsage::new(resources.cpu, resources.memory, resources.gpu));
            if let Some(estimate) = task.estimated_duration_ms {
                record = record.with_prediction(estimate as f64);
            }
            record.validate()?;
            task.finish(success, actual_duration_ms);
            (task.clone(), record)
        };
        self.record_execution(record).await?;

        self.ctx.emit(SchedulerEvent::TaskCompleted {
            task_id: id,
            success,
        });
        Ok(task)
    }

    /// Append an execution outcome to telemetry. Crossing the memory window
    /// degrades the live configuration the same way an overload does.
    pub async fn record_execution(&self, record: ExecutionRecord) -> Result<RecordOutcome> {
        let config = self.ctx.config_snapshot().await;
        let (outcome, records) = {
            let mut optimizer = self.ctx.optimizer.lock().await;
            let outcome = optimizer.record_execution(record, &config)?;
            (outcome, optimizer.telemetry().len())
        };
        if let RecordOutcome::Appended { pressure: true, .. } = outcome {
            self.relieve_pressure(&Error::MemoryPressure {
                records,
                limit: config.memory_window,
            })
            .await;
        }
        Ok(outcome)
    }

    /// Compare the two newest telemetry snapshots and apply bounded changes.
    pub async fn perform_adaptation(&self) -> Vec<AppliedChange> {
        self.ctx.adapt().await
    }

    pub async fn predict_optimal_configuration(
        &self,
        characteristics: &WorkloadCharacteristics,
    ) -> ConfigurationPrediction {
        let config = self.ctx.config_snapshot().await;
        self.ctx
            .optimizer
            .lock()
            .await
            .predict_optimal_configuration(characteristics, &config)
    }

    pub async fn get_metrics(&self) -> SystemMetrics {
        let (task_count, efficiency) = {
            let registry = self.ctx.registry.read().await;
            (registry.len(), efficiency(registry.tasks()))
        };
        let entanglement_count = self.ctx.graph.read().await.len();
        let (telemetry_records, adaptations_applied, average_cycle_ms, latest_snapshot) = {
            let optimizer = self.ctx.optimizer.lock().await;
            (
                optimizer.telemetry().len(),
                optimizer.applied_total(),
                optimizer.cycle_average_ms(),
                optimizer.latest_snapshot().cloned(),
            )
        };
        let counters = &self.ctx.counters;

        SystemMetrics {
            task_count,
            state_count: self.ctx.states.len(),
            entanglement_count,
            measurement_count: Counters::read(&counters.measurements),
            mean_coherence: self.ctx.states.mean_coherence(),
            efficiency,
            measurement_failures: Counters::read(&counters.measurement_failures),
            regenerations: Counters::read(&counters.regenerations),
            measurement_cycles: Counters::read(&counters.cycles),
            telemetry_records,
            adaptations_applied,
            average_cycle_ms,
            latest_snapshot,
        }
    }

    pub async fn get_optimal_execution_plan(&self) -> ExecutionPlan {
        ExecutionPlan::build(&*self.ctx.registry.read().await)
    }

    /// Run one measurement cycle now.
    pub async fn measure_now(&self) -> CycleReport {
        measurement::run_cycle(&self.ctx).await
    }

    /// Run one coherence maintenance cycle now.
    pub async fn maintain_coherence_now(&self) -> CoherenceReport {
        coherence::run_cycle(&self.ctx).await
    }

    /// Stop all actors, wait up to the grace period, then drop all state.
    /// Safe to call more than once.
    pub async fn shutdown(&self) {
        if !self.ctx.begin_shutdown() {
            return;
        }
        let grace = Duration::from_millis(self.ctx.config.read().await.shutdown_grace_ms);
        qlog!("Scheduler shutting down (grace {:?})", grace);

        self.root.cancel();
        let handles: Vec<ActorHandle> = std::mem::take(&mut *self.lock_actors());
        let aborts: Vec<_> = handles.iter().map(|h| h.abort_handle()).collect();

        match tokio::time::timeout(grace, join_all(handles.into_iter().map(|h| h.join()))).await {
            Ok(results) => {
                for err in results.into_iter().filter_map(|r| r.err()) {
                    self.ctx.report("shutdown", None, &err);
                }
            }
            Err(_) => {
                qlog_warn!("Actors still running after {:?}, aborting", grace);
                for abort in aborts {
                    abort.abort();
                }
            }
        }

        self.ctx.clear().await;
        qlog!("Scheduler stopped");
    }

    pub fn is_shut_down(&self) -> bool {
        self.ctx.is_shutting_down()
    }

    fn lock_actors(&self) -> std::sync::MutexGuard<'_, Vec<ActorHandle>> {
        self.actors.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

impl Drop for Scheduler {
    fn drop(&mut self) {
        self.root.cancel();
    }
}

impl std::fmt::Debug for Scheduler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Scheduler")
            .field("ctx", &self.ctx)
            .field("actors", &self.lock_actors().len())
            .finish()
    }
}

/// Mean estimated over mean actual duration of completed tasks, capped at 1.0.
/// Zero when nothing has completed.
fn efficiency<'a>(tasks: impl Iterator<Item = &'a Task>) -> f64 {
    let (estimated, actual, count) = tasks
        .filter(|t| t.status == TaskStatus::Completed)
        .filter_map(|t| {
            t.actual_duration_ms.map(|actual| {
                (
                    t.estimated_duration_ms.unwrap_or(DEFAULT_TASK_DURATION_MS) as f64,
                    actual as f64,
                )
            })
        })
        .fold((0.0, 0.0, 0usize), |(e, a, n), (te, ta)| (e + te, a + ta, n + 1));
    if count == 0 {
        return 0.0;
    }
    if actual <= 0.0 {
        return 1.0;
    }
    (estimated / actual).min(1.0)
}
