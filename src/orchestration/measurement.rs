//! Measurement cycle: pick eligible states, collapse them in bounded
//! concurrent batches, and push each outcome across entanglement edges.

use std::time::{Duration, Instant};

use chrono::{DateTime, Utc};
use futures::future::join_all;
use rand::rngs::StdRng;
use rand::Rng;

use crate::adaptive::optimizer::CycleReport;
use crate::config::SchedulerConfig;
use crate::core::task::{TaskId, TaskStatus};
use crate::orchestration::context::{Counters, SchedulerContext};
use crate::orchestration::events::SchedulerEvent;
use crate::state::store::StateStore;
use crate::{qlog_debug, qlog_trace, qlog_warn};

/// Effective coherence below which a state is always re-measured.
pub const ELIGIBILITY_COHERENCE: f64 = 0.7;
/// Chance that a still-coherent state is measured anyway.
pub const RANDOM_REMEASURE_CHANCE: f64 = 0.1;
/// Share of an entanglement's correlation added to the partner's amplitude.
pub const PROPAGATION_FACTOR: f64 = 0.3;

#[derive(Debug, Clone, PartialEq)]
pub enum MeasurementOutcome {
    Measured { label: String, probability: f64 },
    /// Collapse failed and the state was rebuilt.
    Regenerated,
    /// Collapse and regeneration both failed.
    Failed,
    /// Task finished or vanished before its turn.
    Skipped,
}

/// Ids due for measurement, in id order so a seeded RNG replays exactly.
pub fn select_eligible<R: Rng + ?Sized>(
    states: &StateStore,
    now: DateTime<Utc>,
    coherence_time_ms: f64,
    rng: &mut R,
) -> Vec<TaskId> {
    let mut coherence: Vec<(TaskId, f64)> = Vec::with_capacity(states.len());
    states.for_each_mut(|s| {
        coherence.push((s.task_id, s.effective_coherence(now, coherence_time_ms)));
    });
    coherence.sort_by_key(|(id, _)| *id);

    coherence
        .into_iter()
        .filter(|(_, c)| *c < ELIGIBILITY_COHERENCE || rng.gen_bool(RANDOM_REMEASURE_CHANCE))
        .map(|(id, _)| id)
        .collect()
}

/// One full measurement cycle.
pub async fn run_cycle(ctx: &SchedulerContext) -> CycleReport {
    let started = Instant::now();
    let config = ctx.config_snapshot().await;
    let mut rng = ctx.fork_rng();
    let eligible = select_eligible(
        &ctx.states,
        Utc::now(),
        config.coherence_time_ms as f64,
        &mut rng,
    );
    qlog_trace!("Measurement cycle: {} eligible states", eligible.len());

    let mut measured = 0;
    let mut failures = 0;
    let pause = Duration::from_millis(config.batch_pause_ms);
    for (i, batch) in eligible.chunks(config.measurement_batch_size.max(1)).enumerate() {
        if ctx.is_shutting_down() {
            break;
        }
        if i > 0 && !pause.is_zero() {
            tokio::time::sleep(pause).await;
        }
        let outcomes = join_all(
            batch
                .iter()
                .map(|&id| measure_one(ctx, id, &config, ctx.fork_rng())),
        )
        .await;
        for outcome in outcomes {
            match outcome {
                MeasurementOutcome::Measured { .. } => measured += 1,
                MeasurementOutcome::Regenerated | MeasurementOutcome::Failed => failures += 1,
                MeasurementOutcome::Skipped => {}
            }
        }
    }

    Counters::bump(&ctx.counters.cycles);
    let report = CycleReport {
        duration_ms: started.elapsed().as_secs_f64() * 1000.0,
        measured,
        failures,
    };
    after_cycle(ctx, &config, &report).await;
    report
}

async fn after_cycle(ctx: &SchedulerContext, config: &SchedulerConfig, report: &CycleReport) {
    let slow = report.duration_ms > config.slow_cycle_threshold_ms as f64;
    if config.adaptive_learning {
        let learning = {
            let mut optimizer = ctx.optimizer.lock().await;
            let mut live = ctx.config.write().await;
            optimizer.learn_from_cycle(report, &mut live)
        };
        if let Some(change) = learning.degraded {
            ctx.emit(SchedulerEvent::AdaptationApplied(change));
        }
    } else if slow {
        qlog_warn!("Slow measurement cycle: {:.0}ms", report.duration_ms);
    }
    if slow {
        ctx.emit(SchedulerEvent::SlowCycle {
            duration_ms: report.duration_ms,
            measured: report.measured,
        });
    }
}

/// Collapse one state, update its task, and propagate. Failures are
/// isolated to this task.
pub async fn measure_one(
    ctx: &SchedulerContext,
    id: TaskId,
    config: &SchedulerConfig,
    mut rng: StdRng,
) -> MeasurementOutcome {
    {
        let registry = ctx.registry.read().await;
        match registry.get(&id) {
            Some(task) if !task.is_finished() => {}
            _ => return MeasurementOutcome::Skipped,
        }
    }

    let collapsed = ctx
        .states
        .with_state(&id, |s| s.collapse(&mut rng, config.collapse_history_limit));
    let record = match collapsed {
        None => return MeasurementOutcome::Skipped,
        Some(Ok(record)) => record,
        Some(Err(e)) => {
            Counters::bump(&ctx.counters.measurement_failures);
            ctx.report("measurement", Some(id), &e);
            return match ctx.regenerate(&id, config.max_superposition_states).await {
                Ok(()) => {
                    qlog_debug!("Regenerated state for {} after failed measurement", id.short());
                    MeasurementOutcome::Regenerated
                }
                Err(e) => {
                    ctx.report("regeneration", Some(id), &e);
                    MeasurementOutcome::Failed
                }
            };
        }
    };

    ctx.registry
        .write()
        .await
        .set_status(&id, TaskStatus::from_label(&record.label));
    Counters::bump(&ctx.counters.measurements);

    propagate(ctx, id, &record.label, config).await;

    let coherence = ctx.states.with_state(&id, |s| s.coherence).unwrap_or(0.0);
    ctx.emit(SchedulerEvent::MeasurementCompleted {
        task_id: id,
        label: record.label.clone(),
        probability: record.probability,
        coherence,
    });
    MeasurementOutcome::Measured {
        label: record.label,
        probability: record.probability,
    }
}

/// Boost the matching candidate of every entangled partner.
async fn propagate(ctx: &SchedulerContext, id: TaskId, label: &str, config: &SchedulerConfig) {
    let partners = ctx.graph.read().await.partners(&id);
    for (partner, correlation) in partners {
        let effect = correlation * PROPAGATION_FACTOR;
        if let Some(Err(e)) = ctx.states.with_state(&partner, |s| s.boost(label, effect)) {
            ctx.report("propagation", Some(partner), &e);
            if let Err(e) = ctx.regenerate(&partner, config.max_superposition_states).await {
                ctx.report("regeneration", Some(partner), &e);
            }
        }
    }
}
