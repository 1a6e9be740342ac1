//! Coherence maintenance: decay every state, rebuild the ones that fell
//! apart, and retire completed tasks past the retention window.

use chrono::{DateTime, Duration, Utc};
use std::collections::HashSet;

use crate::core::task::TaskId;
use crate::orchestration::context::SchedulerContext;
use crate::{qlog_debug, qlog_trace};

/// Decay applied per tick never leaves more than this much coherence.
pub const MAX_RETAINED_PER_TICK: f64 = 0.95;
/// Coherence below which an unfinished task's state is regenerated.
pub const REGENERATION_THRESHOLD: f64 = 0.1;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CoherenceReport {
    pub decayed: usize,
    pub regenerated: usize,
    pub removed: usize,
}

/// Multiply every state's coherence by the tick's decay; return ids that
/// dropped below the regeneration threshold.
pub fn decay_all(
    ctx: &SchedulerContext,
    now: DateTime<Utc>,
    coherence_time_ms: f64,
) -> (usize, Vec<TaskId>) {
    let mut decayed = 0;
    let mut low = Vec::new();
    ctx.states.for_each_mut(|s| {
        let factor = s.decay_factor(now, coherence_time_ms).min(MAX_RETAINED_PER_TICK);
        s.coherence *= factor;
        decayed += 1;
        if s.coherence < REGENERATION_THRESHOLD {
            low.push(s.task_id);
        }
    });
    low.sort();
    (decayed, low)
}

pub async fn run_cycle(ctx: &SchedulerContext) -> CoherenceReport {
    let config = ctx.config_snapshot().await;
    let now = Utc::now();

    let (decayed, low) = decay_all(ctx, now, config.coherence_time_ms as f64);

    let finished: HashSet<TaskId> = {
        let registry = ctx.registry.read().await;
        low.iter()
            .filter(|id| registry.get(id).map_or(true, |t| t.is_finished()))
            .copied()
            .collect()
    };

    let mut regenerated = 0;
    for id in low.iter().filter(|id| !finished.contains(*id)) {
        match ctx.regenerate(id, config.max_superposition_states).await {
            Ok(()) => regenerated += 1,
            Err(e) => ctx.report("coherence", Some(*id), &e),
        }
    }

    let retention = i64::try_from(config.completed_retention_ms)
        .ok()
        .and_then(Duration::try_milliseconds)
        .unwrap_or(Duration::MAX);
    let cutoff = now.checked_sub_signed(retention).unwrap_or(DateTime::<Utc>::MIN_UTC);
    let removed = retire_finished(ctx, cutoff).await;

    let report = CoherenceReport {
        decayed,
        regenerated,
        removed,
    };
    qlog_trace!("Coherence cycle: {:?}", report);
    report
}

/// Remove tasks completed before `cutoff` together with their states and
/// entanglements. Partners left without edges lose their entangled flag.
pub async fn retire_finished(ctx: &SchedulerContext, cutoff: DateTime<Utc>) -> usize {
    let mut registry = ctx.registry.write().await;
    let expired = registry.completed_before(cutoff);
    if expired.is_empty() {
        return 0;
    }

    let mut graph = ctx.graph.write().await;
    let mut touched: HashSet<TaskId> = HashSet::new();
    for id in &expired {
        registry.remove(id);
        ctx.states.remove(id);
        for edge in graph.remove_task(id) {
            if let Some(partner) = edge.partner_of(id) {
                touched.insert(partner);
            }
        }
    }
    for partner in touched {
        if !graph.is_entangled(&partner) {
            ctx.states.with_state(&partner, |s| s.entangled = false);
        }
    }

    qlog_debug!("Retired {} finished tasks", expired.len());
    expired.len()
}
