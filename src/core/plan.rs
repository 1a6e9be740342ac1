//! Dependency-respecting execution plan.
//!
//! Unfinished tasks are grouped into batches: every task in a batch has all
//! of its unfinished registered dependencies in earlier batches, so a batch
//! can run in parallel. Finished or unregistered dependencies count as
//! satisfied.

use crate::core::registry::TaskRegistry;
use crate::core::task::TaskId;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};

/// Duration assumed for tasks without an estimate.
pub const DEFAULT_TASK_DURATION_MS: u64 = 1000;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PlanBatch {
    pub index: usize,
    pub tasks: Vec<TaskId>,
    /// Longest task estimate in the batch.
    pub estimated_duration_ms: u64,
    /// Offset from plan start at which the batch is expected to finish.
    pub estimated_completion_ms: u64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExecutionPlan {
    pub batches: Vec<PlanBatch>,
    /// Longest-duration chain from a root to a leaf.
    pub critical_path: Vec<TaskId>,
    pub critical_path_ms: u64,
    pub estimated_total_ms: u64,
    pub generated_at: DateTime<Utc>,
}

impl ExecutionPlan {
    pub fn build(registry: &TaskRegistry) -> Self {
        let pending: Vec<TaskId> = registry
            .tasks()
            .filter(|t| !t.is_finished())
            .map(|t| t.id)
            .collect();

        let duration: HashMap<TaskId, u64> = pending
            .iter()
            .filter_map(|id| registry.get(id))
            .map(|t| (t.id, t.estimated_duration_ms.unwrap_or(DEFAULT_TASK_DURATION_MS)))
            .collect();

        let deps: HashMap<TaskId, Vec<TaskId>> = pending
            .iter()
            .map(|id| {
                let open = registry
                    .dependencies_of(id)
                    .into_iter()
                    .filter(|d| !d.is_finished())
                    .map(|d| d.id)
                    .collect();
                (*id, open)
            })
            .collect();

        let mut placed: HashSet<TaskId> = HashSet::new();
        let mut batches: Vec<PlanBatch> = Vec::new();
        let mut order: Vec<TaskId> = Vec::with_capacity(pending.len());
        let mut elapsed = 0u64;

        while placed.len() < pending.len() {
            let ready: Vec<TaskId> = pending
                .iter()
                .filter(|id| !placed.contains(*id))
                .filter(|id| deps[*id].iter().all(|d| placed.contains(d)))
                .copied()
                .collect();

            // Only reachable if the registry let a cycle through.
            if ready.is_empty() {
                break;
            }

            let batch_ms = ready.iter().map(|id| duration[id]).max().unwrap_or(0);
            elapsed += batch_ms;
            placed.extend(ready.iter().copied());
            order.extend(ready.iter().copied());
            batches.push(PlanBatch {
                index: batches.len(),
                tasks: ready,
                estimated_duration_ms: batch_ms,
                estimated_completion_ms: elapsed,
            });
        }

        let (critical_path, critical_path_ms) = critical_path(&order, &deps, &duration);

        Self {
            batches,
            critical_path,
            critical_path_ms,
            estimated_total_ms: elapsed,
            generated_at: Utc::now(),
        }
    }

    pub fn task_count(&self) -> usize {
        self.batches.iter().map(|b| b.tasks.len()).sum()
    }

    /// Widest batch, i.e. the peak parallelism the plan asks for.
    pub fn max_parallelism(&self) -> usize {
        self.batches.iter().map(|b| b.tasks.len()).max().unwrap_or(0)
    }
}

/// Longest path by summed duration over a topologically ordered set.
fn critical_path(
    order: &[TaskId],
    deps: &HashMap<TaskId, Vec<TaskId>>,
    duration: &HashMap<TaskId, u64>,
) -> (Vec<TaskId>, u64) {
    let mut finish: HashMap<TaskId, u64> = HashMap::new();
    let mut prev: HashMap<TaskId, TaskId> = HashMap::new();

    for id in order {
        let best = deps[id]
            .iter()
            .filter_map(|d| finish.get(d).map(|f| (*d, *f)))
            .max_by_key(|(_, f)| *f);
        let start = match best {
            Some((d, f)) => {
                prev.insert(*id, d);
                f
            }
            None => 0,
        };
        finish.insert(*id, start + duration[id]);
    }

    // Ties resolve to the earliest task in plan order.
    let Some((mut current, total)) = order
        .iter()
        .map(|id| (*id, finish[id]))
        .fold(None, |best: Option<(TaskId, u64)>, (id, f)| match best {
            Some((_, bf)) if bf >= f => best,
            _ => Some((id, f)),
        })
    else {
        return (Vec::new(), 0);
    };

    let mut path = vec![current];
    while let Some(p) = prev.get(&current) {
        path.push(*p);
        current = *p;
    }
    path.reverse();
    (path, total)
}
