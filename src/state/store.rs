//! Concurrent store of probabilistic states.
//!
//! Backed by `DashMap`, which partitions entries into shards so that the
//! measurement, coherence and adaptation loops only contend when they touch
//! the same shard. An entry guard is held for the duration of one closure
//! and never across an await.

use crate::core::task::TaskId;
use crate::state::superposition::ProbabilisticState;
use dashmap::DashMap;

pub struct StateStore {
    states: DashMap<TaskId, ProbabilisticState>,
}

impl StateStore {
    pub fn new() -> Self {
        Self {
            states: DashMap::new(),
        }
    }

    pub fn insert(&self, state: ProbabilisticState) -> Option<ProbabilisticState> {
        self.states.insert(state.task_id, state)
    }

    pub fn remove(&self, id: &TaskId) -> Option<ProbabilisticState> {
        self.states.remove(id).map(|(_, state)| state)
    }

    pub fn contains(&self, id: &TaskId) -> bool {
        self.states.contains_key(id)
    }

    /// Clone of the current state.
    pub fn get(&self, id: &TaskId) -> Option<ProbabilisticState> {
        self.states.get(id).map(|entry| entry.value().clone())
    }

    /// Run `f` against one state under its entry guard.
    pub fn with_state<R>(&self, id: &TaskId, f: impl FnOnce(&mut ProbabilisticState) -> R) -> Option<R> {
        let mut entry = self.states.get_mut(id)?;
        Some(f(entry.value_mut()))
    }

    /// Run `f` against every state. `f` must not touch the store.
    pub fn for_each_mut(&self, mut f: impl FnMut(&mut ProbabilisticState)) {
        for mut entry in self.states.iter_mut() {
            f(entry.value_mut());
        }
    }

    pub fn ids(&self) -> Vec<TaskId> {
        self.states.iter().map(|entry| *entry.key()).collect()
    }

    pub fn len(&self) -> usize {
        self.states.len()
    }

    pub fn is_empty(&self) -> bool {
        self.states.is_empty()
    }

    /// Mean coherence across all states, 0.0 when empty.
    pub fn mean_coherence(&self) -> f64 {
        let (sum, count) = self
            .states
            .iter()
            .fold((0.0, 0usize), |(sum, count), entry| {
                (sum + entry.value().coherence, count + 1)
            });
        if count == 0 {
            0.0
        } else {
            sum / count as f64
        }
    }

    pub fn clear(&self) {
        self.states.clear();
    }
}

impl Default for StateStore {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for StateStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StateStore")
            .field("states", &self.len())
            .finish()
    }
}
