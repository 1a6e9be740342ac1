//! Correlation graph between tasks.
//!
//! Each edge is an entanglement: an undirected link carrying the correlation
//! score that decides how strongly a measurement on one endpoint nudges the
//! other. Edges disappear together with either endpoint.

use crate::core::registry::TaskRegistry;
use crate::core::task::{Task, TaskId};
use chrono::{DateTime, Utc};
use petgraph::stable_graph::{NodeIndex, StableUnGraph};
use petgraph::visit::EdgeRef;
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};
use uuid::Uuid;

/// Weight contributed by a direct dependency in either direction.
pub const DEPENDENCY_WEIGHT: f64 = 0.4;
/// Weight contributed by a shared category.
pub const CATEGORY_WEIGHT: f64 = 0.4;
/// Weight contributed by a shared assignee.
pub const ASSIGNEE_WEIGHT: f64 = 0.4;
/// Multiplier on the resource overlap ratio.
pub const RESOURCE_WEIGHT: f64 = 0.2;
/// Correlation above which an entanglement is classified strong.
pub const STRONG_CORRELATION: f64 = 0.9;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct EntanglementId(pub Uuid);

impl EntanglementId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for EntanglementId {
    fn default() -> Self {
        Self::new()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EntanglementKind {
    Strong,
    Weak,
}

impl EntanglementKind {
    pub fn from_correlation(correlation: f64) -> Self {
        if correlation > STRONG_CORRELATION {
            EntanglementKind::Strong
        } else {
            EntanglementKind::Weak
        }
    }
}

/// An undirected correlation edge between two tasks.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Entanglement {
    pub id: EntanglementId,
    pub task_a: TaskId,
    pub task_b: TaskId,
    /// Always within `[0, 1]`.
    pub correlation: f64,
    /// Equal to `correlation`.
    pub strength: f64,
    pub kind: EntanglementKind,
    pub created_at: DateTime<Utc>,
}

impl Entanglement {
    pub fn new(task_a: TaskId, task_b: TaskId, correlation: f64) -> Self {
        let correlation = correlation.clamp(0.0, 1.0);
        Self {
            id: EntanglementId::new(),
            task_a,
            task_b,
            correlation,
            strength: correlation,
            kind: EntanglementKind::from_correlation(correlation),
            created_at: Utc::now(),
        }
    }

    /// The endpoint opposite to `id`, if `id` is an endpoint.
    pub fn partner_of(&self, id: &TaskId) -> Option<TaskId> {
        if &self.task_a == id {
            Some(self.task_b)
        } else if &self.task_b == id {
            Some(self.task_a)
        } else {
            None
        }
    }
}

/// Correlation between two tasks, clamped to `[0, 1]`.
///
/// The raw sum of dependency, category and assignee weights plus the
/// scaled resource overlap can exceed 1.0; it saturates at the clamp.
pub fn correlation(a: &Task, b: &Task) -> f64 {
    let mut score = 0.0;

    if a.depends_on(&b.id) || b.depends_on(&a.id) {
        score += DEPENDENCY_WEIGHT;
    }
    if shared(&a.category, &b.category) {
        score += CATEGORY_WEIGHT;
    }
    if shared(&a.assignee, &b.assignee) {
        score += ASSIGNEE_WEIGHT;
    }
    score += RESOURCE_WEIGHT * a.resources.overlap(&b.resources);

    score.clamp(0.0, 1.0)
}

fn shared(a: &Option<String>, b: &Option<String>) -> bool {
    matches!((a, b), (Some(x), Some(y)) if x == y)
}

/// Registered tasks worth scoring against `task`.
///
/// Up to `large_threshold` tasks every task is a candidate. Beyond that only
/// the `sample_size` most recent tasks plus at most `sample_size` of the
/// newest same-category tasks are scored.
pub fn correlation_candidates<'a>(
    registry: &'a TaskRegistry,
    task: &Task,
    large_threshold: usize,
    sample_size: usize,
) -> Vec<&'a Task> {
    if registry.len() <= large_threshold {
        return registry.tasks().filter(|t| t.id != task.id).collect();
    }

    let mut seen: HashSet<TaskId> = HashSet::new();
    let mut out = Vec::new();
    let recent = registry.recent(sample_size).into_iter();
    let same_category: Vec<&Task> = match task.category.as_deref() {
        Some(cat) => registry.by_category(cat).rev().take(sample_size).collect(),
        None => Vec::new(),
    };

    for candidate in recent.chain(same_category) {
        if candidate.id != task.id && seen.insert(candidate.id) {
            out.push(candidate);
        }
    }
    out
}

/// Undirected graph of entanglements keyed by task id.
pub struct CorrelationGraph {
    graph: StableUnGraph<TaskId, Entanglement>,
    node_index: HashMap<TaskId, NodeIndex>,
}

impl CorrelationGraph {
    pub fn new() -> Self {
        Self {
            graph: StableUnGraph::default(),
            node_index: HashMap::new(),
        }
    }

    fn node(&mut self, id: TaskId) -> NodeIndex {
        if let Some(&index) = self.node_index.get(&id) {
            return index;
        }
        let index = self.graph.add_node(id);
        self.node_index.insert(id, index);
        index
    }

    /// Link two tasks. Returns `None` for a self link or an existing edge.
    pub fn entangle(&mut self, a: TaskId, b: TaskId, correlation: f64) -> Option<Entanglement> {
        if a == b {
            return None;
        }
        let ia = self.node(a);
        let ib = self.node(b);
        if self.graph.find_edge(ia, ib).is_some() {
            return None;
        }
        let edge = Entanglement::new(a, b, correlation);
        self.graph.add_edge(ia, ib, edge.clone());
        Some(edge)
    }

    /// Remove a task node; returns the entanglements that were pruned.
    pub fn remove_task(&mut self, id: &TaskId) -> Vec<Entanglement> {
        let Some(index) = self.node_index.remove(id) else {
            return Vec::new();
        };
        let pruned: Vec<Entanglement> = self
            .graph
            .edges(index)
            .map(|e| e.weight().clone())
            .collect();
        self.graph.remove_node(index);
        pruned
    }

    pub fn entanglements_of(&self, id: &TaskId) -> Vec<&Entanglement> {
        match self.node_index.get(id) {
            Some(&index) => self.graph.edges(index).map(|e| e.weight()).collect(),
            None => Vec::new(),
        }
    }

    /// `(partner, correlation)` for every edge touching `id`.
    pub fn partners(&self, id: &TaskId) -> Vec<(TaskId, f64)> {
        self.entanglements_of(id)
            .into_iter()
            .filter_map(|e| e.partner_of(id).map(|p| (p, e.correlation)))
            .collect()
    }

    pub fn is_entangled(&self, id: &TaskId) -> bool {
        !self.entanglements_of(id).is_empty()
    }

    pub fn between(&self, a: &TaskId, b: &TaskId) -> Option<&Entanglement> {
        let ia = self.node_index.get(a)?;
        let ib = self.node_index.get(b)?;
        let edge = self.graph.find_edge(*ia, *ib)?;
        self.graph.edge_weight(edge)
    }

    pub fn all(&self) -> Vec<&Entanglement> {
        self.graph
            .edge_indices()
            .filter_map(|e| self.graph.edge_weight(e))
            .collect()
    }

    pub fn len(&self) -> usize {
        self.graph.edge_count()
    }

    pub fn is_empty(&self) -> bool {
        self.graph.edge_count() == 0
    }

    pub fn clear(&mut self) {
        self.graph.clear();
        self.node_index.clear();
    }
}

impl Default for CorrelationGraph {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for CorrelationGraph {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CorrelationGraph")
            .field("nodes", &self.node_index.len())
            .field("entanglements", &self.len())
            .finish()
    }
}
