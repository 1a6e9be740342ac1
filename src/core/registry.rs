//! Task registry backed by a dependency graph.
//!
//! Nodes are tasks and an edge `a -> b` means `b` depends on `a`. Tasks may
//! declare dependencies on ids that are not registered yet; those become
//! edges when the missing task arrives. Acyclicity is checked against the
//! declared dependency sets, so dangling references are covered too.

use crate::core::task::{Task, TaskId, TaskSpec, TaskStatus};
use crate::error::{Error, Result};
use chrono::{DateTime, Utc};
use petgraph::algo::toposort;
use petgraph::stable_graph::{NodeIndex, StableDiGraph};
use petgraph::Direction;
use std::collections::{HashMap, HashSet};

pub struct TaskRegistry {
    graph: StableDiGraph<Task, ()>,
    task_index: HashMap<TaskId, NodeIndex>,
    /// Insertion order, oldest first.
    order: Vec<TaskId>,
    /// Category -> ids in insertion order.
    categories: HashMap<String, Vec<TaskId>>,
}

impl TaskRegistry {
    pub fn new() -> Self {
        Self {
            graph: StableDiGraph::new(),
            task_index: HashMap::new(),
            order: Vec::new(),
            categories: HashMap::new(),
        }
    }

    /// Validate a spec against the current registry without mutating it.
    ///
    /// # Errors
    /// - `Validation` for an empty name or a nil id
    /// - `DuplicateTask` for a reused id
    /// - `CircularDependency` when the declared dependencies close a cycle
    pub fn validate(&self, spec: &TaskSpec) -> Result<()> {
        if spec.name.trim().is_empty() {
            return Err(Error::Validation("task name must be a non-empty string".into()));
        }

        if let Some(id) = spec.id {
            if id.0.is_nil() {
                return Err(Error::Validation("task id must not be nil".into()));
            }
            if self.task_index.contains_key(&id) {
                return Err(Error::DuplicateTask(id));
            }
            if spec.dependencies.contains(&id) {
                return Err(Error::CircularDependency {
                    task: id,
                    path: vec![id, id],
                });
            }
            if let Some(path) = self.find_cycle(id, &spec.dependencies) {
                return Err(Error::CircularDependency { task: id, path });
            }
        }

        Ok(())
    }

    /// Depth-first walk from each declared dependency through the registered
    /// dependency sets, looking for a way back to `new_id`.
    ///
    /// Returns the cycle as `new_id -> ... -> new_id`.
    pub fn find_cycle(&self, new_id: TaskId, deps: &[TaskId]) -> Option<Vec<TaskId>> {
        let mut visited: HashSet<TaskId> = HashSet::new();

        for &start in deps {
            // Each stack entry carries the path that led to it.
            let mut stack: Vec<(TaskId, Vec<TaskId>)> = vec![(start, vec![new_id, start])];

            while let Some((current, path)) = stack.pop() {
                if current == new_id {
                    return Some(path);
                }
                if !visited.insert(current) {
                    continue;
                }
                if let Some(task) = self.get(&current) {
                    for next in &task.dependencies {
                        let mut next_path = path.clone();
                        next_path.push(*next);
                        stack.push((*next, next_path));
                    }
                }
            }
        }

        None
    }

    /// Insert a task, wiring edges to registered dependencies and to
    /// registered tasks that were already waiting on this id.
    pub fn insert(&mut self, task: Task) -> Result<NodeIndex> {
        if self.task_index.contains_key(&task.id) {
            return Err(Error::DuplicateTask(task.id));
        }
        let deps: Vec<TaskId> = task.dependencies.iter().copied().collect();
        if let Some(path) = self.find_cycle(task.id, &deps) {
            return Err(Error::CircularDependency {
                task: task.id,
                path,
            });
        }

        let id = task.id;
        if let Some(category) = &task.category {
            self.categories.entry(category.clone()).or_default().push(id);
        }
        let index = self.graph.add_node(task);

        for dep in &deps {
            if let Some(&dep_index) = self.task_index.get(dep) {
                self.graph.add_edge(dep_index, index, ());
            }
        }

        let waiting: Vec<NodeIndex> = self
            .graph
            .node_indices()
            .filter(|&i| i != index && self.graph[i].depends_on(&id))
            .collect();
        for dependent in waiting {
            self.graph.add_edge(index, dependent, ());
        }

        self.task_index.insert(id, index);
        self.order.push(id);
        Ok(index)
    }

    /// Remove a task and every edge touching it.
    pub fn remove(&mut self, id: &TaskId) -> Option<Task> {
        let index = self.task_index.remove(id)?;
        self.order.retain(|t| t != id);
        let task = self.graph.remove_node(index)?;
        if let Some(category) = &task.category {
            if let Some(ids) = self.categories.get_mut(category) {
                ids.retain(|t| t != id);
                if ids.is_empty() {
                    self.categories.remove(category);
                }
            }
        }
        Some(task)
    }

    pub fn get(&self, id: &TaskId) -> Option<&Task> {
        self.task_index
            .get(id)
            .and_then(|&index| self.graph.node_weight(index))
    }

    pub fn get_mut(&mut self, id: &TaskId) -> Option<&mut Task> {
        let index = *self.task_index.get(id)?;
        self.graph.node_weight_mut(index)
    }

    /// Update the status of a non-terminal task. Returns false when the task
    /// is gone or already finished.
    pub fn set_status(&mut self, id: &TaskId, status: TaskStatus) -> bool {
        match self.get_mut(id) {
            Some(task) if !task.is_finished() => {
                task.status = status;
                true
            }
            _ => false,
        }
    }

    pub fn contains(&self, id: &TaskId) -> bool {
        self.task_index.contains_key(id)
    }

    pub fn len(&self) -> usize {
        self.task_index.len()
    }

    pub fn is_empty(&self) -> bool {
        self.task_index.is_empty()
    }

    pub fn dependency_count(&self) -> usize {
        self.graph.edge_count()
    }

    /// All tasks in insertion order.
    pub fn tasks(&self) -> impl Iterator<Item = &Task> {
        self.order.iter().filter_map(move |id| self.get(id))
    }

    /// The `n` most recently inserted tasks, newest first.
    pub fn recent(&self, n: usize) -> Vec<&Task> {
        self.order
            .iter()
            .rev()
            .take(n)
            .filter_map(|id| self.get(id))
            .collect()
    }

    /// Tasks in `category`, oldest first. Served from the category index.
    pub fn by_category(&self, category: &str) -> impl DoubleEndedIterator<Item = &Task> {
        self.categories
            .get(category)
            .map(Vec::as_slice)
            .unwrap_or_default()
            .iter()
            .filter_map(move |id| self.get(id))
    }

    /// Registered tasks the given task depends on.
    pub fn dependencies_of(&self, id: &TaskId) -> Vec<&Task> {
        self.neighbors(id, Direction::Incoming)
    }

    /// Registered tasks that depend on the given task.
    pub fn dependents_of(&self, id: &TaskId) -> Vec<&Task> {
        self.neighbors(id, Direction::Outgoing)
    }

    fn neighbors(&self, id: &TaskId, dir: Direction) -> Vec<&Task> {
        match self.task_index.get(id) {
            Some(&index) => self
                .graph
                .neighbors_directed(index, dir)
                .filter_map(|n| self.graph.node_weight(n))
                .collect(),
            None => Vec::new(),
        }
    }

    /// Completed tasks whose completion is older than `cutoff`.
    pub fn completed_before(&self, cutoff: DateTime<Utc>) -> Vec<TaskId> {
        self.tasks()
            .filter(|t| t.status == TaskStatus::Completed)
            .filter(|t| t.completed_at.map(|at| at < cutoff).unwrap_or(false))
            .map(|t| t.id)
            .collect()
    }

    /// Tasks in dependency order.
    ///
    /// # Errors
    /// Returns an error if the graph contains a cycle (should never happen
    /// since insertion validates against cycles).
    pub fn topological_order(&self) -> Result<Vec<&Task>> {
        let sorted = toposort(&self.graph, None).map_err(|cycle| {
            let name = self
                .graph
                .node_weight(cycle.node_id())
                .map(|t| t.name.as_str())
                .unwrap_or("unknown");
            Error::Validation(format!("Cycle detected at task: {}", name))
        })?;

        Ok(sorted
            .into_iter()
            .filter_map(|index| self.graph.node_weight(index))
            .collect())
    }

    /// Drop every task.
    pub fn clear(&mut self) {
        self.graph.clear();
        self.task_index.clear();
        self.order.clear();
        self.categories.clear();
    }
}

impl Default for TaskRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for TaskRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TaskRegistry")
            .field("tasks", &self.len())
            .field("dependencies", &self.dependency_count())
            .finish()
    }
}
