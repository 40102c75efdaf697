//! Dependency cycle detection for the work-stealing scheduler.
//!
//! The scheduler tracks dependencies lazily (a task is simply skipped by
//! `requestTask` until every dependency id has gone through `completeTask`),
//! but `submitTask` still rejects a task whose dependency set would close a
//! cycle against the tasks already known to the scheduler — a task can never
//! become eligible once that happens.

use std::collections::{HashMap, HashSet};
use uuid::Uuid;

use crate::domain::error::SchedulerError;

/// Resolves whether adding `new_task`'s dependency edges to the graph formed
/// by `existing` would create a cycle reachable from `new_task`.
#[derive(Debug, Default)]
pub struct DependencyResolver;

impl DependencyResolver {
    pub fn new() -> Self {
        Self
    }

    /// `existing` maps a task id to its dependency set, for every
    /// non-terminal task currently known to the scheduler.
    pub fn check_acyclic(
        &self,
        new_task: Uuid,
        new_deps: &HashSet<Uuid>,
        existing: &HashMap<Uuid, HashSet<Uuid>>,
    ) -> Result<(), SchedulerError> {
        let mut graph = existing.clone();
        graph.insert(new_task, new_deps.clone());

        let mut visited = HashSet::new();
        let mut stack = HashSet::new();
        if Self::has_cycle_from(new_task, &graph, &mut visited, &mut stack) {
            return Err(SchedulerError::CircularDependency(new_task));
        }
        Ok(())
    }

    fn has_cycle_from(
        node: Uuid,
        graph: &HashMap<Uuid, HashSet<Uuid>>,
        visited: &mut HashSet<Uuid>,
        stack: &mut HashSet<Uuid>,
    ) -> bool {
        if stack.contains(&node) {
            return true;
        }
        if visited.contains(&node) {
            return false;
        }
        visited.insert(node);
        stack.insert(node);

        if let Some(deps) = graph.get(&node) {
            for &dep in deps {
                if Self::has_cycle_from(dep, graph, visited, stack) {
                    return true;
                }
            }
        }

        stack.remove(&node);
        false
    }
}
