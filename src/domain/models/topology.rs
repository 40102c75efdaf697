//! Topology domain model: the coordinator's neighbor map over registered agents.

use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};

/// Selectable topology kinds. `Adaptive` defers the actual shape to the
/// orchestrator's `optimizeTopology` heuristics.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TopologyKind {
    Mesh,
    Hierarchical,
    Star,
    Ring,
    Adaptive,
}

impl Default for TopologyKind {
    fn default() -> Self {
        Self::Star
    }
}

/// Neighbor relation over registered agents.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Topology {
    pub kind: TopologyKind,
    pub neighbors: HashMap<String, HashSet<String>>,
}

impl Topology {
    /// Recompute the neighbor map for `agent_ids` under `kind`.
    ///
    /// `leader` selects the STAR center when present; otherwise the first id
    /// in `agent_ids` (in the order given) is used.
    pub fn rebuild(kind: TopologyKind, agent_ids: &[String], leader: Option<&str>) -> Self {
        let mut neighbors: HashMap<String, HashSet<String>> =
            agent_ids.iter().map(|id| (id.clone(), HashSet::new())).collect();

        match kind {
            TopologyKind::Mesh => {
                for a in agent_ids {
                    for b in agent_ids {
                        if a != b {
                            neighbors.get_mut(a).unwrap().insert(b.clone());
                        }
                    }
                }
            }
            TopologyKind::Star | TopologyKind::Adaptive => {
                if let Some(center) = leader.map(str::to_string).or_else(|| agent_ids.first().cloned()) {
                    for id in agent_ids {
                        if *id != center {
                            neighbors.get_mut(id).unwrap().insert(center.clone());
                            neighbors.get_mut(&center).unwrap().insert(id.clone());
                        }
                    }
                }
            }
            TopologyKind::Ring => {
                let n = agent_ids.len();
                for (i, id) in agent_ids.iter().enumerate() {
                    if n > 1 {
                        let successor = &agent_ids[(i + 1) % n];
                        neighbors.get_mut(id).unwrap().insert(successor.clone());
                    }
                }
            }
            TopologyKind::Hierarchical => {
                for (i, id) in agent_ids.iter().enumerate() {
                    if i > 0 {
                        let parent_idx = (i - 1) / 2;
                        let parent = &agent_ids[parent_idx];
                        neighbors.get_mut(id).unwrap().insert(parent.clone());
                        neighbors.get_mut(parent).unwrap().insert(id.clone());
                    }
                }
            }
        }

        Self { kind, neighbors }
    }

    pub fn connections(&self, id: &str) -> HashSet<String> {
        self.neighbors.get(id).cloned().unwrap_or_default()
    }

    /// Remove `id` from the topology and from every neighbor list.
    pub fn remove(&mut self, id: &str) {
        self.neighbors.remove(id);
        for set in self.neighbors.values_mut() {
            set.remove(id);
        }
    }
}
