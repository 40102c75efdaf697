//! Agent registration domain model.
//!
//! An `AgentRegistration` is the coordinator's view of a live worker: its
//! declared capability set, role, and last-heartbeat wall-clock. The agent's
//! own execution loop and `processTask` hook live in `services::agent_runtime`.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;

/// Role an agent plays in the coordinator's bookkeeping. Orthogonal to
/// `kind` (the agent-type tag used for spawning and replacement).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AgentRole {
    Worker,
    Coordination,
}

impl Default for AgentRole {
    fn default() -> Self {
        Self::Worker
    }
}

/// Coordinator-side record of a registered agent.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgentRegistration {
    pub agent_id: String,
    /// Agent type tag (e.g. "coordination", or a domain-specific tag).
    pub kind: String,
    pub role: AgentRole,
    pub capabilities: HashSet<String>,
    pub last_heartbeat: DateTime<Utc>,
    /// True for at most one registration per term.
    pub is_leader: bool,
    pub registered_at: DateTime<Utc>,
}

impl AgentRegistration {
    pub fn new(agent_id: impl Into<String>, kind: impl Into<String>, role: AgentRole) -> Self {
        let now = Utc::now();
        Self {
            agent_id: agent_id.into(),
            kind: kind.into(),
            role,
            capabilities: HashSet::new(),
            last_heartbeat: now,
            is_leader: false,
            registered_at: now,
        }
    }

    pub fn with_capabilities(mut self, caps: impl IntoIterator<Item = String>) -> Self {
        self.capabilities = caps.into_iter().collect();
        self
    }

    /// Whether this registration has missed more than `3 * heartbeat_interval`.
    pub fn has_missed_heartbeat(&self, heartbeat_interval: std::time::Duration) -> bool {
        let elapsed = Utc::now().signed_duration_since(self.last_heartbeat);
        let threshold = chrono::Duration::from_std(heartbeat_interval * 3)
            .unwrap_or(chrono::Duration::zero());
        elapsed > threshold
    }
}
