use serde::{Deserialize, Serialize};

use super::topology::TopologyKind;

/// Top-level orchestrator configuration. Enumerates exactly the tunables
/// named in the external interfaces contract.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct OrchestratorConfig {
    #[serde(default)]
    pub topology: TopologyKind,

    #[serde(default = "default_min_agents")]
    pub min_agents: usize,

    #[serde(default = "default_max_agents")]
    pub max_agents: usize,

    #[serde(default)]
    pub scheduler: SchedulerConfig,

    #[serde(default)]
    pub coordination: CoordinationConfig,

    #[serde(default)]
    pub scaling: ScalingConfig,

    /// Declared agent type list, round-robined during scale-up and initial spawn.
    #[serde(default = "default_agent_types")]
    pub agent_types: Vec<String>,
}

const fn default_min_agents() -> usize {
    1
}

const fn default_max_agents() -> usize {
    50
}

fn default_agent_types() -> Vec<String> {
    vec!["coordination".to_string()]
}

impl Default for OrchestratorConfig {
    fn default() -> Self {
        Self {
            topology: TopologyKind::default(),
            min_agents: default_min_agents(),
            max_agents: default_max_agents(),
            scheduler: SchedulerConfig::default(),
            coordination: CoordinationConfig::default(),
            scaling: ScalingConfig::default(),
            agent_types: default_agent_types(),
        }
    }
}

/// Work-stealing scheduler tunables.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct SchedulerConfig {
    #[serde(default = "default_true")]
    pub work_stealing_enabled: bool,

    #[serde(default = "default_priority_levels")]
    pub priority_levels: usize,

    #[serde(default = "default_max_queue_size")]
    pub max_queue_size: usize,

    #[serde(default = "default_steal_threshold")]
    pub steal_threshold: f64,

    #[serde(default = "default_steal_cooldown_ms")]
    pub steal_cooldown_ms: u64,

    #[serde(default = "default_task_timeout_ms")]
    pub task_timeout_ms: u64,

    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
}

const fn default_true() -> bool {
    true
}
const fn default_priority_levels() -> usize {
    5
}
const fn default_max_queue_size() -> usize {
    10_000
}
const fn default_steal_threshold() -> f64 {
    0.3
}
const fn default_steal_cooldown_ms() -> u64 {
    100
}
const fn default_task_timeout_ms() -> u64 {
    30_000
}
const fn default_max_retries() -> u32 {
    3
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            work_stealing_enabled: default_true(),
            priority_levels: default_priority_levels(),
            max_queue_size: default_max_queue_size(),
            steal_threshold: default_steal_threshold(),
            steal_cooldown_ms: default_steal_cooldown_ms(),
            task_timeout_ms: default_task_timeout_ms(),
            max_retries: default_max_retries(),
        }
    }
}

/// Coordinator tunables.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct CoordinationConfig {
    /// Nominal protocol tag. Informational only — see design notes.
    #[serde(default = "default_protocol")]
    pub protocol: String,

    #[serde(default = "default_quorum_size")]
    pub quorum_size: usize,

    #[serde(default = "default_heartbeat_interval_ms")]
    pub heartbeat_interval_ms: u64,

    #[serde(default = "default_election_timeout_ms")]
    pub election_timeout_ms: u64,

    #[serde(default = "default_max_message_age_ms")]
    pub max_message_age_ms: u64,
}

fn default_protocol() -> String {
    "raft-style".to_string()
}
const fn default_quorum_size() -> usize {
    2
}
const fn default_heartbeat_interval_ms() -> u64 {
    1000
}
const fn default_election_timeout_ms() -> u64 {
    3000
}
const fn default_max_message_age_ms() -> u64 {
    60_000
}

impl Default for CoordinationConfig {
    fn default() -> Self {
        Self {
            protocol: default_protocol(),
            quorum_size: default_quorum_size(),
            heartbeat_interval_ms: default_heartbeat_interval_ms(),
            election_timeout_ms: default_election_timeout_ms(),
            max_message_age_ms: default_max_message_age_ms(),
        }
    }
}

/// Auto-scaling tunables.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct ScalingConfig {
    #[serde(default = "default_true")]
    pub auto_scale: bool,

    #[serde(default = "default_scale_up_threshold")]
    pub scale_up_threshold: f64,

    #[serde(default = "default_scale_down_threshold")]
    pub scale_down_threshold: f64,

    #[serde(default = "default_cooldown_period_ms")]
    pub cooldown_period_ms: u64,
}

const fn default_scale_up_threshold() -> f64 {
    0.8
}
const fn default_scale_down_threshold() -> f64 {
    0.2
}
const fn default_cooldown_period_ms() -> u64 {
    30_000
}

impl Default for ScalingConfig {
    fn default() -> Self {
        Self {
            auto_scale: default_true(),
            scale_up_threshold: default_scale_up_threshold(),
            scale_down_threshold: default_scale_down_threshold(),
            cooldown_period_ms: default_cooldown_period_ms(),
        }
    }
}
