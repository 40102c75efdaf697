//! Per-agent metrics aggregation and bottleneck detection.
//!
//! Keeps one [`LatencyHistogram`]/[`AgentStats`] pair per agent and derives
//! a coarse utilization snapshot the orchestrator's auto-scaling and
//! topology-optimization heuristics read from.

use std::collections::HashMap;

use tokio::sync::RwLock;
use tracing::instrument;

use crate::domain::models::{AgentStats, LatencyHistogram};

#[derive(Debug, Default)]
struct AgentMetrics {
    stats: AgentStats,
    latency: LatencyHistogram,
}

/// A point-in-time view of one agent's throughput and error rate.
#[derive(Debug, Clone, serde::Serialize)]
pub struct AgentSnapshot {
    pub agent_id: String,
    pub tasks_processed: u64,
    pub errors: u64,
    pub p50_ms: f64,
    pub p95_ms: f64,
    pub p99_ms: f64,
    pub utilization: f64,
}

#[derive(Default)]
pub struct MetricsCollector {
    agents: RwLock<HashMap<String, AgentMetrics>>,
}

impl MetricsCollector {
    pub fn new() -> Self {
        Self::default()
    }

    #[instrument(skip(self))]
    pub async fn record_success(&self, agent_id: &str, latency_ms: f64) {
        let mut agents = self.agents.write().await;
        let entry = agents.entry(agent_id.to_string()).or_default();
        entry.stats.record_success(latency_ms);
        entry.latency.record(latency_ms);
    }

    #[instrument(skip(self))]
    pub async fn record_error(&self, agent_id: &str) {
        let mut agents = self.agents.write().await;
        agents.entry(agent_id.to_string()).or_default().stats.record_error();
    }

    pub async fn set_utilization(&self, agent_id: &str, utilization: f64) {
        let mut agents = self.agents.write().await;
        agents.entry(agent_id.to_string()).or_default().stats.utilization = utilization;
    }

    pub async fn snapshot(&self, agent_id: &str) -> Option<AgentSnapshot> {
        let agents = self.agents.read().await;
        agents.get(agent_id).map(|m| AgentSnapshot {
            agent_id: agent_id.to_string(),
            tasks_processed: m.stats.tasks_processed,
            errors: m.stats.errors,
            p50_ms: m.latency.p50().unwrap_or(0.0),
            p95_ms: m.latency.p95().unwrap_or(0.0),
            p99_ms: m.latency.p99().unwrap_or(0.0),
            utilization: m.stats.utilization,
        })
    }

    pub async fn all_snapshots(&self) -> Vec<AgentSnapshot> {
        let agents = self.agents.read().await;
        agents
            .keys()
            .cloned()
            .collect::<Vec<_>>()
            .into_iter()
            .filter_map(|id| {
                agents.get(&id).map(|m| AgentSnapshot {
                    agent_id: id.clone(),
                    tasks_processed: m.stats.tasks_processed,
                    errors: m.stats.errors,
                    p50_ms: m.latency.p50().unwrap_or(0.0),
                    p95_ms: m.latency.p95().unwrap_or(0.0),
                    p99_ms: m.latency.p99().unwrap_or(0.0),
                    utilization: m.stats.utilization,
                })
            })
            .collect()
    }

    /// Agents whose utilization exceeds `threshold` — candidates for
    /// auto-scale-up or topology rebalancing.
    pub async fn bottlenecks(&self, threshold: f64) -> Vec<String> {
        let agents = self.agents.read().await;
        agents
            .iter()
            .filter(|(_, m)| m.stats.utilization > threshold)
            .map(|(id, _)| id.clone())
            .collect()
    }

    pub async fn mean_utilization(&self) -> f64 {
        let agents = self.agents.read().await;
        if agents.is_empty() {
            return 0.0;
        }
        agents.values().map(|m| m.stats.utilization).sum::<f64>() / agents.len() as f64
    }

    pub async fn remove_agent(&self, agent_id: &str) {
        self.agents.write().await.remove(agent_id);
    }

    /// Swarm-wide totals used by the orchestrator's adaptive topology
    /// heuristic: `(tasks_processed, errors, mean p50 latency ms)`.
    pub async fn totals(&self) -> (u64, u64, f64) {
        let agents = self.agents.read().await;
        if agents.is_empty() {
            return (0, 0, 0.0);
        }
        let processed: u64 = agents.values().map(|m| m.stats.tasks_processed).sum();
        let errors: u64 = agents.values().map(|m| m.stats.errors).sum();
        let mean_latency =
            agents.values().map(|m| m.latency.p50().unwrap_or(0.0)).sum::<f64>() / agents.len() as f64;
        (processed, errors, mean_latency)
    }

    /// Fraction of completed tasks that finished without error, over all
    /// agents' lifetime counters. `1.0` when nothing has run yet.
    pub async fn completion_rate(&self) -> f64 {
        let (processed, errors, _) = self.totals().await;
        if processed + errors == 0 {
            return 1.0;
        }
        processed as f64 / (processed + errors) as f64
    }
}
