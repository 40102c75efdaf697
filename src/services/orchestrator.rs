//! Swarm orchestrator: top-level lifecycle, auto-scaling, and topology
//! optimization wrapping the scheduler, coordinator, and per-agent runtimes.
//!
//! Agent-type specific behavior — what a spawned agent actually does with a
//! task — is supplied by the caller through an [`AgentTypeRegistry`]; the
//! orchestrator itself never interprets `Task.kind` or `Task.payload`.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use tokio::sync::{Mutex, RwLock};
use tokio::task::JoinHandle;
use tracing::{info, instrument, warn};
use uuid::Uuid;

use crate::domain::error::OrchestratorError;
use crate::domain::models::{OrchestratorConfig, Task, TopologyKind};
use crate::domain::ports::{StoreAdapter, TaskProcessor};
use crate::services::agent_runtime::AgentRuntime;
use crate::services::coordinator::Coordinator;
use crate::services::event_bus::{EventBus, SwarmEvent};
use crate::services::metrics_collector::{AgentSnapshot, MetricsCollector};
use crate::services::scheduler::Scheduler;

/// Builds a fresh [`TaskProcessor`] for a named agent type. Registered once
/// per deployment; invoked every time the orchestrator spawns an agent of
/// that type.
pub type ProcessorFactory = Arc<dyn Fn() -> Arc<dyn TaskProcessor> + Send + Sync>;

#[derive(Default)]
pub struct AgentTypeRegistry {
    factories: HashMap<String, ProcessorFactory>,
}

impl AgentTypeRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, kind: impl Into<String>, factory: ProcessorFactory) {
        self.factories.insert(kind.into(), factory);
    }

    fn build(&self, kind: &str) -> Option<Arc<dyn TaskProcessor>> {
        self.factories.get(kind).map(|f| f())
    }
}

/// A coarse point-in-time view of the swarm, for `getState`.
#[derive(Debug, Clone, serde::Serialize)]
pub struct SwarmState {
    pub agent_count: usize,
    pub leader: Option<String>,
    pub consensus_rate: f64,
    pub mean_utilization: f64,
}

struct AgentEntry {
    runtime: Arc<AgentRuntime>,
    kind: String,
}

struct OrchestratorState {
    agents: HashMap<String, AgentEntry>,
    next_agent_type_index: AtomicUsize,
}

/// Shared orchestrator state, held behind an `Arc` so the background
/// monitor and failure-recovery tasks spawned by `start` can hold their
/// own handle to it instead of a raw `self` pointer.
struct Inner {
    config: OrchestratorConfig,
    registry: AgentTypeRegistry,
    scheduler: Arc<Scheduler>,
    coordinator: Arc<Coordinator>,
    metrics: Arc<MetricsCollector>,
    store: Arc<dyn StoreAdapter>,
    events: Arc<EventBus>,
    state: RwLock<OrchestratorState>,
    running: AtomicBool,
    monitor_handle: Mutex<Option<JoinHandle<()>>>,
    recovery_handle: Mutex<Option<JoinHandle<()>>>,
    started_at: Mutex<Option<Instant>>,
}

pub struct Orchestrator {
    inner: Arc<Inner>,
}

impl Orchestrator {
    pub fn new(config: OrchestratorConfig, registry: AgentTypeRegistry, store: Arc<dyn StoreAdapter>) -> Self {
        let events = Arc::new(EventBus::default());
        let scheduler = Arc::new(Scheduler::new(config.scheduler.clone()));
        let coordinator = Arc::new(
            Coordinator::new(config.coordination.clone(), config.topology, Arc::clone(&store))
                .with_event_bus(Arc::clone(&events)),
        );
        Self {
            inner: Arc::new(Inner {
                config,
                registry,
                scheduler,
                coordinator,
                metrics: Arc::new(MetricsCollector::new()),
                store,
                events,
                state: RwLock::new(OrchestratorState {
                    agents: HashMap::new(),
                    next_agent_type_index: AtomicUsize::new(0),
                }),
                running: AtomicBool::new(false),
                monitor_handle: Mutex::new(None),
                recovery_handle: Mutex::new(None),
                started_at: Mutex::new(None),
            }),
        }
    }

    pub fn events(&self) -> Arc<EventBus> {
        Arc::clone(&self.inner.events)
    }

    #[instrument(skip(self))]
    pub async fn start(&self) -> Result<(), OrchestratorError> {
        if self.inner.running.swap(true, Ordering::SeqCst) {
            return Ok(());
        }
        self.inner.scheduler.start().await;
        self.inner.coordinator.start().await;
        *self.inner.started_at.lock().await = Some(Instant::now());

        let initial_agents = self.inner.config.min_agents.max(8);
        for _ in 0..initial_agents {
            self.spawn_agent(None).await?;
        }

        let monitor_inner = Arc::clone(&self.inner);
        let monitor_handle = tokio::spawn(async move {
            let cooldown = Duration::from_millis(monitor_inner.config.scaling.cooldown_period_ms);
            let mut interval = tokio::time::interval(cooldown);
            while monitor_inner.running.load(Ordering::SeqCst) {
                interval.tick().await;
                let mean = monitor_inner.metrics.mean_utilization().await;
                let hot = monitor_inner.metrics.bottlenecks(monitor_inner.config.scaling.scale_up_threshold).await;
                for agent_id in hot {
                    monitor_inner
                        .events
                        .publish(SwarmEvent::BottleneckDetected { agent_id, utilization: mean })
                        .await;
                }
                if monitor_inner.config.scaling.auto_scale {
                    Self::monitor_tick_inner(&monitor_inner).await;
                }
                Self::optimize_topology_inner(&monitor_inner).await;
            }
        });
        *self.inner.monitor_handle.lock().await = Some(monitor_handle);

        let mut rx = self.inner.events.subscribe();
        let recovery_inner = Arc::clone(&self.inner);
        let recovery_handle = tokio::spawn(async move {
            while recovery_inner.running.load(Ordering::SeqCst) {
                match rx.recv().await {
                    Ok(event) => {
                        if let SwarmEvent::AgentFailed { agent_id, .. } = event.payload {
                            Self::handle_agent_failure(&recovery_inner, &agent_id).await;
                        }
                    }
                    Err(tokio::sync::broadcast::error::RecvError::Lagged(_)) => continue,
                    Err(tokio::sync::broadcast::error::RecvError::Closed) => break,
                }
            }
        });
        *self.inner.recovery_handle.lock().await = Some(recovery_handle);

        self.inner.events.publish(SwarmEvent::TopologyUpdated { agent_count: initial_agents }).await;
        info!("orchestrator started");
        Ok(())
    }

    /// Reacts to a coordinator-reported heartbeat miss: despawns the failed
    /// agent and, if that drops the swarm below `min_agents`, spawns a
    /// fresh agent of the same kind to take its place.
    async fn handle_agent_failure(inner: &Arc<Inner>, agent_id: &str) {
        let kind = inner.state.read().await.agents.get(agent_id).map(|e| e.kind.clone());
        if Self::despawn_agent_inner(inner, agent_id).await.is_err() {
            return;
        }
        warn!(agent_id, "despawned failed agent");
        if inner.state.read().await.agents.len() < inner.config.min_agents {
            let replacement_kind = kind.unwrap_or_else(|| "coordination".to_string());
            if let Err(err) = Self::spawn_agent_inner(inner, Some(&replacement_kind)).await {
                warn!(%err, "failed to respawn agent after failure");
            }
        }
    }

    #[instrument(skip(self))]
    pub async fn stop(&self) {
        if !self.inner.running.swap(false, Ordering::SeqCst) {
            return;
        }
        if let Some(handle) = self.inner.monitor_handle.lock().await.take() {
            handle.abort();
        }
        if let Some(handle) = self.inner.recovery_handle.lock().await.take() {
            handle.abort();
        }
        let agent_ids: Vec<String> = self.inner.state.read().await.agents.keys().cloned().collect();
        for agent_id in agent_ids {
            let _ = self.despawn_agent(&agent_id).await;
        }
        self.inner.coordinator.stop().await;
        self.inner.scheduler.stop().await;
        *self.inner.started_at.lock().await = None;
        info!("orchestrator stopped");
    }

    /// Spawns an agent of `kind` (or the registry's next round-robin type
    /// if `None`), wiring it into the scheduler and coordinator.
    #[instrument(skip(self))]
    pub async fn spawn_agent(&self, kind: Option<&str>) -> Result<String, OrchestratorError> {
        Self::spawn_agent_inner(&self.inner, kind).await
    }

    async fn spawn_agent_inner(inner: &Arc<Inner>, kind: Option<&str>) -> Result<String, OrchestratorError> {
        let mut state = inner.state.write().await;
        if state.agents.len() >= inner.config.max_agents {
            return Err(OrchestratorError::AgentCapacityExceeded {
                active: state.agents.len(),
                max: inner.config.max_agents,
            });
        }

        let kind = match kind {
            Some(k) => k.to_string(),
            None => {
                let idx = state.next_agent_type_index.fetch_add(1, Ordering::SeqCst);
                inner.config.agent_types[idx % inner.config.agent_types.len().max(1)].clone()
            }
        };

        let processor = inner.registry.build(&kind).ok_or_else(|| OrchestratorError::StartupFailed {
            component: format!("agent_type:{kind}"),
            reason: "no processor factory registered for this agent type".to_string(),
        })?;

        let agent_id = format!("{kind}-{}", Uuid::new_v4());
        let capabilities = processor.capabilities();

        inner.scheduler.register_agent(&agent_id, capabilities.clone()).await;
        inner
            .coordinator
            .register_agent(
                crate::domain::models::AgentRegistration::new(
                    agent_id.clone(),
                    kind.clone(),
                    crate::domain::models::AgentRole::Worker,
                )
                .with_capabilities(capabilities),
            )
            .await;

        let runtime = Arc::new(AgentRuntime::new(
            agent_id.clone(),
            "swarm",
            processor,
            Arc::clone(&inner.scheduler),
            Arc::clone(&inner.store),
            Arc::clone(&inner.metrics),
        ));
        runtime.start().await;
        state.agents.insert(agent_id.clone(), AgentEntry { runtime, kind: kind.clone() });
        drop(state);

        inner.events.publish(SwarmEvent::AgentSpawned { agent_id: agent_id.clone() }).await;
        Ok(agent_id)
    }

    #[instrument(skip(self))]
    pub async fn despawn_agent(&self, agent_id: &str) -> Result<(), OrchestratorError> {
        Self::despawn_agent_inner(&self.inner, agent_id).await
    }

    async fn despawn_agent_inner(inner: &Arc<Inner>, agent_id: &str) -> Result<(), OrchestratorError> {
        let entry = {
            let mut state = inner.state.write().await;
            state
                .agents
                .remove(agent_id)
                .ok_or_else(|| OrchestratorError::UnknownAgent(agent_id.to_string()))?
        };
        entry.runtime.stop().await;
        let _ = inner.scheduler.unregister_agent(agent_id).await;
        let _ = inner.coordinator.unregister_agent(agent_id).await;
        inner.metrics.remove_agent(agent_id).await;
        inner.events.publish(SwarmEvent::AgentDespawned { agent_id: agent_id.to_string() }).await;
        Ok(())
    }

    pub async fn submit_task(&self, task: Task) -> Result<Uuid, crate::domain::error::SchedulerError> {
        let id = self.inner.scheduler.submit_task(task).await?;
        self.inner.events.publish(SwarmEvent::TaskSubmitted { task_id: id }).await;
        Ok(id)
    }

    pub async fn submit_batch(
        &self,
        tasks: Vec<Task>,
    ) -> Vec<Result<Uuid, crate::domain::error::SchedulerError>> {
        let mut results = Vec::with_capacity(tasks.len());
        for task in tasks {
            results.push(self.submit_task(task).await);
        }
        results
    }

    pub async fn get_task_result(
        &self,
        task_id: Uuid,
        timeout: Duration,
    ) -> Result<serde_json::Value, crate::domain::error::SchedulerError> {
        self.inner.scheduler.wait_for_task(task_id, timeout).await
    }

    pub async fn get_performance_metrics(&self) -> Vec<AgentSnapshot> {
        self.inner.metrics.all_snapshots().await
    }

    pub async fn get_state(&self) -> SwarmState {
        let agent_count = self.inner.state.read().await.agents.len();
        SwarmState {
            agent_count,
            leader: self.inner.coordinator.get_leader().await,
            consensus_rate: self.inner.coordinator.get_consensus_rate().await,
            mean_utilization: self.inner.metrics.mean_utilization().await,
        }
    }

    /// Recomputes the swarm topology from live throughput, latency,
    /// completion-rate, and consensus-rate figures. Only acts when the
    /// configured topology is `Adaptive` — an explicit topology choice is
    /// left alone regardless of how the swarm is behaving.
    ///
    /// Precedence, most specific first: a large, high-throughput swarm goes
    /// `Mesh` (no single coordination bottleneck); a swarm that is both slow
    /// and failing to keep up goes `Hierarchical` (bounds per-node fan-out);
    /// a swarm spending a lot of time in consensus goes `Ring` (cheap
    /// peer-to-peer propagation); otherwise `Star`.
    #[instrument(skip(self))]
    pub async fn optimize_topology(&self) {
        Self::optimize_topology_inner(&self.inner).await;
    }

    async fn optimize_topology_inner(inner: &Arc<Inner>) {
        if inner.config.topology != TopologyKind::Adaptive {
            return;
        }
        let agent_count = inner.state.read().await.agents.len();
        let elapsed_secs = inner.started_at.lock().await.map(|t| t.elapsed().as_secs_f64()).unwrap_or(0.0).max(0.001);

        let (processed, _errors, avg_latency_ms) = inner.metrics.totals().await;
        let completion_rate = inner.metrics.completion_rate().await;
        let throughput = processed as f64 / elapsed_secs;
        let (consensus_count, _) = inner.coordinator.consensus_stats().await;
        let consensus_rate = consensus_count as f64 / elapsed_secs;

        let kind = if throughput > 100.0 && agent_count > 20 {
            TopologyKind::Mesh
        } else if avg_latency_ms > 10.0 && completion_rate < 0.7 {
            TopologyKind::Hierarchical
        } else if consensus_rate > 10.0 {
            TopologyKind::Ring
        } else {
            TopologyKind::Star
        };
        inner.coordinator.update_topology(kind).await;
    }

    /// One auto-scaling decision: scale up on sustained high utilization,
    /// scale down on sustained low utilization, respecting `min_agents` and
    /// `max_agents`. Scale-up spawns `ceil(min(0.25 * current, remaining
    /// capacity))` agents round-robin through the registered agent types;
    /// scale-down despawns `ceil(min(0.20 * current, current - min))` of the
    /// least-utilized agents. Intended to run on `scaling.cooldown_period_ms`
    /// cadence (the background monitor loop in `start` does this when
    /// `scaling.auto_scale` is set; it is also exposed directly for callers
    /// that want to drive it explicitly, e.g. from tests).
    #[instrument(skip(self))]
    pub async fn monitor_tick(&self) {
        Self::monitor_tick_inner(&self.inner).await;
    }

    async fn monitor_tick_inner(inner: &Arc<Inner>) {
        let agent_count = inner.state.read().await.agents.len();
        let mean = inner.metrics.mean_utilization().await;

        if mean > inner.config.scaling.scale_up_threshold && agent_count < inner.config.max_agents {
            let remaining = inner.config.max_agents - agent_count;
            let amount = ((0.25 * agent_count as f64).ceil() as usize).clamp(1, remaining);
            for _ in 0..amount {
                if let Err(err) = Self::spawn_agent_inner(inner, None).await {
                    warn!(%err, "auto-scale-up failed");
                    break;
                }
            }
            return;
        }

        if mean < inner.config.scaling.scale_down_threshold && agent_count > inner.config.min_agents {
            let above_min = agent_count - inner.config.min_agents;
            let amount = ((0.20 * agent_count as f64).ceil() as usize).clamp(1, above_min);
            let mut snapshots = inner.metrics.all_snapshots().await;
            snapshots.sort_by(|a, b| a.utilization.partial_cmp(&b.utilization).unwrap_or(std::cmp::Ordering::Equal));
            for snapshot in snapshots.into_iter().take(amount) {
                if let Err(err) = Self::despawn_agent_inner(inner, &snapshot.agent_id).await {
                    warn!(%err, "auto-scale-down failed");
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use std::collections::HashSet;

    struct NoopProcessor;

    #[async_trait]
    impl TaskProcessor for NoopProcessor {
        async fn process_task(&self, task: &Task) -> anyhow::Result<serde_json::Value> {
            Ok(task.payload.clone())
        }

        fn capabilities(&self) -> HashSet<String> {
            HashSet::from(["noop".to_string()])
        }
    }

    fn registry() -> AgentTypeRegistry {
        let mut registry = AgentTypeRegistry::new();
        registry.register("coordination", Arc::new(|| Arc::new(NoopProcessor) as Arc<dyn TaskProcessor>));
        registry
    }

    #[tokio::test]
    async fn start_spawns_min_agents_and_stop_tears_down() {
        let config = OrchestratorConfig {
            min_agents: 2,
            max_agents: 10,
            ..Default::default()
        };
        let store: Arc<dyn StoreAdapter> = Arc::new(crate::adapters::InMemoryStore::new());
        let orchestrator = Orchestrator::new(config, registry(), store);
        orchestrator.start().await.unwrap();
        // start() spawns max(minAgents, 8) initial agents.
        assert_eq!(orchestrator.get_state().await.agent_count, 8);
        orchestrator.stop().await;
        assert_eq!(orchestrator.get_state().await.agent_count, 0);
    }

    #[tokio::test]
    async fn spawn_respects_max_agents() {
        let config = OrchestratorConfig {
            min_agents: 0,
            max_agents: 1,
            ..Default::default()
        };
        let store: Arc<dyn StoreAdapter> = Arc::new(crate::adapters::InMemoryStore::new());
        let orchestrator = Orchestrator::new(config, registry(), store);
        orchestrator.spawn_agent(Some("coordination")).await.unwrap();
        let err = orchestrator.spawn_agent(Some("coordination")).await.unwrap_err();
        assert!(matches!(err, OrchestratorError::AgentCapacityExceeded { .. }));
    }

    #[tokio::test]
    async fn submit_task_round_trips_through_a_spawned_agent() {
        let config = OrchestratorConfig {
            min_agents: 1,
            max_agents: 8,
            agent_types: vec!["coordination".to_string()],
            ..Default::default()
        };
        let store: Arc<dyn StoreAdapter> = Arc::new(crate::adapters::InMemoryStore::new());
        let orchestrator = Orchestrator::new(config, registry(), store);
        orchestrator.start().await.unwrap();

        let task = crate::domain::models::Task::new(
            "noop",
            crate::domain::models::Priority::Normal,
            serde_json::json!(42),
        );
        let id = orchestrator.submit_task(task).await.unwrap();
        let result = orchestrator.get_task_result(id, Duration::from_secs(2)).await.unwrap();
        assert_eq!(result, serde_json::json!(42));
        orchestrator.stop().await;
    }

    #[tokio::test]
    async fn optimize_topology_is_noop_without_adaptive_topology() {
        let config = OrchestratorConfig {
            min_agents: 1,
            max_agents: 8,
            topology: TopologyKind::Star,
            ..Default::default()
        };
        let store: Arc<dyn StoreAdapter> = Arc::new(crate::adapters::InMemoryStore::new());
        let orchestrator = Orchestrator::new(config, registry(), store);
        orchestrator.start().await.unwrap();
        orchestrator.optimize_topology().await;
        orchestrator.stop().await;
    }

    #[tokio::test]
    async fn optimize_topology_picks_star_for_a_quiet_adaptive_swarm() {
        let config = OrchestratorConfig {
            min_agents: 1,
            max_agents: 8,
            topology: TopologyKind::Adaptive,
            ..Default::default()
        };
        let store: Arc<dyn StoreAdapter> = Arc::new(crate::adapters::InMemoryStore::new());
        let orchestrator = Orchestrator::new(config, registry(), store);
        orchestrator.start().await.unwrap();
        // No throughput, latency, or consensus activity: falls through to Star.
        orchestrator.optimize_topology().await;
        orchestrator.stop().await;
    }

    #[tokio::test]
    async fn failed_agent_is_despawned_and_replaced_to_hold_min_agents() {
        let config = OrchestratorConfig {
            min_agents: 8,
            max_agents: 10,
            agent_types: vec!["coordination".to_string()],
            ..Default::default()
        };
        let store: Arc<dyn StoreAdapter> = Arc::new(crate::adapters::InMemoryStore::new());
        let orchestrator = Orchestrator::new(config, registry(), store);
        orchestrator.start().await.unwrap();
        assert_eq!(orchestrator.get_state().await.agent_count, 8);

        let agent_id = orchestrator.inner.state.read().await.agents.keys().next().unwrap().clone();
        orchestrator
            .inner
            .events
            .publish(SwarmEvent::AgentFailed { agent_id, reason: "test".to_string() })
            .await;

        tokio::time::sleep(Duration::from_millis(100)).await;
        // Dropping to 7 (< minAgents 8) must trigger an immediate respawn.
        assert_eq!(orchestrator.get_state().await.agent_count, 8);
        orchestrator.stop().await;
    }
}
