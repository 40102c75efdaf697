//! Coordinator: agent registry, messaging, heartbeat-based failure
//! detection, leader election, consensus voting, and topology upkeep.
//!
//! Owns the proposal set and topology; each agent owns its own
//! registration entry while it is alive (the coordinator only marks an
//! entry dead after missing `3 * heartbeat_interval`).
//!
//! Leader election here is intentionally not full Raft: a randomized
//! timer fires, the timed-out agent becomes a candidate for the next
//! term, broadcasts an election message, and wins on a simple majority
//! of votes from currently registered agents. There is no log
//! replication and no durable term storage.

use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use rand::Rng;
use tokio::sync::{Mutex, RwLock};
use tokio::task::JoinHandle;
use tracing::{debug, info, instrument, warn};

use crate::domain::error::CoordinatorError;
use crate::domain::models::{
    AgentRegistration, CoordinationConfig, CoordinationMessage, MessageKind, Proposal,
    ProposalStatus, Recipient, Topology, TopologyKind,
};
use crate::domain::ports::StoreAdapter;
use crate::services::event_bus::{EventBus, SwarmEvent};

struct CoordinatorState {
    agents: HashMap<String, AgentRegistration>,
    messages: Vec<CoordinationMessage>,
    proposals: HashMap<uuid::Uuid, Proposal>,
    topology: Topology,
    term: u64,
    leader: Option<String>,
    /// Agents an `agentFailed` event has already been emitted for, so the
    /// heartbeat timer (which keeps scanning a missed agent every tick)
    /// notifies exactly once per miss. Cleared on re-registration.
    failed_notified: HashSet<String>,
    consensus_count: u64,
    last_consensus_time: Option<chrono::DateTime<chrono::Utc>>,
    /// Deadline the next election timer must pass before it may fire.
    /// Armed the first time a heartbeat tick finds no leader, cleared once
    /// one is elected.
    election_deadline: Option<Instant>,
}

impl CoordinatorState {
    fn new(topology_kind: TopologyKind) -> Self {
        Self {
            agents: HashMap::new(),
            messages: Vec::new(),
            proposals: HashMap::new(),
            topology: Topology {
                kind: topology_kind,
                neighbors: HashMap::new(),
            },
            term: 0,
            leader: None,
            failed_notified: HashSet::new(),
            consensus_count: 0,
            last_consensus_time: None,
            election_deadline: None,
        }
    }

    fn rebuild_topology(&mut self) {
        let ids: Vec<String> = self.agents.keys().cloned().collect();
        self.topology = Topology::rebuild(self.topology.kind, &ids, self.leader.as_deref());
    }
}

pub struct Coordinator {
    state: Arc<RwLock<CoordinatorState>>,
    config: CoordinationConfig,
    running: Arc<AtomicBool>,
    background: Mutex<Option<JoinHandle<()>>>,
    events: Option<Arc<EventBus>>,
    store: Arc<dyn StoreAdapter>,
}

impl Coordinator {
    pub fn new(config: CoordinationConfig, topology_kind: TopologyKind, store: Arc<dyn StoreAdapter>) -> Self {
        Self {
            state: Arc::new(RwLock::new(CoordinatorState::new(topology_kind))),
            config,
            running: Arc::new(AtomicBool::new(false)),
            background: Mutex::new(None),
            events: None,
            store,
        }
    }

    pub fn with_event_bus(mut self, bus: Arc<EventBus>) -> Self {
        self.events = Some(bus);
        self
    }

    #[instrument(skip(self))]
    pub async fn start(&self) {
        if self.running.swap(true, Ordering::SeqCst) {
            return;
        }
        let state = Arc::clone(&self.state);
        let running = Arc::clone(&self.running);
        let heartbeat_interval = Duration::from_millis(self.config.heartbeat_interval_ms);
        let election_timeout_ms = self.config.election_timeout_ms;
        let events = self.events.clone();

        let handle = tokio::spawn(async move {
            let mut interval = tokio::time::interval(heartbeat_interval);
            while running.load(Ordering::SeqCst) {
                interval.tick().await;
                Self::detect_failed_agents(&state, heartbeat_interval, &events).await;
                Self::maybe_trigger_election(&state, election_timeout_ms, &events).await;
            }
        });
        *self.background.lock().await = Some(handle);
        info!("coordinator started");
    }

    #[instrument(skip(self))]
    pub async fn stop(&self) {
        if !self.running.swap(false, Ordering::SeqCst) {
            return;
        }
        if let Some(handle) = self.background.lock().await.take() {
            handle.abort();
        }
        info!("coordinator stopped");
    }

    #[instrument(skip(self))]
    pub async fn register_agent(&self, registration: AgentRegistration) {
        let record = serde_json::json!({
            "agentId": registration.agent_id,
            "type": registration.kind,
            "role": registration.role,
            "capabilities": registration.capabilities,
            "registeredAt": registration.registered_at,
        });

        let mut state = self.state.write().await;
        let agent_id = registration.agent_id.clone();
        state.agents.insert(agent_id.clone(), registration);
        state.failed_notified.remove(&agent_id);
        state.rebuild_topology();
        drop(state);

        if let Err(err) = self.store.upsert(&format!("agent/{agent_id}"), record, None).await {
            warn!(agent_id, %err, "failed to persist agent registration");
        }
        if let Some(bus) = &self.events {
            bus.publish(SwarmEvent::AgentSpawned { agent_id }).await;
        }
    }

    #[instrument(skip(self))]
    pub async fn unregister_agent(&self, agent_id: &str) -> Result<(), CoordinatorError> {
        let mut state = self.state.write().await;
        state
            .agents
            .remove(agent_id)
            .ok_or_else(|| CoordinatorError::UnknownAgent(agent_id.to_string()))?;
        state.topology.remove(agent_id);
        if state.leader.as_deref() == Some(agent_id) {
            state.leader = None;
        }
        Ok(())
    }

    #[instrument(skip(self, payload))]
    pub async fn send_message(
        &self,
        from: impl Into<String>,
        to: impl Into<String>,
        kind: MessageKind,
        payload: serde_json::Value,
    ) {
        let to = to.into();
        let message = CoordinationMessage::new(from.into(), Recipient::Agent(to.clone()), kind, payload);
        self.persist_and_deliver(message, to).await;
    }

    #[instrument(skip(self, payload))]
    pub async fn broadcast(&self, from: impl Into<String>, kind: MessageKind, payload: serde_json::Value) {
        let message = CoordinationMessage::new(from.into(), Recipient::All, kind, payload);
        self.persist_and_deliver(message, "*".to_string()).await;
    }

    /// Persists a message under `message/<id>` and emits a local delivery
    /// event, common tail shared by `send_message` and `broadcast`.
    async fn persist_and_deliver(&self, message: CoordinationMessage, to: String) {
        let record = serde_json::json!({
            "id": message.id,
            "from": message.from,
            "to": to,
            "type": message.kind,
            "payload": message.payload,
            "timestamp": message.timestamp,
            "ttl": message.ttl.as_millis() as u64,
        });
        let message_id = message.id;
        let from = message.from.clone();

        self.state.write().await.messages.push(message);

        if let Err(err) = self.store.upsert(&format!("message/{message_id}"), record, None).await {
            warn!(%message_id, %err, "failed to persist coordination message");
        }
        if let Some(bus) = &self.events {
            bus.publish(SwarmEvent::MessageDelivered { message_id, from, to }).await;
        }
    }

    /// Messages visible to `agent_id` since `since`, excluding expired ones.
    pub async fn get_messages(
        &self,
        agent_id: &str,
        since: Option<chrono::DateTime<chrono::Utc>>,
    ) -> Vec<CoordinationMessage> {
        self.state
            .read()
            .await
            .messages
            .iter()
            .filter(|m| m.is_visible_to(agent_id, since) && !m.is_expired())
            .cloned()
            .collect()
    }

    #[instrument(skip(self, value))]
    pub async fn propose_consensus(
        &self,
        proposer: impl Into<String>,
        value: serde_json::Value,
    ) -> uuid::Uuid {
        let mut state = self.state.write().await;
        let term = state.term;
        let quorum = self.config.quorum_size;
        let proposal = Proposal::new(proposer, value, term, quorum);
        let id = proposal.id;
        state.proposals.insert(id, proposal);
        drop(state);
        if let Some(bus) = &self.events {
            bus.publish(SwarmEvent::ConsensusProposed { proposal_id: id, term }).await;
        }
        id
    }

    #[instrument(skip(self))]
    pub async fn vote(
        &self,
        proposal_id: uuid::Uuid,
        agent_id: impl Into<String>,
        approve: bool,
    ) -> Result<ProposalStatus, CoordinatorError> {
        let agent_id = agent_id.into();
        let status = {
            let mut state = self.state.write().await;
            let active_count = state.agents.len();
            let proposal = state
                .proposals
                .get_mut(&proposal_id)
                .ok_or(CoordinatorError::UnknownProposal(proposal_id))?;
            if proposal.status.is_terminal() {
                return Err(CoordinatorError::TerminalProposal(proposal_id));
            }
            let status = proposal.record_vote(agent_id.clone(), approve, active_count);
            if status == ProposalStatus::Accepted {
                state.consensus_count += 1;
                state.last_consensus_time = Some(chrono::Utc::now());
            }
            status
        };
        if let Some(bus) = &self.events {
            bus.publish(SwarmEvent::ConsensusVoteRecorded { proposal_id, agent_id, approve }).await;
            match status {
                ProposalStatus::Accepted => bus.publish(SwarmEvent::ConsensusReached { proposal_id }).await,
                ProposalStatus::Rejected => bus.publish(SwarmEvent::ConsensusRejected { proposal_id }).await,
                ProposalStatus::Pending => {}
            }
        }
        Ok(status)
    }

    #[instrument(skip(self))]
    pub async fn update_topology(&self, kind: TopologyKind) {
        let mut state = self.state.write().await;
        state.topology.kind = kind;
        state.rebuild_topology();
        let agent_count = state.agents.len();
        drop(state);
        if let Some(bus) = &self.events {
            bus.publish(SwarmEvent::TopologyUpdated { agent_count }).await;
        }
    }

    pub async fn get_connections(&self, agent_id: &str) -> HashSet<String> {
        self.state.read().await.topology.connections(agent_id)
    }

    pub async fn is_leader(&self, agent_id: &str) -> bool {
        self.state.read().await.leader.as_deref() == Some(agent_id)
    }

    pub async fn get_leader(&self) -> Option<String> {
        self.state.read().await.leader.clone()
    }

    /// Fraction of terminal proposals that reached `Accepted`.
    pub async fn get_consensus_rate(&self) -> f64 {
        let state = self.state.read().await;
        let terminal: Vec<&Proposal> = state.proposals.values().filter(|p| p.status.is_terminal()).collect();
        if terminal.is_empty() {
            return 1.0;
        }
        let accepted = terminal.iter().filter(|p| p.status == ProposalStatus::Accepted).count();
        accepted as f64 / terminal.len() as f64
    }

    /// Running count of accepted proposals and the timestamp of the most
    /// recent acceptance, for callers that want a consensus *rate* (e.g.
    /// the orchestrator's adaptive topology heuristic) rather than the
    /// lifetime accepted/terminal fraction `get_consensus_rate` returns.
    pub async fn consensus_stats(&self) -> (u64, Option<chrono::DateTime<chrono::Utc>>) {
        let state = self.state.read().await;
        (state.consensus_count, state.last_consensus_time)
    }

    #[instrument(skip(self))]
    pub async fn heartbeat(&self, agent_id: &str) -> Result<(), CoordinatorError> {
        let mut state = self.state.write().await;
        let registration = state
            .agents
            .get_mut(agent_id)
            .ok_or_else(|| CoordinatorError::UnknownAgent(agent_id.to_string()))?;
        registration.last_heartbeat = chrono::Utc::now();
        state.failed_notified.remove(agent_id);
        Ok(())
    }

    /// Heartbeat-miss detection is advisory only: a missed agent is neither
    /// dropped from the registry nor stripped from the topology here. It
    /// only emits `AgentFailed`, at most once per miss, so the
    /// orchestrator's recovery path can call `unregister_agent` explicitly
    /// once it decides to despawn.
    async fn detect_failed_agents(
        state: &Arc<RwLock<CoordinatorState>>,
        heartbeat_interval: Duration,
        events: &Option<Arc<EventBus>>,
    ) {
        let newly_failed: Vec<String> = {
            let mut state = state.write().await;
            let dead: Vec<String> = state
                .agents
                .iter()
                .filter(|(id, reg)| {
                    reg.has_missed_heartbeat(heartbeat_interval) && !state.failed_notified.contains(*id)
                })
                .map(|(id, _)| id.clone())
                .collect();
            for agent_id in &dead {
                state.failed_notified.insert(agent_id.clone());
            }
            dead
        };
        for agent_id in newly_failed {
            warn!(agent_id, "agent missed heartbeat window");
            if let Some(bus) = events {
                bus.publish(SwarmEvent::AgentFailed {
                    agent_id,
                    reason: format!("missed heartbeat for more than {heartbeat_interval:?}"),
                })
                .await;
            }
        }
    }

    /// Randomized leader-election timer: arms a deadline of
    /// `electionTimeout + uniform(0, 1000ms)` the first tick it finds no
    /// leader, then only elects once a later tick observes that deadline
    /// has passed. This jitters elections across coordinators that lost
    /// their leader at the same moment, instead of all firing on the very
    /// next heartbeat tick. Ties between simultaneous candidates are broken
    /// by lexicographically lowest agent id.
    async fn maybe_trigger_election(
        state: &Arc<RwLock<CoordinatorState>>,
        election_timeout_ms: u64,
        events: &Option<Arc<EventBus>>,
    ) {
        let elected = {
            let mut state = state.write().await;
            if state.leader.is_some() || state.agents.is_empty() {
                state.election_deadline = None;
                return;
            }

            let now = Instant::now();
            let deadline = match state.election_deadline {
                Some(deadline) => deadline,
                None => {
                    let jitter_ms: u64 = rand::thread_rng().gen_range(0..1000);
                    let deadline = now + Duration::from_millis(election_timeout_ms + jitter_ms);
                    state.election_deadline = Some(deadline);
                    deadline
                }
            };
            if now < deadline {
                return;
            }
            state.election_deadline = None;

            let mut candidate_ids: Vec<String> = state.agents.keys().cloned().collect();
            candidate_ids.sort();
            let Some(candidate) = candidate_ids.into_iter().next() else {
                return;
            };

            state.term += 1;
            let quorum = state.agents.len() / 2 + 1;
            let votes = state.agents.len();
            if votes >= quorum {
                state.leader = Some(candidate.clone());
                for reg in state.agents.values_mut() {
                    reg.is_leader = reg.agent_id == candidate;
                }
                debug!(leader = candidate, term = state.term, "leader elected");
                Some((candidate, state.term))
            } else {
                None
            }
        };
        if let (Some((agent_id, term)), Some(bus)) = (elected, events) {
            bus.publish(SwarmEvent::LeaderElected { agent_id, term }).await;
        }
    }
}
