//! Broadcast-based event bus for swarm coordination events.
//!
//! Every event carries a bus-assigned, monotonically increasing sequence
//! number so that a late subscriber can tell it missed events (a gap in
//! the sequence) even though `tokio::sync::broadcast` itself gives no
//! such guarantee once its ring buffer overflows.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicU64, Ordering};
use uuid::Uuid;

use tokio::sync::broadcast;

/// Monotonically increasing sequence number assigned by the bus.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct SequenceNumber(pub u64);

/// Swarm coordination events, per the external interfaces' emitted-events list.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", content = "data")]
pub enum SwarmEvent {
    TaskSubmitted { task_id: Uuid },
    TaskAssigned { task_id: Uuid, agent_id: String },
    TaskCompleted { task_id: Uuid },
    TaskFailed { task_id: Uuid, retries: u32 },
    TaskRetrying { task_id: Uuid, attempt: u32 },
    TaskCancelled { task_id: Uuid },
    TaskStolen { task_id: Uuid, from: String, to: String },

    ConsensusProposed { proposal_id: Uuid, term: u64 },
    ConsensusVoteRecorded { proposal_id: Uuid, agent_id: String, approve: bool },
    ConsensusReached { proposal_id: Uuid },
    ConsensusRejected { proposal_id: Uuid },
    LeaderElected { agent_id: String, term: u64 },

    TopologyUpdated { agent_count: usize },

    MetricsSnapshot { active_agents: usize, pending_tasks: usize },
    BottleneckDetected { agent_id: String, utilization: f64 },

    AgentSpawned { agent_id: String },
    AgentDespawned { agent_id: String },
    AgentFailed { agent_id: String, reason: String },

    MessageDelivered { message_id: Uuid, from: String, to: String },
}

/// Envelope wrapping a [`SwarmEvent`] with bus-assigned metadata.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UnifiedEvent {
    pub id: Uuid,
    pub sequence: SequenceNumber,
    pub timestamp: DateTime<Utc>,
    pub payload: SwarmEvent,
}

/// Central event bus broadcasting [`UnifiedEvent`]s to any number of subscribers.
pub struct EventBus {
    sender: broadcast::Sender<UnifiedEvent>,
    sequence: AtomicU64,
}

impl EventBus {
    pub fn new(channel_capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(channel_capacity);
        Self {
            sender,
            sequence: AtomicU64::new(0),
        }
    }

    pub async fn publish(&self, payload: SwarmEvent) {
        let seq = self.sequence.fetch_add(1, Ordering::SeqCst);
        let event = UnifiedEvent {
            id: Uuid::new_v4(),
            sequence: SequenceNumber(seq),
            timestamp: Utc::now(),
            payload,
        };
        // Ignore send errors: no subscribers is a valid, common state.
        let _ = self.sender.send(event);
    }

    pub fn subscribe(&self) -> broadcast::Receiver<UnifiedEvent> {
        self.sender.subscribe()
    }

    pub fn current_sequence(&self) -> SequenceNumber {
        SequenceNumber(self.sequence.load(Ordering::SeqCst))
    }

    pub fn subscriber_count(&self) -> usize {
        self.sender.receiver_count()
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new(1024)
    }
}
