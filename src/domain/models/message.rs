//! Coordination message domain model.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Recipient of a coordination message: a specific agent, or everyone.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum Recipient {
    Agent(String),
    All,
}

impl Recipient {
    pub fn matches(&self, agent_id: &str) -> bool {
        match self {
            Self::Agent(id) => id == agent_id,
            Self::All => true,
        }
    }
}

/// Message type tag. `Heartbeat` and `Election` drive the coordinator's own
/// protocol; `Consensus` carries proposal broadcasts; `Custom` is for
/// application-level messages between agents.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MessageKind {
    Heartbeat,
    Election,
    Consensus,
    Custom(String),
}

/// Immutable once stored. Eligible for GC when `now - timestamp > ttl`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CoordinationMessage {
    pub id: Uuid,
    pub from: String,
    pub to: Recipient,
    pub kind: MessageKind,
    pub payload: serde_json::Value,
    pub timestamp: DateTime<Utc>,
    pub ttl: std::time::Duration,
}

impl CoordinationMessage {
    pub fn new(from: impl Into<String>, to: Recipient, kind: MessageKind, payload: serde_json::Value) -> Self {
        Self {
            id: Uuid::new_v4(),
            from: from.into(),
            to,
            kind,
            payload,
            timestamp: Utc::now(),
            ttl: std::time::Duration::from_secs(60),
        }
    }

    pub fn with_ttl(mut self, ttl: std::time::Duration) -> Self {
        self.ttl = ttl;
        self
    }

    pub fn is_expired(&self) -> bool {
        let age = Utc::now().signed_duration_since(self.timestamp);
        let ttl = chrono::Duration::from_std(self.ttl).unwrap_or(chrono::Duration::zero());
        age > ttl
    }

    /// Whether this message is visible to `agent_id` under the
    /// `getMessages` predicate: recipient match AND (since absent OR
    /// `timestamp > since`).
    pub fn is_visible_to(&self, agent_id: &str, since: Option<DateTime<Utc>>) -> bool {
        self.to.matches(agent_id) && since.is_none_or(|s| self.timestamp > s)
    }
}
