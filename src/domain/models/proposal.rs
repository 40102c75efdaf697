//! Consensus proposal domain model.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use uuid::Uuid;

/// Status of a proposal. Monotone along `pending -> {accepted, rejected}`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProposalStatus {
    Pending,
    Accepted,
    Rejected,
}

impl ProposalStatus {
    pub fn is_terminal(&self) -> bool {
        !matches!(self, Self::Pending)
    }
}

/// A quorum-voted proposal. Votes are last-write-wins per agent (Open
/// Question 2 in the design notes): a second vote from the same agent
/// overwrites its first, rather than being rejected.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Proposal {
    pub id: Uuid,
    pub proposer: String,
    pub value: serde_json::Value,
    pub term: u64,
    pub votes: HashMap<String, bool>,
    pub quorum: usize,
    pub status: ProposalStatus,
}

impl Proposal {
    pub fn new(proposer: impl Into<String>, value: serde_json::Value, term: u64, quorum: usize) -> Self {
        Self {
            id: Uuid::new_v4(),
            proposer: proposer.into(),
            value,
            term,
            votes: HashMap::new(),
            quorum,
            status: ProposalStatus::Pending,
        }
    }

    pub fn approvals(&self) -> usize {
        self.votes.values().filter(|&&v| v).count()
    }

    pub fn rejections(&self) -> usize {
        self.votes.values().filter(|&&v| !v).count()
    }

    /// Record a vote (last-write-wins) and recompute status given the
    /// current count of active agents. Returns the status after recording.
    pub fn record_vote(&mut self, agent_id: impl Into<String>, approve: bool, active_agents: usize) -> ProposalStatus {
        if self.status.is_terminal() {
            return self.status;
        }
        self.votes.insert(agent_id.into(), approve);
        if self.approvals() >= self.quorum {
            self.status = ProposalStatus::Accepted;
        } else if self.rejections() > active_agents.saturating_sub(self.quorum) {
            self.status = ProposalStatus::Rejected;
        }
        self.status
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn accepts_once_quorum_reached() {
        let mut p = Proposal::new("a1", serde_json::json!("v"), 1, 3);
        assert_eq!(p.record_vote("a1", true, 4), ProposalStatus::Pending);
        assert_eq!(p.record_vote("a2", true, 4), ProposalStatus::Pending);
        assert_eq!(p.record_vote("a3", true, 4), ProposalStatus::Accepted);
    }

    #[test]
    fn rejects_when_rejection_count_makes_quorum_unreachable() {
        // quorum 3, 4 active agents: rejections > 4 - 3 = 1 rejects.
        let mut p = Proposal::new("a1", serde_json::json!("v"), 1, 3);
        assert_eq!(p.record_vote("a1", false, 4), ProposalStatus::Pending);
        assert_eq!(p.record_vote("a2", false, 4), ProposalStatus::Rejected);
    }

    #[test]
    fn duplicate_vote_overwrites_last_write_wins() {
        let mut p = Proposal::new("a1", serde_json::json!("v"), 1, 3);
        p.record_vote("a1", true, 4);
        assert_eq!(p.approvals(), 1);
        p.record_vote("a1", false, 4);
        assert_eq!(p.approvals(), 0);
        assert_eq!(p.rejections(), 1);
    }

    #[test]
    fn terminal_proposal_ignores_further_votes() {
        let mut p = Proposal::new("a1", serde_json::json!("v"), 1, 2);
        p.record_vote("a1", true, 3);
        p.record_vote("a2", true, 3);
        assert_eq!(p.status, ProposalStatus::Accepted);
        let before = p.votes.clone();
        p.record_vote("a3", false, 3);
        assert_eq!(p.votes, before, "terminal proposal must not record further votes");
    }
}
