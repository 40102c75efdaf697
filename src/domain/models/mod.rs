//! Domain models
//!
//! Pure domain entities with business logic and validation rules. These
//! models are framework-agnostic and contain no infrastructure concerns.

pub mod agent;
pub mod config;
pub mod message;
pub mod metrics;
pub mod primitives;
pub mod proposal;
pub mod task;
pub mod topology;

pub use agent::{AgentRegistration, AgentRole};
pub use config::{CoordinationConfig, OrchestratorConfig, ScalingConfig, SchedulerConfig};
pub use message::{CoordinationMessage, MessageKind, Recipient};
pub use metrics::{AgentStats, LatencyHistogram};
pub use primitives::{CounterRecord, LockRecord};
pub use proposal::{Proposal, ProposalStatus};
pub use task::{Priority, Task, TaskStatus};
pub use topology::{Topology, TopologyKind};
