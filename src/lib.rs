//! Swarmforge — a distributed agent swarm coordination runtime.
//!
//! Composes a work-stealing [`scheduler`](services::scheduler), a
//! heartbeat/consensus [`coordinator`](services::coordinator), and an
//! [`orchestrator`](services::orchestrator) that spawns and scales agent
//! runtimes against a pluggable [`StoreAdapter`](domain::ports::StoreAdapter).

pub mod adapters;
pub mod domain;
pub mod infrastructure;
pub mod services;

pub use domain::error::{CoordinatorError, OrchestratorError, PrimitiveError, SchedulerError, StoreError};
pub use domain::models::{OrchestratorConfig, Priority, Task, TaskStatus};
pub use domain::ports::{StoreAdapter, TaskProcessor};
pub use services::{AgentTypeRegistry, Coordinator, EventBus, Orchestrator, Scheduler};
