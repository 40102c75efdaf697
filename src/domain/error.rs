//! Domain error types for the swarm coordination runtime.
//!
//! This module defines all error types using thiserror for structured error handling.
//! Error kinds follow the propagation policy: per-task errors are localized to the
//! task, per-agent failures are localized to that agent, and scheduler/coordinator
//! startup failures abort orchestrator start.

use thiserror::Error;
use uuid::Uuid;

/// Errors raised by the work-stealing scheduler.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum SchedulerError {
    /// `submitTask` beyond `maxQueueSize`.
    #[error("queue capacity exceeded: {active}/{max} active tasks")]
    CapacityExceeded { active: usize, max: usize },

    /// Lookup miss on the task map.
    #[error("unknown task: {0}")]
    UnknownTask(Uuid),

    /// Lookup miss on the per-agent queue map.
    #[error("unknown agent: {0}")]
    UnknownAgent(String),

    /// `waitForTask` deadline elapsed before the task reached a terminal state.
    #[error("wait for task {0} timed out")]
    WaitTimeout(Uuid),

    /// The task's own `processTask` invocation raised, and retries are exhausted.
    #[error("task {id} failed permanently: {message}")]
    TaskFailed { id: Uuid, message: String },

    /// The scheduler was stopped while the operation was in flight.
    #[error("scheduler is stopped")]
    Stopped,

    /// `submitTask` would close a dependency cycle.
    #[error("task {0} would introduce a circular dependency")]
    CircularDependency(Uuid),
}

/// Errors raised by the coordinator.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CoordinatorError {
    /// `vote` on a proposal that already reached a terminal state.
    #[error("proposal {0} is already terminal")]
    TerminalProposal(Uuid),

    /// Lookup miss on the proposal map.
    #[error("unknown proposal: {0}")]
    UnknownProposal(Uuid),

    /// Lookup miss on the agent registry.
    #[error("unknown agent: {0}")]
    UnknownAgent(String),

    /// The coordinator was stopped while the operation was in flight.
    #[error("coordinator is stopped")]
    Stopped,
}

/// Errors raised by the distributed primitives (counter/lock) layered on the store.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum PrimitiveError {
    /// Lock is currently held by someone else and has not expired.
    #[error("lock {0} is held by another owner")]
    LockHeld(String),

    /// Underlying store operation failed.
    #[error("store error: {0}")]
    Store(String),
}

/// Errors raised by the orchestrator's lifecycle operations.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum OrchestratorError {
    /// `spawnAgent` beyond `maxAgents`.
    #[error("agent capacity exceeded: {active}/{max} agents")]
    AgentCapacityExceeded { active: usize, max: usize },

    /// Lookup miss on the orchestrator's agent map.
    #[error("unknown agent: {0}")]
    UnknownAgent(String),

    /// A dependent component (scheduler or coordinator) failed to start.
    #[error("failed to start {component}: {reason}")]
    StartupFailed { component: String, reason: String },
}

/// Store adapter errors, surfaced by the `StoreAdapter` port.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum StoreError {
    #[error("key not found: {0}")]
    NotFound(String),

    #[error("serialization error: {0}")]
    Serialization(String),

    #[error("backend error: {0}")]
    Backend(String),
}

impl SchedulerError {
    /// Whether the failure is a permanent, non-retryable task outcome.
    pub const fn is_permanent(&self) -> bool {
        matches!(self, Self::TaskFailed { .. })
    }
}
