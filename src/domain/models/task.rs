//! Task domain model.
//!
//! A task is an opaque unit of work dispatched by the scheduler to agents.
//! The scheduler never inspects `payload`; it is a correctness requirement
//! that only the agent decoding `task.kind` may interpret it.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use uuid::Uuid;

/// Priority band, strictly ordered `Low < Normal < High < Urgent < Critical`.
///
/// Declaration order doubles as `Ord`: `dequeue` scans from `Critical` down
/// to `Low`; `steal` scans the reverse direction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Priority {
    Low,
    Normal,
    High,
    Urgent,
    Critical,
}

impl Default for Priority {
    fn default() -> Self {
        Self::Normal
    }
}

impl Priority {
    /// All bands, highest first — the order `dequeue` scans.
    pub const DESCENDING: [Priority; 5] = [
        Priority::Critical,
        Priority::Urgent,
        Priority::High,
        Priority::Normal,
        Priority::Low,
    ];

    /// All bands, lowest first — the order `steal` scans.
    pub const ASCENDING: [Priority; 5] = [
        Priority::Low,
        Priority::Normal,
        Priority::High,
        Priority::Urgent,
        Priority::Critical,
    ];
}

/// Status of a task in the scheduler's state machine.
///
/// Monotone along `pending -> assigned -> in_progress -> {completed, failed,
/// cancelled}`, with one permitted back-edge (`in_progress`/`assigned` ->
/// `pending`) during retry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskStatus {
    Pending,
    Assigned,
    InProgress,
    Completed,
    Failed,
    Cancelled,
}

impl TaskStatus {
    /// Whether this is a terminal state — no further transitions are possible.
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Completed | Self::Failed | Self::Cancelled)
    }
}

/// A discrete unit of work dispatched by the scheduler.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Task {
    /// Unique identifier.
    pub id: Uuid,
    /// Type tag; agents use this to decode `payload`. The scheduler never
    /// inspects it beyond routing by capability requirement.
    pub kind: String,
    /// Priority band.
    pub priority: Priority,
    /// Opaque payload. Never interpreted by the scheduler.
    pub payload: serde_json::Value,
    /// Capabilities an agent must have (as a superset) to run this task.
    pub required_capabilities: HashSet<String>,
    /// Task ids this task depends on. Not visible to any dequeue until all
    /// dependencies are terminal-completed.
    pub dependencies: HashSet<Uuid>,
    /// Advisory deadline for `waitForTask`; does not cancel the worker.
    pub timeout: Option<std::time::Duration>,
    /// Current status.
    pub status: TaskStatus,
    /// Agent id this task is currently assigned to, if any.
    pub assigned_to: Option<String>,
    /// Number of retry attempts taken so far.
    pub retries: u32,
    /// Maximum number of retries before the task is terminal-failed. `None`
    /// until the scheduler resolves it from its configured default at
    /// submission time.
    pub max_retries: Option<u32>,
    pub created_at: DateTime<Utc>,
    pub started_at: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,
    /// Value passed to `completeTask`. Populated only once `status ==
    /// Completed`; distinct from `payload`, which is the caller's input.
    pub result: Option<serde_json::Value>,
    /// Message passed to the terminal `failTask` call. Populated only once
    /// `status == Failed`.
    pub error: Option<String>,
}

impl Task {
    /// Build a new pending task. `max_retries` and `timeout` default to the
    /// scheduler's configured defaults when `None` is passed at submission.
    pub fn new(kind: impl Into<String>, priority: Priority, payload: serde_json::Value) -> Self {
        Self {
            id: Uuid::new_v4(),
            kind: kind.into(),
            priority,
            payload,
            required_capabilities: HashSet::new(),
            dependencies: HashSet::new(),
            timeout: None,
            status: TaskStatus::Pending,
            assigned_to: None,
            retries: 0,
            max_retries: None,
            created_at: Utc::now(),
            started_at: None,
            completed_at: None,
            result: None,
            error: None,
        }
    }

    pub fn with_capabilities(mut self, caps: impl IntoIterator<Item = String>) -> Self {
        self.required_capabilities = caps.into_iter().collect();
        self
    }

    pub fn with_dependencies(mut self, deps: impl IntoIterator<Item = Uuid>) -> Self {
        self.dependencies = deps.into_iter().collect();
        self
    }

    pub fn with_max_retries(mut self, max_retries: u32) -> Self {
        self.max_retries = Some(max_retries);
        self
    }

    pub fn with_timeout(mut self, timeout: std::time::Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    /// Whether `capabilities` is a superset of this task's requirements.
    pub fn is_runnable_by(&self, capabilities: &HashSet<String>) -> bool {
        self.required_capabilities.is_subset(capabilities)
    }

    pub fn can_retry(&self) -> bool {
        self.retries < self.max_retries.unwrap_or(0)
    }
}
