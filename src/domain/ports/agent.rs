//! Agent capability port — the minimal task-execution contract an
//! implementer's domain-specific agent must satisfy. Everything about *how*
//! a task is interpreted lives behind this trait; the scheduler and
//! coordinator never see it.

use async_trait::async_trait;
use std::collections::HashSet;

use crate::domain::models::Task;

/// The one domain hook the core depends on. Implementations decode
/// `task.payload` according to `task.kind`; the core treats the payload as
/// opaque both on the way in and on the way out.
#[async_trait]
pub trait TaskProcessor: Send + Sync {
    /// Execute `task`, returning an opaque result or an error. A returned
    /// error is a per-task failure, handled by the agent runtime via
    /// `failTask`; it never terminates the agent's processing loop.
    async fn process_task(&self, task: &Task) -> anyhow::Result<serde_json::Value>;

    /// Declares what kinds of tasks this processor can run.
    fn capabilities(&self) -> HashSet<String>;
}
