//! Work-stealing scheduler.
//!
//! Owns `Task.status`, `Task.assigned_to`, `Task.started_at` and
//! `Task.completed_at` for every task it has been given — no other
//! component may mutate those fields once a task has been submitted.
//!
//! Tasks land in a single pending [`PriorityQueue`]. A background
//! `assignTasks` pass drains eligible tasks out of it into per-agent
//! queues; a second background pass rebalances those per-agent queues by
//! stealing from the busiest agents on behalf of the idlest ones. Agents
//! themselves only ever pull from their own queue via `request_task`.

use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{oneshot, Mutex, RwLock};
use tokio::task::JoinHandle;
use tracing::{debug, info, instrument, warn};
use uuid::Uuid;

use crate::domain::error::SchedulerError;
use crate::domain::models::{Priority, SchedulerConfig, Task, TaskStatus};
use crate::services::dependency_resolver::DependencyResolver;
use crate::services::priority_queue::PriorityQueue;

/// Maximum number of ineligible tasks `assign_tasks` will skip over (and
/// put back) while looking for one the current agent can run, before
/// giving up on that agent for this pass.
const ASSIGN_SCAN_CAP: usize = 10;

struct AgentHandle {
    capabilities: HashSet<String>,
    queue: PriorityQueue<Uuid>,
}

type Waiters = HashMap<Uuid, Vec<oneshot::Sender<Result<serde_json::Value, SchedulerError>>>>;

struct SchedulerState {
    tasks: HashMap<Uuid, Task>,
    pending: PriorityQueue<Uuid>,
    agents: HashMap<String, AgentHandle>,
    /// Non-terminal tasks' dependency sets, kept for cycle detection.
    dependency_index: HashMap<Uuid, HashSet<Uuid>>,
}

impl SchedulerState {
    fn new() -> Self {
        Self {
            tasks: HashMap::new(),
            pending: PriorityQueue::new(),
            agents: HashMap::new(),
            dependency_index: HashMap::new(),
        }
    }

    fn is_eligible(&self, task: &Task, capabilities: &HashSet<String>) -> bool {
        if !task.is_runnable_by(capabilities) {
            return false;
        }
        task.dependencies.iter().all(|dep| {
            self.tasks
                .get(dep)
                .is_some_and(|t| t.status == TaskStatus::Completed)
        })
    }
}

pub struct Scheduler {
    state: Arc<RwLock<SchedulerState>>,
    waiters: Arc<Mutex<Waiters>>,
    config: SchedulerConfig,
    running: Arc<AtomicBool>,
    background: Mutex<Option<JoinHandle<()>>>,
}

impl Scheduler {
    pub fn new(config: SchedulerConfig) -> Self {
        Self {
            state: Arc::new(RwLock::new(SchedulerState::new())),
            waiters: Arc::new(Mutex::new(HashMap::new())),
            config,
            running: Arc::new(AtomicBool::new(false)),
            background: Mutex::new(None),
        }
    }

    #[instrument(skip(self))]
    pub async fn start(&self) {
        if self.running.swap(true, Ordering::SeqCst) {
            return;
        }
        if !self.config.work_stealing_enabled {
            info!("scheduler starting with work stealing disabled");
        }
        let state = Arc::clone(&self.state);
        let waiters = Arc::clone(&self.waiters);
        let running = Arc::clone(&self.running);
        let resolver = DependencyResolver::new();
        let cooldown = Duration::from_millis(self.config.steal_cooldown_ms);
        let steal_threshold = self.config.steal_threshold;
        let work_stealing_enabled = self.config.work_stealing_enabled;

        let handle = tokio::spawn(async move {
            let mut interval = tokio::time::interval(cooldown);
            while running.load(Ordering::SeqCst) {
                interval.tick().await;
                Self::assign_tasks_pass(&state).await;
                if work_stealing_enabled {
                    Self::steal_pass(&state, steal_threshold).await;
                }
            }
            let _ = &resolver;
            let _ = &waiters;
        });
        *self.background.lock().await = Some(handle);
        info!("scheduler started");
    }

    #[instrument(skip(self))]
    pub async fn stop(&self) {
        if !self.running.swap(false, Ordering::SeqCst) {
            return;
        }
        if let Some(handle) = self.background.lock().await.take() {
            handle.abort();
        }
        {
            let mut state = self.state.write().await;
            let non_terminal: Vec<Uuid> = state
                .tasks
                .values()
                .filter(|t| !t.status.is_terminal())
                .map(|t| t.id)
                .collect();
            for id in non_terminal {
                if let Some(task) = state.tasks.get_mut(&id) {
                    task.status = TaskStatus::Cancelled;
                    task.completed_at = Some(chrono::Utc::now());
                    task.assigned_to = None;
                }
                state.dependency_index.remove(&id);
            }
            state.pending.clear();
            for handle in state.agents.values_mut() {
                handle.queue.clear();
            }
        }
        let mut waiters = self.waiters.lock().await;
        for (_, senders) in waiters.drain() {
            for sender in senders {
                let _ = sender.send(Err(SchedulerError::Stopped));
            }
        }
        info!("scheduler stopped");
    }

    #[instrument(skip(self, capabilities))]
    pub async fn register_agent(&self, agent_id: impl Into<String>, capabilities: HashSet<String>) {
        let agent_id = agent_id.into();
        let mut state = self.state.write().await;
        state.agents.insert(
            agent_id.clone(),
            AgentHandle {
                capabilities,
                queue: PriorityQueue::new(),
            },
        );
        debug!(agent_id, "agent registered with scheduler");
    }

    /// Returns this agent's still-queued (not yet started) task ids to the
    /// pending pool so another agent can pick them up.
    #[instrument(skip(self))]
    pub async fn unregister_agent(&self, agent_id: &str) -> Result<(), SchedulerError> {
        let mut state = self.state.write().await;
        let Some(mut handle) = state.agents.remove(agent_id) else {
            return Err(SchedulerError::UnknownAgent(agent_id.to_string()));
        };
        while let Some(task_id) = handle.queue.dequeue() {
            if let Some(task) = state.tasks.get_mut(&task_id) {
                task.status = TaskStatus::Pending;
                task.assigned_to = None;
                state.pending.enqueue(task.priority, task_id);
            }
        }
        debug!(agent_id, "agent unregistered from scheduler");
        Ok(())
    }

    #[instrument(skip(self, task), fields(task_id = %task.id))]
    pub async fn submit_task(&self, task: Task) -> Result<Uuid, SchedulerError> {
        let mut state = self.state.write().await;
        if state.tasks.len() >= self.config.max_queue_size {
            return Err(SchedulerError::CapacityExceeded {
                active: state.tasks.len(),
                max: self.config.max_queue_size,
            });
        }

        let resolver = DependencyResolver::new();
        resolver.check_acyclic(task.id, &task.dependencies, &state.dependency_index)?;

        let mut task = task;
        if task.max_retries.is_none() {
            task.max_retries = Some(self.config.max_retries);
        }
        if task.timeout.is_none() {
            task.timeout = Some(Duration::from_millis(self.config.task_timeout_ms));
        }

        let id = task.id;
        let priority = task.priority;
        state.dependency_index.insert(id, task.dependencies.clone());
        state.tasks.insert(id, task);
        state.pending.enqueue(priority, id);
        info!(task_id = %id, "task submitted");
        Ok(id)
    }

    /// Pull the next eligible task from this agent's own queue.
    #[instrument(skip(self))]
    pub async fn request_task(&self, agent_id: &str) -> Result<Option<Task>, SchedulerError> {
        if !self.running.load(Ordering::SeqCst) {
            return Err(SchedulerError::Stopped);
        }
        let mut state = self.state.write().await;
        let Some(task_id) = state
            .agents
            .get_mut(agent_id)
            .ok_or_else(|| SchedulerError::UnknownAgent(agent_id.to_string()))?
            .queue
            .dequeue()
        else {
            return Ok(None);
        };
        let task = state
            .tasks
            .get_mut(&task_id)
            .ok_or(SchedulerError::UnknownTask(task_id))?;
        task.status = TaskStatus::InProgress;
        task.started_at = Some(chrono::Utc::now());
        Ok(Some(task.clone()))
    }

    #[instrument(skip(self, result))]
    pub async fn complete_task(
        &self,
        agent_id: &str,
        task_id: Uuid,
        result: serde_json::Value,
    ) -> Result<(), SchedulerError> {
        {
            let mut state = self.state.write().await;
            let task = state
                .tasks
                .get_mut(&task_id)
                .ok_or(SchedulerError::UnknownTask(task_id))?;
            if task.assigned_to.as_deref() != Some(agent_id) {
                return Err(SchedulerError::UnknownTask(task_id));
            }
            task.status = TaskStatus::Completed;
            task.completed_at = Some(chrono::Utc::now());
            task.result = Some(result.clone());
            state.dependency_index.remove(&task_id);
        }
        self.notify_waiters(task_id, Ok(result)).await;
        info!(task_id = %task_id, agent_id, "task completed");
        Ok(())
    }

    #[instrument(skip(self))]
    pub async fn fail_task(
        &self,
        agent_id: &str,
        task_id: Uuid,
        message: String,
    ) -> Result<(), SchedulerError> {
        let terminal_err = {
            let mut state = self.state.write().await;
            let task = state
                .tasks
                .get_mut(&task_id)
                .ok_or(SchedulerError::UnknownTask(task_id))?;
            if task.assigned_to.as_deref() != Some(agent_id) {
                return Err(SchedulerError::UnknownTask(task_id));
            }
            if task.can_retry() {
                task.retries += 1;
                task.status = TaskStatus::Pending;
                task.assigned_to = None;
                let priority = task.priority;
                state.pending.enqueue(priority, task_id);
                warn!(task_id = %task_id, retries = task.retries, "task failed, retrying");
                None
            } else {
                task.status = TaskStatus::Failed;
                task.completed_at = Some(chrono::Utc::now());
                task.error = Some(message.clone());
                state.dependency_index.remove(&task_id);
                Some(SchedulerError::TaskFailed {
                    id: task_id,
                    message: message.clone(),
                })
            }
        };
        if let Some(err) = terminal_err {
            self.notify_waiters(task_id, Err(err)).await;
        }
        Ok(())
    }

    #[instrument(skip(self))]
    pub async fn wait_for_task(
        &self,
        task_id: Uuid,
        timeout: Duration,
    ) -> Result<serde_json::Value, SchedulerError> {
        if let Some(outcome) = self.terminal_outcome(task_id).await? {
            return outcome;
        }
        let (tx, rx) = oneshot::channel();
        self.waiters.lock().await.entry(task_id).or_default().push(tx);
        match tokio::time::timeout(timeout, rx).await {
            Ok(Ok(result)) => result,
            Ok(Err(_)) => Err(SchedulerError::WaitTimeout(task_id)),
            Err(_) => Err(SchedulerError::WaitTimeout(task_id)),
        }
    }

    async fn terminal_outcome(
        &self,
        task_id: Uuid,
    ) -> Result<Option<Result<serde_json::Value, SchedulerError>>, SchedulerError> {
        let state = self.state.read().await;
        let task = state.tasks.get(&task_id).ok_or(SchedulerError::UnknownTask(task_id))?;
        Ok(match task.status {
            TaskStatus::Completed => Some(Ok(task.result.clone().unwrap_or(serde_json::Value::Null))),
            TaskStatus::Failed => Some(Err(SchedulerError::TaskFailed {
                id: task_id,
                message: task.error.clone().unwrap_or_else(|| "task failed permanently".to_string()),
            })),
            TaskStatus::Cancelled => Some(Err(SchedulerError::TaskFailed {
                id: task_id,
                message: "task was cancelled".to_string(),
            })),
            _ => None,
        })
    }

    async fn notify_waiters(&self, task_id: Uuid, outcome: Result<serde_json::Value, SchedulerError>) {
        if let Some(senders) = self.waiters.lock().await.remove(&task_id) {
            for sender in senders {
                let _ = sender.send(outcome.clone());
            }
        }
    }

    /// Drains eligible pending tasks into per-agent queues, round-robin
    /// across registered agents. For each agent, pops up to
    /// [`ASSIGN_SCAN_CAP`] pending tasks looking for one it is eligible to
    /// run; ineligible ones are set aside and put back once the scan ends.
    async fn assign_tasks_pass(state: &Arc<RwLock<SchedulerState>>) {
        let mut state = state.write().await;
        let agent_ids: Vec<String> = state.agents.keys().cloned().collect();
        for agent_id in agent_ids {
            let mut skipped = Vec::new();
            let mut assigned = false;
            for _ in 0..ASSIGN_SCAN_CAP {
                let Some(task_id) = state.pending.dequeue() else {
                    break;
                };
                let capabilities = state.agents[&agent_id].capabilities.clone();
                let eligible = state
                    .tasks
                    .get(&task_id)
                    .is_some_and(|t| state.is_eligible(t, &capabilities));
                if eligible {
                    if let Some(task) = state.tasks.get_mut(&task_id) {
                        task.status = TaskStatus::Assigned;
                        task.assigned_to = Some(agent_id.clone());
                        let priority = task.priority;
                        state.agents.get_mut(&agent_id).unwrap().queue.enqueue(priority, task_id);
                    }
                    assigned = true;
                    break;
                }
                skipped.push(task_id);
            }
            for task_id in skipped {
                if let Some(task) = state.tasks.get(&task_id) {
                    state.pending.enqueue(task.priority, task_id);
                }
            }
            if assigned {
                debug!(agent_id, "assigned a task in assign pass");
            }
        }
    }

    /// Idle agents (victims) steal from the busiest agents (targets) when
    /// the gap in queue-length-derived utilization exceeds `steal_threshold`.
    async fn steal_pass(state: &Arc<RwLock<SchedulerState>>, steal_threshold: f64) {
        let mut state = state.write().await;
        let agent_ids: Vec<String> = state.agents.keys().cloned().collect();
        if agent_ids.len() < 2 {
            return;
        }
        let max_len = agent_ids
            .iter()
            .map(|id| state.agents[id].queue.size())
            .max()
            .unwrap_or(0)
            .max(1) as f64;

        let mut victims: Vec<String> = agent_ids
            .iter()
            .filter(|id| (state.agents[*id].queue.size() as f64 / max_len) < (1.0 - steal_threshold))
            .cloned()
            .collect();
        victims.sort_by_key(|id| state.agents[id].queue.size());

        let mut targets: Vec<String> = agent_ids.clone();
        targets.sort_by_key(|id| std::cmp::Reverse(state.agents[id].queue.size()));

        for victim_id in victims {
            for target_id in &targets {
                if *target_id == victim_id {
                    continue;
                }
                let target_len = state.agents[target_id].queue.size();
                let victim_len = state.agents[&victim_id].queue.size();
                if target_len == 0 || target_len <= victim_len {
                    continue;
                }
                let capabilities = state.agents[&victim_id].capabilities.clone();
                if let Some(task_id) = state.agents.get_mut(target_id).unwrap().queue.steal() {
                    let eligible = state
                        .tasks
                        .get(&task_id)
                        .is_some_and(|t| state.is_eligible(t, &capabilities));
                    if eligible {
                        if let Some(task) = state.tasks.get_mut(&task_id) {
                            task.assigned_to = Some(victim_id.clone());
                            let priority = task.priority;
                            state.agents.get_mut(&victim_id).unwrap().queue.enqueue(priority, task_id);
                        }
                        debug!(from = %target_id, to = %victim_id, task_id = %task_id, "stole task");
                        break;
                    }
                    // Not eligible for this victim: put it back on the target.
                    let priority = state.tasks[&task_id].priority;
                    state.agents.get_mut(target_id).unwrap().queue.enqueue(priority, task_id);
                }
            }
        }
    }
}
