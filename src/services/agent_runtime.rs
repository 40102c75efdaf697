//! Agent/worker execution loop.
//!
//! Pulls tasks from the scheduler, runs them through a [`TaskProcessor`],
//! and reports the outcome back. Writes a per-task envelope under
//! `<namespace>/task/<taskId>` before execution and the result under
//! `<namespace>/result/<taskId>` after, so a crash mid-task leaves a
//! recoverable trail in the store rather than silent loss.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use tokio::sync::Mutex;
use tokio::task::{JoinHandle, JoinSet};
use tracing::{debug, error, info, instrument, warn};

use crate::domain::models::Task;
use crate::domain::ports::{StoreAdapter, TaskProcessor};
use crate::services::metrics_collector::MetricsCollector;
use crate::services::scheduler::Scheduler;

/// Poll interval when the scheduler has no task ready for this agent, or
/// when the agent is already at `max_concurrent` in-flight tasks.
const IDLE_POLL_INTERVAL: Duration = Duration::from_millis(20);

/// Default bound on concurrent task executions per agent, absent an
/// explicit `with_max_concurrent` override.
pub const DEFAULT_MAX_CONCURRENT: usize = 5;

/// Bounded grace period `stop` waits for in-flight tasks before aborting them.
const STOP_GRACE: Duration = Duration::from_secs(5);

pub struct AgentRuntime {
    agent_id: String,
    namespace: String,
    processor: Arc<dyn TaskProcessor>,
    scheduler: Arc<Scheduler>,
    store: Arc<dyn StoreAdapter>,
    metrics: Arc<MetricsCollector>,
    max_concurrent: usize,
    running: Arc<AtomicBool>,
    handle: Mutex<Option<JoinHandle<()>>>,
}

impl AgentRuntime {
    pub fn new(
        agent_id: impl Into<String>,
        namespace: impl Into<String>,
        processor: Arc<dyn TaskProcessor>,
        scheduler: Arc<Scheduler>,
        store: Arc<dyn StoreAdapter>,
        metrics: Arc<MetricsCollector>,
    ) -> Self {
        Self {
            agent_id: agent_id.into(),
            namespace: namespace.into(),
            processor,
            scheduler,
            store,
            metrics,
            max_concurrent: DEFAULT_MAX_CONCURRENT,
            running: Arc::new(AtomicBool::new(false)),
            handle: Mutex::new(None),
        }
    }

    /// Overrides the concurrency cap (`maxConcurrent` in the processing
    /// loop contract); default is [`DEFAULT_MAX_CONCURRENT`].
    pub fn with_max_concurrent(mut self, max_concurrent: usize) -> Self {
        self.max_concurrent = max_concurrent.max(1);
        self
    }

    pub fn id(&self) -> &str {
        &self.agent_id
    }

    pub fn capabilities(&self) -> std::collections::HashSet<String> {
        self.processor.capabilities()
    }

    /// Runs the processing loop: pulls tasks from the scheduler and fans
    /// each one out onto its own logical task, up to `max_concurrent`
    /// in flight at once. Reports `current / max_concurrent` to the shared
    /// [`MetricsCollector`] after every change so the orchestrator's
    /// auto-scaling and the scheduler's stealing pass see live utilization.
    #[instrument(skip(self), fields(agent_id = %self.agent_id))]
    pub async fn start(&self) {
        if self.running.swap(true, Ordering::SeqCst) {
            return;
        }
        let agent_id = self.agent_id.clone();
        let namespace = self.namespace.clone();
        let processor = Arc::clone(&self.processor);
        let scheduler = Arc::clone(&self.scheduler);
        let store = Arc::clone(&self.store);
        let metrics = Arc::clone(&self.metrics);
        let running = Arc::clone(&self.running);
        let max_concurrent = self.max_concurrent;

        let handle = tokio::spawn(async move {
            let mut in_flight: JoinSet<()> = JoinSet::new();
            while running.load(Ordering::SeqCst) {
                while in_flight.try_join_next().is_some() {}
                metrics.set_utilization(&agent_id, in_flight.len() as f64 / max_concurrent as f64).await;

                if in_flight.len() >= max_concurrent {
                    tokio::time::sleep(IDLE_POLL_INTERVAL).await;
                    continue;
                }

                match scheduler.request_task(&agent_id).await {
                    Ok(Some(task)) => {
                        let agent_id = agent_id.clone();
                        let namespace = namespace.clone();
                        let processor = Arc::clone(&processor);
                        let scheduler = Arc::clone(&scheduler);
                        let store = Arc::clone(&store);
                        let metrics = Arc::clone(&metrics);
                        in_flight.spawn(async move {
                            Self::run_one(&agent_id, &namespace, &processor, &scheduler, &store, &metrics, task)
                                .await;
                        });
                    }
                    Ok(None) => tokio::time::sleep(IDLE_POLL_INTERVAL).await,
                    Err(err) => {
                        warn!(agent_id, %err, "request_task failed, backing off");
                        tokio::time::sleep(IDLE_POLL_INTERVAL).await;
                    }
                }
            }
            // Drained on stop(), bounded by STOP_GRACE via the outer timeout.
            while in_flight.join_next().await.is_some() {}
            metrics.set_utilization(&agent_id, 0.0).await;
        });
        *self.handle.lock().await = Some(handle);
        info!(agent_id = %self.agent_id, "agent runtime started");
    }

    #[instrument(skip(self), fields(agent_id = %self.agent_id))]
    pub async fn stop(&self) {
        if !self.running.swap(false, Ordering::SeqCst) {
            return;
        }
        let Some(handle) = self.handle.lock().await.take() else {
            return;
        };
        let abort_handle = handle.abort_handle();
        if tokio::time::timeout(STOP_GRACE, handle).await.is_err() {
            warn!(agent_id = %self.agent_id, "grace period elapsed with tasks still in flight, aborting");
            abort_handle.abort();
        }
        info!(agent_id = %self.agent_id, "agent runtime stopped");
    }

    async fn run_one(
        agent_id: &str,
        namespace: &str,
        processor: &Arc<dyn TaskProcessor>,
        scheduler: &Arc<Scheduler>,
        store: &Arc<dyn StoreAdapter>,
        metrics: &Arc<MetricsCollector>,
        task: Task,
    ) {
        let task_id = task.id;
        let start_time = chrono::Utc::now();
        let task_envelope = serde_json::json!({
            "task": task,
            "agentId": agent_id,
            "startTime": start_time,
        });
        if let Err(err) = store.upsert(&format!("{namespace}/task/{task_id}"), task_envelope, None).await {
            warn!(agent_id, %task_id, %err, "failed to persist task envelope");
        }

        let started = Instant::now();
        match processor.process_task(&task).await {
            Ok(result) => {
                let latency_ms = started.elapsed().as_secs_f64() * 1000.0;
                let result_envelope = serde_json::json!({
                    "result": result,
                    "latency": latency_ms,
                    "timestamp": chrono::Utc::now(),
                });
                if let Err(err) = store.upsert(&format!("{namespace}/result/{task_id}"), result_envelope, None).await
                {
                    warn!(agent_id, %task_id, %err, "failed to persist task result");
                }
                if let Err(err) = scheduler.complete_task(agent_id, task_id, result).await {
                    error!(agent_id, %task_id, %err, "complete_task failed");
                }
                metrics.record_success(agent_id, latency_ms).await;
                debug!(agent_id, %task_id, latency_ms, "task completed");
            }
            Err(err) => {
                metrics.record_error(agent_id).await;
                let message = err.to_string();
                if let Err(sched_err) = scheduler.fail_task(agent_id, task_id, message.clone()).await {
                    error!(agent_id, %task_id, %sched_err, "fail_task failed");
                }
                warn!(agent_id, %task_id, error = %message, "task processing failed");
            }
        }
    }
}
