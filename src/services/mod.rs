//! Application services: the work-stealing scheduler, coordinator, agent
//! runtimes, and the orchestrator that composes them.

pub mod agent_runtime;
pub mod coordinator;
pub mod dependency_resolver;
pub mod event_bus;
pub mod metrics_collector;
pub mod orchestrator;
pub mod primitives;
pub mod priority_queue;
pub mod scheduler;

pub use agent_runtime::AgentRuntime;
pub use coordinator::Coordinator;
pub use dependency_resolver::DependencyResolver;
pub use event_bus::{EventBus, SequenceNumber, SwarmEvent, UnifiedEvent};
pub use metrics_collector::{AgentSnapshot, MetricsCollector};
pub use orchestrator::{AgentTypeRegistry, Orchestrator, ProcessorFactory, SwarmState};
pub use primitives::{AcquireOutcome, DistributedCounter, DistributedLock};
pub use priority_queue::PriorityQueue;
pub use scheduler::Scheduler;
