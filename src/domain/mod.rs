//! Domain layer for the swarm coordination runtime.
//!
//! This module contains the core business logic and domain models: task and
//! agent entities, coordination messages, proposals, topology, and the ports
//! (trait boundaries) the services layer depends on.

pub mod error;
pub mod models;
pub mod ports;

// Re-export error types for convenient access
pub use error::{
    CoordinatorError, OrchestratorError, PrimitiveError, SchedulerError, StoreError,
};
