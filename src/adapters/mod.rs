//! Concrete adapters for the domain's ports.

pub mod memory_store;

pub use memory_store::InMemoryStore;
