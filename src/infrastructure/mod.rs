//! Infrastructure layer
//!
//! Adapters for concerns external to the domain: hierarchical configuration
//! loading and structured logging. The store/event adapters that back the
//! domain ports live under `crate::adapters` instead.

pub mod config;
pub mod logging;
