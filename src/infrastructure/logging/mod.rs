//! Logging infrastructure
//!
//! Structured logging using tracing and tracing-subscriber:
//! - JSON log formatting
//! - Log rotation

pub mod config;
pub mod logger;

pub use config::{LogConfig, LogFormat, RotationPolicy};
pub use logger::LoggerImpl;
