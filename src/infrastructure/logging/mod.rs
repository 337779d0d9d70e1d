//! Logging infrastructure
//!
//! Structured logging using tracing and tracing-subscriber:
//! - JSON or pretty formatting
//! - Optional non-blocking file output
//! - Idempotent test subscriber

pub mod config;
pub mod logger;

pub use config::{LogConfig, LogFormat};
pub use logger::{init_test_logging, LoggerImpl};
