//! Infrastructure layer module
//!
//! Adapters for everything outside the process:
//! - Neon control-plane client (reqwest)
//! - WebSocket connector (tokio-tungstenite)
//! - Configuration loading (figment)
//! - Logging (tracing-subscriber)
//! - Retry with exponential backoff

pub mod config;
pub mod logging;
pub mod neon;
pub mod retry;
pub mod websocket;

pub use config::ConfigLoader;
pub use neon::{NeonClient, NeonClientConfig};
pub use retry::RetryPolicy;
pub use websocket::{WebSocketConnection, WebSocketConnector};
