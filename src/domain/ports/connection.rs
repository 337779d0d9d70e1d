use std::sync::Arc;

use async_trait::async_trait;

use crate::domain::errors::ConnectionError;

/// A live real-time (WebSocket-style) connection.
#[async_trait]
pub trait RealtimeConnection: Send + Sync + std::fmt::Debug {
    /// URL the connection was opened against.
    fn url(&self) -> &str;

    fn is_closed(&self) -> bool;

    async fn send_text(&self, text: String) -> Result<(), ConnectionError>;

    /// Next text frame, `None` once the connection is closed.
    async fn next_text(&self) -> Option<String>;

    /// Start the closing handshake. Returns once the close frame is sent,
    /// not once the peer confirmed it.
    async fn close(&self) -> Result<(), ConnectionError>;

    /// Resolves once the connection is fully closed.
    async fn closed(&self);
}

/// Opens real-time connections.
///
/// This is the seam the connection tracker wraps: production code supplies
/// a real connector, tests supply a fake one.
#[async_trait]
pub trait ConnectionFactory: Send + Sync {
    async fn connect(&self, url: &str) -> Result<Arc<dyn RealtimeConnection>, ConnectionError>;
}
