//! WebSocket connector backed by tokio-tungstenite.
//!
//! A background reader task owns the receiving half of each socket. It
//! forwards text frames to the connection, flips the closed flag when the
//! stream ends, and reports abnormal termination to the error guard the way
//! an uncaught error would surface.

use std::sync::Arc;

use async_trait::async_trait;
use futures::stream::{SplitSink, SplitStream};
use futures::{SinkExt, StreamExt};
use tokio::net::TcpStream;
use tokio::sync::{mpsc, watch, Mutex};
use tokio_tungstenite::tungstenite::error::ProtocolError;
use tokio_tungstenite::tungstenite::{Error as WsError, Message};
use tokio_tungstenite::{connect_async, MaybeTlsStream, WebSocketStream};
use tracing::{debug, error};

use crate::domain::errors::ConnectionError;
use crate::domain::ports::{ConnectionFactory, RealtimeConnection};
use crate::services::error_guard::{self, AsyncError, ScopeId, TERMINATED_UNEXPECTEDLY};

type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;

/// Origin frame attached to errors raised by the socket reader.
const READER_FRAME: &str = "tokio_tungstenite::WebSocketStream::poll_next";

/// Opens real WebSocket connections.
#[derive(Debug, Clone, Copy, Default)]
pub struct WebSocketConnector;

#[async_trait]
impl ConnectionFactory for WebSocketConnector {
    async fn connect(&self, url: &str) -> Result<Arc<dyn RealtimeConnection>, ConnectionError> {
        let (stream, _response) =
            connect_async(url)
                .await
                .map_err(|e| ConnectionError::Connect {
                    url: url.to_string(),
                    message: e.to_string(),
                })?;

        debug!(url, "WebSocket connected");
        Ok(Arc::new(WebSocketConnection::spawn(
            url.to_string(),
            stream,
            error_guard::current_scope(),
        )))
    }
}

/// One open WebSocket.
pub struct WebSocketConnection {
    url: String,
    sink: Mutex<SplitSink<WsStream, Message>>,
    incoming: Mutex<mpsc::UnboundedReceiver<String>>,
    closed: watch::Receiver<bool>,
}

impl WebSocketConnection {
    fn spawn(url: String, stream: WsStream, scope: Option<ScopeId>) -> Self {
        let (sink, reader) = stream.split();
        let (text_tx, text_rx) = mpsc::unbounded_channel();
        let (closed_tx, closed_rx) = watch::channel(false);

        tokio::spawn(read_loop(url.clone(), reader, text_tx, closed_tx, scope));

        Self {
            url,
            sink: Mutex::new(sink),
            incoming: Mutex::new(text_rx),
            closed: closed_rx,
        }
    }
}

impl std::fmt::Debug for WebSocketConnection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WebSocketConnection")
            .field("url", &self.url)
            .field("closed", &self.is_closed())
            .finish_non_exhaustive()
    }
}

async fn read_loop(
    url: String,
    mut reader: SplitStream<WsStream>,
    text_tx: mpsc::UnboundedSender<String>,
    closed_tx: watch::Sender<bool>,
    scope: Option<ScopeId>,
) {
    while let Some(frame) = reader.next().await {
        match frame {
            Ok(Message::Text(text)) => {
                let _ = text_tx.send(text.to_string());
            }
            Ok(_) => {}
            Err(WsError::ConnectionClosed | WsError::AlreadyClosed) => break,
            Err(err) => {
                let report = AsyncError::new(termination_message(&err))
                    .with_frame(READER_FRAME)
                    .with_frame(module_path!())
                    .with_scope(scope);
                if let Err(unhandled) = error_guard::dispatch(report) {
                    error!(url = %url, error = %unhandled, "Unhandled WebSocket error");
                }
                break;
            }
        }
    }

    closed_tx.send_replace(true);
    debug!(url = %url, "WebSocket closed");
}

fn termination_message(err: &WsError) -> String {
    match err {
        WsError::Io(_) | WsError::Protocol(ProtocolError::ResetWithoutClosingHandshake) => {
            format!("{TERMINATED_UNEXPECTEDLY}: {err}")
        }
        other => other.to_string(),
    }
}

#[async_trait]
impl RealtimeConnection for WebSocketConnection {
    fn url(&self) -> &str {
        &self.url
    }

    fn is_closed(&self) -> bool {
        *self.closed.borrow()
    }

    async fn send_text(&self, text: String) -> Result<(), ConnectionError> {
        if self.is_closed() {
            return Err(ConnectionError::Closed);
        }
        self.sink
            .lock()
            .await
            .send(Message::Text(text))
            .await
            .map_err(|e| ConnectionError::Io(e.to_string()))
    }

    async fn next_text(&self) -> Option<String> {
        self.incoming.lock().await.recv().await
    }

    async fn close(&self) -> Result<(), ConnectionError> {
        match self.sink.lock().await.close().await {
            Ok(()) | Err(WsError::ConnectionClosed | WsError::AlreadyClosed) => Ok(()),
            Err(e) => Err(ConnectionError::Io(e.to_string())),
        }
    }

    async fn closed(&self) {
        let mut closed = self.closed.clone();
        let _ = closed.wait_for(|is_closed| *is_closed).await;
    }
}
