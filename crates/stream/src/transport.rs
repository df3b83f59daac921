//! Transport seam for the job-group event stream.
//!
//! [`Connector`] opens one [`StreamTransport`] per job-group stream URL.
//! The production implementation, [`WsConnector`], speaks WebSocket via
//! tokio-tungstenite; tests plug in an in-memory connector.

use async_trait::async_trait;
use futures::{SinkExt, StreamExt};
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{connect_async, MaybeTlsStream, WebSocketStream};

/// Opens live stream connections.
#[async_trait]
pub trait Connector: Send + Sync {
    /// Establish a connection to `url`.
    async fn connect(&self, url: &str) -> Result<Box<dyn StreamTransport>, StreamError>;
}

impl std::fmt::Debug for dyn StreamTransport {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("StreamTransport")
    }
}

/// One open stream connection.
#[async_trait]
pub trait StreamTransport: Send {
    /// Send a text frame.
    async fn send_text(&mut self, text: &str) -> Result<(), StreamError>;

    /// Wait for the next inbound text frame.
    ///
    /// `None` means the connection is closed, for whatever reason.
    /// `Some(Err(_))` is a transport error that does not by itself close
    /// the connection. Must be cancel-safe.
    async fn next_frame(&mut self) -> Option<Result<String, StreamError>>;

    /// Close the connection. Calling it more than once is a no-op.
    async fn close(&mut self);
}

/// Errors raised by a stream transport.
#[derive(Debug, Clone, thiserror::Error)]
pub enum StreamError {
    /// Failed to establish the connection.
    #[error("Connection error: {0}")]
    Connect(String),

    /// Reading from an established connection failed.
    #[error("Receive error: {0}")]
    Receive(String),

    /// Writing to an established connection failed.
    #[error("Send error: {0}")]
    Send(String),
}

// ---------------------------------------------------------------------------
// WebSocket implementation
// ---------------------------------------------------------------------------

type WsStream = WebSocketStream<MaybeTlsStream<tokio::net::TcpStream>>;

/// [`Connector`] backed by tokio-tungstenite.
#[derive(Debug, Default, Clone)]
pub struct WsConnector;

impl WsConnector {
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl Connector for WsConnector {
    async fn connect(&self, url: &str) -> Result<Box<dyn StreamTransport>, StreamError> {
        let (ws_stream, _response) = connect_async(url)
            .await
            .map_err(|e| StreamError::Connect(format!("Failed to connect to {url}: {e}")))?;

        tracing::debug!(url = %url, "WebSocket handshake complete");

        Ok(Box::new(WsTransport {
            ws_stream,
            closed: false,
        }))
    }
}

/// A live WebSocket connection to one job-group stream.
pub struct WsTransport {
    ws_stream: WsStream,
    /// Set once the peer closed, a receive error occurred, or `close` ran.
    closed: bool,
}

#[async_trait]
impl StreamTransport for WsTransport {
    async fn send_text(&mut self, text: &str) -> Result<(), StreamError> {
        if self.closed {
            return Err(StreamError::Send("connection is closed".to_string()));
        }
        self.ws_stream
            .send(Message::Text(text.to_string()))
            .await
            .map_err(|e| StreamError::Send(e.to_string()))
    }

    async fn next_frame(&mut self) -> Option<Result<String, StreamError>> {
        if self.closed {
            return None;
        }
        loop {
            match self.ws_stream.next().await {
                Some(Ok(Message::Text(text))) => return Some(Ok(text)),
                Some(Ok(Message::Binary(_))) => {
                    tracing::trace!("Ignoring binary frame");
                }
                Some(Ok(Message::Ping(_) | Message::Pong(_))) => {
                    // Handled automatically by tungstenite.
                }
                Some(Ok(Message::Close(frame))) => {
                    tracing::debug!(?frame, "Peer closed WebSocket");
                    self.closed = true;
                    return None;
                }
                Some(Ok(Message::Frame(_))) => {}
                Some(Err(e)) => {
                    // tungstenite streams are unusable after an error; report
                    // it once, then look closed.
                    self.closed = true;
                    return Some(Err(StreamError::Receive(e.to_string())));
                }
                None => {
                    self.closed = true;
                    return None;
                }
            }
        }
    }

    async fn close(&mut self) {
        if self.closed {
            return;
        }
        self.closed = true;
        if let Err(e) = self.ws_stream.close(None).await {
            tracing::debug!(error = %e, "Error while closing WebSocket");
        }
    }
}
