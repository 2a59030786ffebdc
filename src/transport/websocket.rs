//! WebSocket Transport Layer
//!
//! Single responsibility: Connect to a WebSocket and send/receive text frames.
//! No knowledge of Socket.IO, authentication, or session management.

use futures_util::{
    stream::{SplitSink, SplitStream},
    SinkExt, StreamExt,
};
use tokio_tungstenite::{
    connect_async,
    tungstenite::{
        client::IntoClientRequest,
        http::{header::HeaderName, HeaderValue, StatusCode},
        protocol::Message,
        Error as WsError,
    },
    MaybeTlsStream, WebSocketStream,
};
use tracing::debug;

use crate::error::GatewayError;

/// Type alias for the WebSocket send half
pub type WsSink = SplitSink<WebSocketStream<MaybeTlsStream<tokio::net::TcpStream>>, Message>;

/// Type alias for the WebSocket receive half
pub type WsStream = SplitStream<WebSocketStream<MaybeTlsStream<tokio::net::TcpStream>>>;

/// A connected WebSocket.
///
/// Can only be constructed via `WsConnection::connect()`.
pub struct WsConnection {
    sink: WsSink,
    stream: WsStream,
}

impl WsConnection {
    /// Connect to a WebSocket endpoint, sending `headers` with the upgrade request.
    ///
    /// A 401/403 answer to the upgrade is reported as an authentication error,
    /// everything else as a communication error.
    pub async fn connect(url: &str, headers: &[(String, String)]) -> Result<Self, GatewayError> {
        debug!(url = %url, "Connecting to WebSocket");

        let mut request = url
            .into_client_request()
            .map_err(|e| GatewayError::Config(format!("Failed to build request: {}", e)))?;

        for (name, value) in headers {
            let name = HeaderName::from_bytes(name.as_bytes())
                .map_err(|e| GatewayError::Config(format!("Invalid header name {}: {}", name, e)))?;
            let value = HeaderValue::from_str(value)
                .map_err(|e| GatewayError::Config(format!("Invalid header value: {}", e)))?;
            request.headers_mut().insert(name, value);
        }

        let (ws, _) = connect_async(request).await.map_err(classify_connect_error)?;

        let (sink, stream) = ws.split();

        debug!(url = %url, "WebSocket connected");
        Ok(Self { sink, stream })
    }

    /// Send a text frame.
    pub async fn send_text(&mut self, text: String) -> Result<(), GatewayError> {
        self.sink
            .send(Message::Text(text))
            .await
            .map_err(|e| GatewayError::Communication(format!("Failed to send: {}", e)))
    }

    /// Receive the next text frame.
    ///
    /// Returns None if the connection is closed.
    /// Skips non-text frames (ping/pong handled automatically).
    pub async fn recv_text(&mut self) -> Result<Option<String>, GatewayError> {
        loop {
            match self.stream.next().await {
                Some(Ok(Message::Text(text))) => return Ok(Some(text)),
                Some(Ok(Message::Close(_))) => return Ok(None),
                Some(Ok(_)) => continue,
                Some(Err(e)) => {
                    return Err(GatewayError::Communication(format!("WebSocket error: {}", e)))
                }
                None => return Ok(None),
            }
        }
    }

    /// Split into separate sink and stream for concurrent send/receive.
    pub fn split(self) -> (WsSink, WsStream) {
        (self.sink, self.stream)
    }
}

fn classify_connect_error(error: WsError) -> GatewayError {
    match error {
        WsError::Http(response)
            if response.status() == StatusCode::UNAUTHORIZED
                || response.status() == StatusCode::FORBIDDEN =>
        {
            GatewayError::Authentication(format!(
                "Gateway refused upgrade with status {}",
                response.status()
            ))
        }
        other => GatewayError::Communication(format!("WebSocket connect failed: {}", other)),
    }
}
