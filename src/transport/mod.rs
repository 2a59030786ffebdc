//! Gateway Transport Module
//!
//! The client never speaks the wire protocol directly. It talks to a
//! [`Transport`], which owns the network session, and receives every inbound
//! event through a single [`EventSink`].
//!
//! # Architecture
//!
//! | Module      | Responsibility                                    |
//! |-------------|---------------------------------------------------|
//! | `websocket` | WebSocket connect/send/receive                    |
//! | `protocol`  | Engine.IO / Socket.IO packet encoding             |
//! | `socketio`  | Handshake, heartbeat, acks, reconnection          |
//!
//! # Lifecycle events
//!
//! Besides whatever the gateway emits, every transport delivers two events
//! through the sink:
//!
//! - [`CONNECT_EVENT`] with no arguments after each successful handshake,
//!   including automatic reconnections
//! - [`DISCONNECT_EVENT`] with a reason string when an established session ends

use async_trait::async_trait;
use serde_json::Value;
use std::sync::Arc;

use crate::error::GatewayError;

// Internal modules - not exposed publicly
mod protocol;
mod socketio;
mod websocket;

pub use socketio::{ConnectionState, SocketIoTransport, TransportConfig};

/// Delivered after every (re)connection.
pub const CONNECT_EVENT: &str = "connect";

/// Delivered when an established session ends.
pub const DISCONNECT_EVENT: &str = "disconnect";

/// Everything needed to open a session with the gateway.
#[derive(Debug, Clone, PartialEq)]
pub struct ConnectOptions {
    /// Gateway base URL
    pub url: String,
    /// Namespace to join ("/" is the root namespace)
    pub namespace: String,
    /// Headers attached to the upgrade request, in order
    pub headers: Vec<(String, String)>,
    /// Authentication object sent with the namespace connect
    pub auth: Value,
}

/// Receives every inbound event from a transport.
///
/// Transports await `handle_event` once per event and never run two calls
/// concurrently, so implementors see events in arrival order.
#[async_trait]
pub trait EventSink: Send + Sync {
    async fn handle_event(&self, event: &str, args: Vec<Value>);
}

/// A duplex, auto-reconnecting messaging session.
#[async_trait]
pub trait Transport: Send + Sync {
    /// Install the wildcard sink for all inbound events.
    fn on_any(&self, sink: Arc<dyn EventSink>);

    /// Whether a session is currently established.
    fn is_connected(&self) -> bool;

    /// Open a session. Resolves once the handshake succeeded or failed.
    async fn connect(&self, options: ConnectOptions) -> Result<(), GatewayError>;

    /// Send a named request and await its correlated reply.
    async fn call(&self, event: &str, payload: Value) -> Result<Option<Value>, GatewayError>;

    /// Gracefully close the session. Ok if already closed.
    async fn disconnect(&self) -> Result<(), GatewayError>;

    /// Release every resource held by the transport.
    async fn shutdown(&self);

    /// Resolve once the transport is disconnected with no reconnection pending.
    async fn wait(&self);
}
