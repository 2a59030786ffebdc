//! OnlyCat Gateway - real-time client for the OnlyCat event gateway
//!
//! Keeps one persistent, auto-reconnecting Socket.IO session open and bridges it
//! to a local subscriber model.
//!
//! ## Architecture
//!
//! - **Transport**: owns the network session (handshake, heartbeat, reconnection,
//!   call correlation) and hands every inbound event to a single sink
//! - **Event Dispatcher**: fans each event out to the handlers registered for it
//! - **Gateway Client**: idempotent connect/disconnect, `wait()`, and
//!   request/response calls over the same session
//!
//! ## Failure handling
//!
//! | Failure                          | Surfaces as                        |
//! |----------------------------------|------------------------------------|
//! | Gateway rejects the token        | `GatewayError::Authentication`     |
//! | Network / handshake / call fails | `GatewayError::Communication`      |
//! | Event handler fails or panics    | Logged, dispatch continues         |
//! | Disconnect when already closed   | Nothing                            |

pub mod client;
pub mod config;
pub mod dispatcher;
pub mod error;
pub mod transport;

// Re-exports
pub use client::GatewayClient;
pub use config::ClientConfig;
pub use dispatcher::{EventDispatcher, EventHandler};
pub use error::GatewayError;
pub use transport::{
    ConnectOptions, ConnectionState, EventSink, SocketIoTransport, Transport, TransportConfig,
    CONNECT_EVENT, DISCONNECT_EVENT,
};
