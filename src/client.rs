//! Gateway Client
//!
//! The aggregate the host application talks to. It owns exactly one
//! [`Transport`] and one [`EventDispatcher`]:
//!
//! ```text
//!   gateway ──► Transport ──(every event)──► EventDispatcher ──► handlers
//!                  ▲
//!   caller ──► GatewayClient::connect / disconnect / send_message
//! ```
//!
//! The client keeps no connection flag of its own; it asks the transport.
//! Reconnection is the transport's job; the client only reacts to the
//! `connect` event it emits after every (re)connection.
//!
//! # Usage
//!
//! ```ignore
//! use onlycat_gateway::{ClientConfig, GatewayClient};
//!
//! let client = GatewayClient::new(token, ClientConfig::default());
//! client.add_event_listener("deviceEvent", |args| async move {
//!     println!("{:?}", args);
//!     Ok(())
//! });
//!
//! client.connect().await?;
//! let reply = client.send_message("getDevices", json!({"subscribe": true})).await?;
//! client.wait().await;
//! ```

use serde_json::{json, Value};
use std::fmt;
use std::future::Future;
use std::sync::Arc;
use tracing::{debug, info, info_span, warn, Instrument, Span};

use crate::config::ClientConfig;
use crate::dispatcher::EventDispatcher;
use crate::error::GatewayError;
use crate::transport::{ConnectOptions, EventSink, SocketIoTransport, Transport, CONNECT_EVENT};

/// Client for the gateway's real-time API.
pub struct GatewayClient {
    /// Bearer token, fixed for the client's lifetime
    token: String,
    config: ClientConfig,
    dispatcher: Arc<EventDispatcher>,
    transport: Arc<dyn Transport>,
    /// Logging context for everything this client does
    span: Span,
}

impl GatewayClient {
    /// Create a client backed by its own Socket.IO transport.
    pub fn new(token: impl Into<String>, config: ClientConfig) -> Self {
        let transport = Arc::new(SocketIoTransport::new(config.transport_config()));
        Self::with_transport(token, config, transport)
    }

    /// Create a client on top of a supplied transport.
    pub fn with_transport(
        token: impl Into<String>,
        config: ClientConfig,
        transport: Arc<dyn Transport>,
    ) -> Self {
        let span = info_span!("gateway_client", gateway = %config.gateway_url);
        let dispatcher = Arc::new(EventDispatcher::new());
        transport.on_any(Arc::clone(&dispatcher) as Arc<dyn EventSink>);

        let client = Self {
            token: token.into(),
            config,
            dispatcher,
            transport,
            span,
        };
        client.register_bootstrap_listener();
        client
    }

    /// Log every (re)connection, including automatic ones.
    fn register_bootstrap_listener(&self) {
        let span = self.span.clone();
        let namespace = self.config.namespace.clone();
        self.add_event_listener(CONNECT_EVENT, move |_args| {
            let namespace = namespace.clone();
            async move {
                info!(namespace = %namespace, "(Re)connected to gateway");
                Ok(())
            }
            .instrument(span.clone())
        });
    }

    fn connect_options(&self) -> ConnectOptions {
        ConnectOptions {
            url: self.config.gateway_url.clone(),
            namespace: self.config.namespace.clone(),
            headers: self.config.identity_headers(),
            auth: json!({ "token": self.token }),
        }
    }

    /// Connect to the gateway.
    ///
    /// A no-op if the transport is already connected. Otherwise blocks until
    /// the handshake completes.
    ///
    /// # Errors
    /// - `GatewayError::Authentication` if the gateway rejects the token
    /// - `GatewayError::Communication` for any other handshake failure
    pub async fn connect(&self) -> Result<(), GatewayError> {
        async {
            if self.transport.is_connected() {
                debug!("Already connected to gateway");
                return Ok(());
            }

            debug!("Connecting to gateway");
            self.transport.connect(self.connect_options()).await
        }
        .instrument(self.span.clone())
        .await
    }

    /// Close the session and release the transport's resources.
    ///
    /// Best effort: never fails, including when already disconnected.
    pub async fn disconnect(&self) {
        async {
            debug!("Disconnecting from gateway");
            if let Err(e) = self.transport.disconnect().await {
                warn!(error = %e, "Graceful disconnect failed");
            }
            self.transport.shutdown().await;
        }
        .instrument(self.span.clone())
        .await
    }

    /// Block until the connection is closed for good.
    pub async fn wait(&self) {
        self.transport.wait().instrument(self.span.clone()).await
    }

    /// Whether the transport currently has an established session.
    pub fn is_connected(&self) -> bool {
        self.transport.is_connected()
    }

    /// Register `handler` for `event`. See [`EventDispatcher::add_event_listener`].
    pub fn add_event_listener<F, Fut>(&self, event: &str, handler: F)
    where
        F: Fn(Vec<Value>) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = anyhow::Result<()>> + Send + 'static,
    {
        let _entered = self.span.enter();
        self.dispatcher.add_event_listener(event, handler);
    }

    /// Dispatch one inbound event to its handlers.
    pub async fn handle_event(&self, event: &str, args: Vec<Value>) {
        self.dispatcher
            .handle_event(event, args)
            .instrument(self.span.clone())
            .await
    }

    /// Number of handlers registered for `event`.
    pub fn listener_count(&self, event: &str) -> usize {
        self.dispatcher.listener_count(event)
    }

    /// Send `payload` as `event` and wait for the gateway's reply.
    ///
    /// Returns `None` when the gateway acknowledges without a payload.
    ///
    /// # Errors
    /// - `GatewayError::Communication` if not connected, or the session drops
    ///   or times out before the reply arrives
    pub async fn send_message(
        &self,
        event: &str,
        payload: Value,
    ) -> Result<Option<Value>, GatewayError> {
        async {
            debug!(event = %event, payload = %payload, "Sending message to gateway");
            self.transport.call(event, payload).await
        }
        .instrument(self.span.clone())
        .await
    }
}

impl fmt::Debug for GatewayClient {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("GatewayClient")
            .field("token", &"<redacted>")
            .field("config", &self.config)
            .field("connected", &self.transport.is_connected())
            .finish()
    }
}
