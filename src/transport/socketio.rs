//! Socket.IO Transport
//!
//! Single responsibility: Keep one Socket.IO session with the gateway alive and
//! expose it as a [`Transport`].
//!
//! # Architecture
//!
//! ```text
//! ┌────────────────────────────────────────────────────────┐
//! │                  SocketIoTransport                      │
//! │  - connect() blocks until the namespace is joined       │
//! │  - call() correlates replies by ack id                  │
//! └────────────────────────────────────────────────────────┘
//!                │                          │
//!                ▼                          ▼
//! ┌──────────────────────────┐  ┌──────────────────────────┐
//! │  supervisor task          │  │  dispatch task            │
//! │  (one per connect())      │  │  (one per transport)      │
//! │  - reads frames           │  │  - awaits the EventSink   │
//! │  - answers pings          │  │    one event at a time    │
//! │  - resolves acks          │  │                           │
//! │  - reconnects on loss     │  │                           │
//! └──────────────────────────┘  └──────────────────────────┘
//! ```
//!
//! Events flow from the supervisor to the dispatch task over a channel, so a
//! slow handler delays later events but never delays heartbeats or acks.
//! The channel is unbounded: blocking the supervisor on a full queue would
//! stall heartbeats, and would deadlock a handler awaiting a call reply. A
//! growing backlog is logged instead.
//!
//! Handlers run on the dispatch task and may call back into the transport
//! (`connect`, `call`, `disconnect`, `shutdown`). None of those abort the
//! dispatch task; only dropping the transport does.
//!
//! # Sessions and generations
//!
//! `connect()` calls are serialized. Each one starts a new generation and
//! replaces the supervisor. A supervisor only installs, tears down, or
//! reports state for its own generation, so a superseded supervisor that is
//! still winding down cannot clobber the live session.
//!
//! # Reconnection Policy
//!
//! When an established session is lost (transport error, transport close,
//! ping timeout), the supervisor waits `reconnect_delay` and re-runs the full
//! handshake, forever unless `max_reconnect_attempts` is set. Sessions ended by
//! `disconnect()` or by a server-side namespace disconnect are not resumed.

use async_trait::async_trait;
use futures_util::{SinkExt, StreamExt};
use serde_json::Value;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, RwLock};
use std::time::Duration;
use tokio::sync::{mpsc, oneshot, watch};
use tokio::task::JoinHandle;
use tokio::time::timeout;
use tokio_tungstenite::tungstenite::{protocol::Message, Error as WsError};
use tracing::{debug, error, info, warn};

use super::protocol::{
    decode_engine, decode_socket, encode_ack, encode_connect, encode_disconnect, encode_event,
    encode_pong, endpoint_url, EnginePacket, Handshake, SocketPacket, ENGINE_CLOSE,
    ROOT_NAMESPACE,
};
use super::websocket::{WsConnection, WsSink, WsStream};
use super::{ConnectOptions, EventSink, Transport, CONNECT_EVENT, DISCONNECT_EVENT};
use crate::error::GatewayError;

/// Queued events between backlog warnings.
const BACKLOG_WARN_EVERY: usize = 256;

/// Configuration for the Socket.IO transport.
#[derive(Debug, Clone)]
pub struct TransportConfig {
    /// Reconnect when an established session is lost
    pub reconnect: bool,
    /// Fixed delay before each reconnection attempt
    pub reconnect_delay: Duration,
    /// Maximum reconnection attempts per outage (0 = unlimited)
    pub max_reconnect_attempts: u32,
    /// Timeout for a correlated call
    pub call_timeout: Duration,
    /// Timeout for the whole connect handshake
    pub connect_timeout: Duration,
}

impl Default for TransportConfig {
    fn default() -> Self {
        Self {
            reconnect: true,
            reconnect_delay: Duration::from_secs(10),
            max_reconnect_attempts: 0, // Unlimited
            call_timeout: Duration::from_secs(60),
            connect_timeout: Duration::from_secs(30),
        }
    }
}

/// Where the transport is in its lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    Disconnected,
    Connecting,
    Connected,
    Reconnecting,
}

type PendingCalls = Mutex<HashMap<u64, oneshot::Sender<Vec<Value>>>>;

type InboundEvent = (String, Vec<Value>);

/// Why a session ended.
#[derive(Debug)]
enum SessionEnd {
    ClientDisconnect,
    ServerDisconnect,
    PingTimeout,
    TransportClose,
    TransportError(String),
}

impl SessionEnd {
    fn reason(&self) -> String {
        match self {
            Self::ClientDisconnect => "io client disconnect".to_string(),
            Self::ServerDisconnect => "io server disconnect".to_string(),
            Self::PingTimeout => "ping timeout".to_string(),
            Self::TransportClose => "transport close".to_string(),
            Self::TransportError(e) => format!("transport error: {}", e),
        }
    }

    fn is_recoverable(&self) -> bool {
        matches!(
            self,
            Self::PingTimeout | Self::TransportClose | Self::TransportError(_)
        )
    }
}

/// A joined namespace on a live Engine.IO connection.
struct Session {
    sink: WsSink,
    stream: WsStream,
    handshake: Handshake,
    namespace: String,
}

/// State shared between the transport handle and its background tasks.
struct Shared {
    config: TransportConfig,
    sink: RwLock<Option<Arc<dyn EventSink>>>,
    state: watch::Sender<ConnectionState>,
    /// Send half of the current session
    writer: tokio::sync::Mutex<Option<WsSink>>,
    namespace: RwLock<String>,
    /// Pending reply channels, keyed by ack id
    pending: PendingCalls,
    next_id: AtomicU64,
    /// Set by disconnect()/shutdown(); suppresses reconnection
    closing: AtomicBool,
    /// Bumped by connect() and shutdown()
    generation: AtomicU64,
    /// Held for the duration of a connect() handshake
    connecting: tokio::sync::Mutex<()>,
    supervisor: Mutex<Option<JoinHandle<()>>>,
    dispatcher: Mutex<Option<JoinHandle<()>>>,
    events: mpsc::UnboundedSender<InboundEvent>,
    /// Receive half, parked here until the dispatch task is spawned
    events_rx: Mutex<Option<mpsc::UnboundedReceiver<InboundEvent>>>,
    /// Events queued but not yet dispatched
    backlog: AtomicUsize,
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

impl Shared {
    fn current_namespace(&self) -> String {
        self.namespace
            .read()
            .map(|ns| ns.clone())
            .unwrap_or_else(|poisoned| poisoned.into_inner().clone())
    }

    fn event_sink(&self) -> Option<Arc<dyn EventSink>> {
        self.sink
            .read()
            .map(|sink| sink.clone())
            .unwrap_or_else(|poisoned| poisoned.into_inner().clone())
    }

    fn is_current(&self, generation: u64) -> bool {
        self.generation.load(Ordering::SeqCst) == generation
    }

    fn set_state(&self, generation: u64, state: ConnectionState) {
        if self.is_current(generation) {
            self.state.send_replace(state);
        }
    }

    /// Make `session` the current one and report Connected.
    ///
    /// Returns None, dropping the session, if `generation` was superseded.
    async fn install(&self, generation: u64, session: Session) -> Option<(WsStream, Handshake)> {
        let Session {
            sink,
            stream,
            handshake,
            namespace,
        } = session;

        let mut writer = self.writer.lock().await;
        if !self.is_current(generation) {
            debug!(sid = %handshake.sid, "Dropping superseded session");
            return None;
        }
        *writer = Some(sink);
        match self.namespace.write() {
            Ok(mut ns) => *ns = namespace,
            Err(poisoned) => *poisoned.into_inner() = namespace,
        }
        self.state.send_replace(ConnectionState::Connected);
        drop(writer);

        info!(
            sid = %handshake.sid,
            ping_interval_ms = handshake.ping_interval,
            "Gateway session established"
        );
        Some((stream, handshake))
    }

    /// Drop the send half and fail every pending call, if `generation` still
    /// owns the session.
    async fn end_session(&self, generation: u64) {
        let mut writer = self.writer.lock().await;
        if !self.is_current(generation) {
            return;
        }
        *writer = None;
        drop(writer);

        let pending: Vec<_> = lock(&self.pending).drain().collect();
        for (id, _tx) in pending {
            debug!(id = id, "Cleaning up pending call");
        }
    }

    async fn send(&self, text: String) -> Result<(), GatewayError> {
        let mut writer = self.writer.lock().await;
        let sink = writer
            .as_mut()
            .ok_or_else(|| GatewayError::Communication("Not connected to gateway".into()))?;

        sink.send(Message::Text(text))
            .await
            .map_err(|e| GatewayError::Communication(format!("Failed to send: {}", e)))
    }

    fn resolve(&self, id: u64, args: Vec<Value>) {
        match lock(&self.pending).remove(&id) {
            Some(tx) => {
                let _ = tx.send(args);
            }
            None => debug!(id = id, "Ack for unknown or abandoned call"),
        }
    }

    /// Queue an event for the dispatch task.
    fn enqueue(&self, event: String, args: Vec<Value>) {
        let backlog = self.backlog.fetch_add(1, Ordering::SeqCst) + 1;
        if backlog % BACKLOG_WARN_EVERY == 0 {
            warn!(backlog = backlog, "Event handlers are falling behind");
        }
        if self.events.send((event, args)).is_err() {
            self.backlog.fetch_sub(1, Ordering::SeqCst);
            debug!("Dispatch task gone, dropping event");
        }
    }
}

/// Marks the transport Disconnected if a handshake is abandoned midway.
struct ConnectingGuard<'a> {
    state: &'a watch::Sender<ConnectionState>,
    armed: bool,
}

impl Drop for ConnectingGuard<'_> {
    fn drop(&mut self) {
        if self.armed {
            self.state.send_replace(ConnectionState::Disconnected);
        }
    }
}

/// Removes a call's pending entry when the caller stops waiting.
struct PendingGuard<'a> {
    pending: &'a PendingCalls,
    id: u64,
}

impl Drop for PendingGuard<'_> {
    fn drop(&mut self) {
        lock(self.pending).remove(&self.id);
    }
}

/// Socket.IO v5 client over a WebSocket-only Engine.IO v4 connection.
pub struct SocketIoTransport {
    shared: Arc<Shared>,
}

impl SocketIoTransport {
    pub fn new(config: TransportConfig) -> Self {
        let (state, _) = watch::channel(ConnectionState::Disconnected);
        let (events, events_rx) = mpsc::unbounded_channel();
        Self {
            shared: Arc::new(Shared {
                config,
                sink: RwLock::new(None),
                state,
                writer: tokio::sync::Mutex::new(None),
                namespace: RwLock::new(ROOT_NAMESPACE.to_string()),
                pending: Mutex::new(HashMap::new()),
                next_id: AtomicU64::new(1),
                closing: AtomicBool::new(false),
                generation: AtomicU64::new(0),
                connecting: tokio::sync::Mutex::new(()),
                supervisor: Mutex::new(None),
                dispatcher: Mutex::new(None),
                events,
                events_rx: Mutex::new(Some(events_rx)),
                backlog: AtomicUsize::new(0),
            }),
        }
    }

    /// Current lifecycle state.
    pub fn state(&self) -> ConnectionState {
        *self.shared.state.borrow()
    }

    /// Spawn the dispatch task on first use; it then lives as long as the transport.
    fn ensure_dispatcher(&self) {
        let mut dispatcher = lock(&self.shared.dispatcher);
        if dispatcher.is_some() {
            return;
        }
        if let Some(events) = lock(&self.shared.events_rx).take() {
            *dispatcher = Some(tokio::spawn(dispatch_loop(
                Arc::clone(&self.shared),
                events,
            )));
        }
    }

    fn replace_supervisor(&self, next: Option<JoinHandle<()>>) {
        let previous = std::mem::replace(&mut *lock(&self.shared.supervisor), next);
        if let Some(previous) = previous {
            previous.abort();
        }
    }
}

impl Default for SocketIoTransport {
    fn default() -> Self {
        Self::new(TransportConfig::default())
    }
}

impl Drop for SocketIoTransport {
    fn drop(&mut self) {
        self.replace_supervisor(None);
        if let Some(dispatcher) = lock(&self.shared.dispatcher).take() {
            dispatcher.abort();
        }
        debug!("Transport dropped, background tasks aborted");
    }
}

#[async_trait]
impl Transport for SocketIoTransport {
    fn on_any(&self, sink: Arc<dyn EventSink>) {
        match self.shared.sink.write() {
            Ok(mut current) => *current = Some(sink),
            Err(poisoned) => *poisoned.into_inner() = Some(sink),
        }
    }

    fn is_connected(&self) -> bool {
        self.state() == ConnectionState::Connected
    }

    async fn connect(&self, options: ConnectOptions) -> Result<(), GatewayError> {
        // Overlapping callers wait for the handshake in progress
        let _connecting = self.shared.connecting.lock().await;
        if self.is_connected() {
            return Ok(());
        }

        let generation = self.shared.generation.fetch_add(1, Ordering::SeqCst) + 1;
        // A reconnection loop from an earlier session must not race this one
        self.replace_supervisor(None);
        self.ensure_dispatcher();
        self.shared.closing.store(false, Ordering::SeqCst);
        self.shared.state.send_replace(ConnectionState::Connecting);
        let mut guard = ConnectingGuard {
            state: &self.shared.state,
            armed: true,
        };

        let session = establish(&self.shared.config, &options).await?;
        let (stream, handshake) = self
            .shared
            .install(generation, session)
            .await
            .ok_or_else(|| GatewayError::Communication("Transport shut down during connect".into()))?;
        guard.armed = false;

        let supervisor = tokio::spawn(supervise(
            Arc::clone(&self.shared),
            generation,
            stream,
            handshake,
            options,
        ));
        self.replace_supervisor(Some(supervisor));

        Ok(())
    }

    async fn call(&self, event: &str, payload: Value) -> Result<Option<Value>, GatewayError> {
        if !self.is_connected() {
            return Err(GatewayError::Communication(
                "Not connected to gateway".into(),
            ));
        }

        let id = self.shared.next_id.fetch_add(1, Ordering::SeqCst);
        let encoded = encode_event(&self.shared.current_namespace(), Some(id), event, &payload)?;

        let (reply_tx, reply_rx) = oneshot::channel();
        lock(&self.shared.pending).insert(id, reply_tx);
        let _pending = PendingGuard {
            pending: &self.shared.pending,
            id,
        };

        debug!(id = id, event = %event, "Sending call");
        self.shared.send(encoded).await?;

        match timeout(self.shared.config.call_timeout, reply_rx).await {
            Ok(Ok(args)) => Ok(reply_from_args(args)),
            Ok(Err(_)) => Err(GatewayError::Communication(
                "Session closed before reply".into(),
            )),
            Err(_) => Err(GatewayError::Communication(format!(
                "Call {} timed out",
                event
            ))),
        }
    }

    async fn disconnect(&self) -> Result<(), GatewayError> {
        self.shared.closing.store(true, Ordering::SeqCst);

        if !self.is_connected() {
            debug!("Disconnect requested but not connected");
            return Ok(());
        }

        let namespace = self.shared.current_namespace();
        {
            let mut writer = self.shared.writer.lock().await;
            if let Some(sink) = writer.as_mut() {
                ignore_closed(sink.send(Message::Text(encode_disconnect(&namespace))).await)?;
                ignore_closed(sink.send(Message::Text(ENGINE_CLOSE.to_string())).await)?;
                ignore_closed(sink.close().await)?;
            }
        }

        // Let the supervisor observe the close and report the disconnect
        let mut state = self.shared.state.subscribe();
        let closed = async {
            loop {
                let done = *state.borrow_and_update() == ConnectionState::Disconnected;
                if done || state.changed().await.is_err() {
                    break;
                }
            }
        };
        if timeout(self.shared.config.connect_timeout, closed).await.is_err() {
            warn!("Gateway did not acknowledge disconnect in time");
        }

        Ok(())
    }

    async fn shutdown(&self) {
        self.shared.closing.store(true, Ordering::SeqCst);
        let generation = self.shared.generation.fetch_add(1, Ordering::SeqCst) + 1;
        self.replace_supervisor(None);
        self.shared.end_session(generation).await;
        self.shared.state.send_replace(ConnectionState::Disconnected);
        debug!("Transport shut down");
    }

    async fn wait(&self) {
        let mut state = self.shared.state.subscribe();
        loop {
            let done = *state.borrow_and_update() == ConnectionState::Disconnected;
            if done || state.changed().await.is_err() {
                return;
            }
        }
    }
}

fn ignore_closed<T>(result: Result<T, WsError>) -> Result<(), GatewayError> {
    match result {
        Ok(_) | Err(WsError::ConnectionClosed) | Err(WsError::AlreadyClosed) => Ok(()),
        Err(e) => Err(GatewayError::Communication(format!(
            "Failed to close session: {}",
            e
        ))),
    }
}

fn reply_from_args(mut args: Vec<Value>) -> Option<Value> {
    match args.len() {
        0 => None,
        1 => args.pop(),
        _ => Some(Value::Array(args)),
    }
}

/// Run the full handshake, bounded by `connect_timeout`.
async fn establish(
    config: &TransportConfig,
    options: &ConnectOptions,
) -> Result<Session, GatewayError> {
    let url = endpoint_url(&options.url)?;
    let namespace = if options.namespace.is_empty() {
        ROOT_NAMESPACE.to_string()
    } else {
        options.namespace.clone()
    };

    info!(url = %url, namespace = %namespace, "Connecting to gateway");

    timeout(config.connect_timeout, handshake(&url, &namespace, options))
        .await
        .map_err(|_| GatewayError::Communication("Gateway handshake timed out".into()))?
}

async fn handshake(
    url: &str,
    namespace: &str,
    options: &ConnectOptions,
) -> Result<Session, GatewayError> {
    // Step 1: WebSocket upgrade with identifying headers
    let mut ws = WsConnection::connect(url, &options.headers).await?;

    // Step 2: Engine.IO open
    let handshake = loop {
        let frame = ws.recv_text().await?.ok_or_else(|| {
            GatewayError::Communication("Gateway closed connection before open".into())
        })?;
        match decode_engine(&frame)? {
            EnginePacket::Open(handshake) => break handshake,
            EnginePacket::Noop => continue,
            other => {
                return Err(GatewayError::Protocol(format!(
                    "Expected open packet, got {:?}",
                    other
                )))
            }
        }
    };
    debug!(sid = %handshake.sid, "Engine.IO session opened");

    // Step 3: Join the namespace with the auth object
    ws.send_text(encode_connect(namespace, &options.auth)?).await?;

    loop {
        let frame = ws.recv_text().await?.ok_or_else(|| {
            GatewayError::Communication("Gateway closed connection during handshake".into())
        })?;
        match decode_engine(&frame)? {
            EnginePacket::Ping(data) => ws.send_text(encode_pong(&data)).await?,
            EnginePacket::Close => {
                return Err(GatewayError::Communication(
                    "Gateway closed session during handshake".into(),
                ))
            }
            EnginePacket::Message(payload) => match decode_socket(&payload)? {
                SocketPacket::Connect { namespace: ns, .. } if ns == namespace => break,
                SocketPacket::ConnectError {
                    namespace: ns,
                    message,
                    ..
                } if ns == namespace => return Err(GatewayError::Authentication(message)),
                other => debug!(packet = ?other, "Ignoring packet during handshake"),
            },
            _ => {}
        }
    }

    let (sink, stream) = ws.split();
    Ok(Session {
        sink,
        stream,
        handshake,
        namespace: namespace.to_string(),
    })
}

/// Owns the receive half across sessions of one generation: reads, reports
/// lifecycle events, and reconnects.
async fn supervise(
    shared: Arc<Shared>,
    generation: u64,
    mut stream: WsStream,
    mut handshake: Handshake,
    options: ConnectOptions,
) {
    loop {
        shared.enqueue(CONNECT_EVENT.to_string(), Vec::new());

        let namespace = shared.current_namespace();
        let mut end = read_loop(&shared, &mut stream, &handshake, &namespace).await;
        if shared.closing.load(Ordering::SeqCst) {
            end = SessionEnd::ClientDisconnect;
        }

        shared.end_session(generation).await;
        let resume = end.is_recoverable() && shared.config.reconnect;

        // State first: a handler reacting to the disconnect must see it
        let next = if resume {
            ConnectionState::Reconnecting
        } else {
            ConnectionState::Disconnected
        };
        shared.set_state(generation, next);

        info!(reason = %end.reason(), "Gateway session ended");
        shared.enqueue(DISCONNECT_EVENT.to_string(), vec![Value::String(end.reason())]);

        if !resume {
            break;
        }

        let session = match reconnect(&shared, &options).await {
            Some(session) => session,
            None => {
                shared.set_state(generation, ConnectionState::Disconnected);
                break;
            }
        };
        match shared.install(generation, session).await {
            Some(current) => (stream, handshake) = current,
            None => break,
        }
    }

    debug!(generation = generation, "Supervisor ended");
}

async fn reconnect(shared: &Shared, options: &ConnectOptions) -> Option<Session> {
    let max = shared.config.max_reconnect_attempts;
    let mut attempts = 0u32;

    loop {
        if max > 0 && attempts >= max {
            error!(attempts = attempts, "Max reconnection attempts exceeded");
            return None;
        }
        attempts += 1;

        tokio::time::sleep(shared.config.reconnect_delay).await;
        if shared.closing.load(Ordering::SeqCst) {
            return None;
        }

        warn!(attempt = attempts, max = max, "Session lost, attempting reconnection");
        match establish(&shared.config, options).await {
            Ok(session) => {
                info!(attempt = attempts, "Reconnection successful");
                return Some(session);
            }
            Err(e) => error!(error = %e, attempt = attempts, "Reconnection failed"),
        }
    }
}

/// Read frames until the session ends.
async fn read_loop(
    shared: &Shared,
    stream: &mut WsStream,
    handshake: &Handshake,
    namespace: &str,
) -> SessionEnd {
    // The server pings every ping_interval and gives up after ping_timeout
    let liveness = Duration::from_millis(handshake.ping_interval + handshake.ping_timeout);

    loop {
        let next = match timeout(liveness, stream.next()).await {
            Ok(next) => next,
            Err(_) => return SessionEnd::PingTimeout,
        };

        let frame = match next {
            Some(Ok(Message::Text(text))) => text,
            Some(Ok(Message::Close(frame))) => {
                debug!(frame = ?frame, "Gateway closed WebSocket");
                return SessionEnd::TransportClose;
            }
            Some(Ok(_)) => continue,
            Some(Err(e)) => return SessionEnd::TransportError(e.to_string()),
            None => return SessionEnd::TransportClose,
        };

        let packet = match decode_engine(&frame) {
            Ok(packet) => packet,
            Err(e) => {
                warn!(error = %e, "Failed to decode engine packet");
                continue;
            }
        };

        match packet {
            EnginePacket::Ping(data) => {
                if let Err(e) = shared.send(encode_pong(&data)).await {
                    return SessionEnd::TransportError(e.to_string());
                }
            }
            EnginePacket::Close => return SessionEnd::TransportClose,
            EnginePacket::Message(payload) => match decode_socket(&payload) {
                Ok(SocketPacket::Event {
                    namespace: ns,
                    id,
                    event,
                    args,
                }) if ns == namespace => {
                    if let Some(id) = id {
                        // Handlers produce no reply value; acknowledge on receipt
                        match encode_ack(namespace, id, &[]) {
                            Ok(ack) => {
                                if let Err(e) = shared.send(ack).await {
                                    warn!(error = %e, id = id, "Failed to acknowledge event");
                                }
                            }
                            Err(e) => warn!(error = %e, "Failed to encode ack"),
                        }
                    }
                    shared.enqueue(event, args);
                }
                Ok(SocketPacket::Ack {
                    namespace: ns,
                    id,
                    args,
                }) if ns == namespace => shared.resolve(id, args),
                Ok(SocketPacket::Disconnect { namespace: ns }) if ns == namespace => {
                    return SessionEnd::ServerDisconnect
                }
                Ok(SocketPacket::Unsupported { kind, .. }) => {
                    warn!(kind = kind, "Binary packets are not supported, skipping");
                }
                Ok(other) => debug!(packet = ?other, "Ignoring packet"),
                Err(e) => warn!(error = %e, "Failed to decode socket packet"),
            },
            _ => {}
        }
    }
}

/// Deliver queued events to the sink, strictly one at a time.
async fn dispatch_loop(shared: Arc<Shared>, mut events: mpsc::UnboundedReceiver<InboundEvent>) {
    while let Some((event, args)) = events.recv().await {
        shared.backlog.fetch_sub(1, Ordering::SeqCst);
        match shared.event_sink() {
            Some(sink) => sink.handle_event(&event, args).await,
            None => debug!(event = %event, "No event sink installed, dropping event"),
        }
    }
    debug!("Dispatch loop ended");
}
