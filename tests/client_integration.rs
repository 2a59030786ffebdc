//! Integration tests for GatewayClient
//!
//! These tests drive the client through an in-memory transport, so they
//! exercise connect/dispatch/call semantics without any network.

use async_trait::async_trait;
use onlycat_gateway::{
    ClientConfig, ConnectOptions, EventSink, GatewayClient, GatewayError, Transport, CONNECT_EVENT,
};
use serde_json::{json, Value};
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::watch;
use tokio_test::{assert_err, assert_ok};

/// How a fake connect attempt should fail
#[derive(Clone, Copy)]
enum ConnectFailure {
    Authentication,
    Communication,
}

/// Transport double that records what the client asks of it.
struct FakeTransport {
    sink: Mutex<Option<Arc<dyn EventSink>>>,
    connected: watch::Sender<bool>,
    handshakes: AtomicUsize,
    disconnects: AtomicUsize,
    shutdowns: AtomicUsize,
    last_options: Mutex<Option<ConnectOptions>>,
    connect_failure: Mutex<Option<ConnectFailure>>,
    disconnect_fails: AtomicBool,
    replies: Mutex<HashMap<String, Option<Value>>>,
    calls: Mutex<Vec<(String, Value)>>,
}

impl FakeTransport {
    fn new() -> Arc<Self> {
        let (connected, _) = watch::channel(false);
        Arc::new(Self {
            sink: Mutex::new(None),
            connected,
            handshakes: AtomicUsize::new(0),
            disconnects: AtomicUsize::new(0),
            shutdowns: AtomicUsize::new(0),
            last_options: Mutex::new(None),
            connect_failure: Mutex::new(None),
            disconnect_fails: AtomicBool::new(false),
            replies: Mutex::new(HashMap::new()),
            calls: Mutex::new(Vec::new()),
        })
    }

    fn reply_to(&self, event: &str, reply: Option<Value>) {
        self.replies.lock().unwrap().insert(event.to_string(), reply);
    }

    fn fail_connect(&self, failure: ConnectFailure) {
        *self.connect_failure.lock().unwrap() = Some(failure);
    }

    /// Push an event as if it arrived from the gateway.
    async fn emit(&self, event: &str, args: Vec<Value>) {
        let sink = self.sink.lock().unwrap().clone();
        if let Some(sink) = sink {
            sink.handle_event(event, args).await;
        }
    }

    /// Simulate the transport's own backoff bringing the session back.
    async fn simulate_reconnect(&self) {
        self.connected.send_replace(false);
        self.handshakes.fetch_add(1, Ordering::SeqCst);
        self.connected.send_replace(true);
        self.emit(CONNECT_EVENT, Vec::new()).await;
    }

    fn handshakes(&self) -> usize {
        self.handshakes.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Transport for FakeTransport {
    fn on_any(&self, sink: Arc<dyn EventSink>) {
        *self.sink.lock().unwrap() = Some(sink);
    }

    fn is_connected(&self) -> bool {
        *self.connected.borrow()
    }

    async fn connect(&self, options: ConnectOptions) -> Result<(), GatewayError> {
        self.handshakes.fetch_add(1, Ordering::SeqCst);
        *self.last_options.lock().unwrap() = Some(options);

        let failure = *self.connect_failure.lock().unwrap();
        match failure {
            Some(ConnectFailure::Authentication) => {
                return Err(GatewayError::Authentication("invalid token".into()))
            }
            Some(ConnectFailure::Communication) => {
                return Err(GatewayError::Communication("connection refused".into()))
            }
            None => {}
        }

        self.connected.send_replace(true);
        self.emit(CONNECT_EVENT, Vec::new()).await;
        Ok(())
    }

    async fn call(&self, event: &str, payload: Value) -> Result<Option<Value>, GatewayError> {
        if !self.is_connected() {
            return Err(GatewayError::Communication("Not connected to gateway".into()));
        }
        self.calls
            .lock()
            .unwrap()
            .push((event.to_string(), payload));
        let reply = self.replies.lock().unwrap().get(event).cloned().flatten();
        Ok(reply)
    }

    async fn disconnect(&self) -> Result<(), GatewayError> {
        self.disconnects.fetch_add(1, Ordering::SeqCst);
        if self.disconnect_fails.load(Ordering::SeqCst) {
            return Err(GatewayError::Communication("socket write failed".into()));
        }
        self.connected.send_replace(false);
        Ok(())
    }

    async fn shutdown(&self) {
        self.shutdowns.fetch_add(1, Ordering::SeqCst);
        self.connected.send_replace(false);
    }

    async fn wait(&self) {
        let mut connected = self.connected.subscribe();
        loop {
            let done = !*connected.borrow_and_update();
            if done || connected.changed().await.is_err() {
                return;
            }
        }
    }
}

type Calls = Arc<Mutex<Vec<Vec<Value>>>>;

fn record(client: &GatewayClient, event: &str) -> Calls {
    let calls: Calls = Arc::default();
    let sink = Arc::clone(&calls);
    client.add_event_listener(event, move |args| {
        let sink = Arc::clone(&sink);
        async move {
            sink.lock().unwrap().push(args);
            Ok(())
        }
    });
    calls
}

fn client_with(fake: &Arc<FakeTransport>) -> GatewayClient {
    GatewayClient::with_transport("test-token", ClientConfig::default(), fake.clone())
}

#[tokio::test]
async fn test_connect_is_idempotent() {
    let fake = FakeTransport::new();
    let client = client_with(&fake);

    assert_ok!(client.connect().await);
    assert_ok!(client.connect().await);

    assert_eq!(fake.handshakes(), 1);
    assert!(client.is_connected());
}

#[tokio::test]
async fn test_connect_sends_identity_and_token() {
    let fake = FakeTransport::new();
    let client = client_with(&fake);

    assert_ok!(client.connect().await);

    let options = fake.last_options.lock().unwrap().clone().unwrap();
    assert_eq!(options.url, "https://gateway.onlycat.com");
    assert_eq!(options.namespace, "/");
    assert_eq!(
        options.headers,
        vec![
            ("platform".to_string(), "home-assistant".to_string()),
            ("device".to_string(), "onlycat-hass".to_string()),
        ]
    );
    assert_eq!(options.auth, json!({"token": "test-token"}));
}

#[tokio::test]
async fn test_connect_listener_runs_after_handshake() {
    let fake = FakeTransport::new();
    let client = client_with(&fake);

    let seen: Arc<Mutex<Vec<(usize, Vec<Value>)>>> = Arc::default();
    let observer = Arc::clone(&seen);
    let transport = Arc::clone(&fake);
    client.add_event_listener("connect", move |args| {
        let observer = Arc::clone(&observer);
        let transport = Arc::clone(&transport);
        async move {
            observer.lock().unwrap().push((transport.handshakes(), args));
            Ok(())
        }
    });

    assert_ok!(client.connect().await);

    let seen = seen.lock().unwrap();
    assert_eq!(seen.len(), 1);
    assert_eq!(seen[0].0, 1, "listener should run after the handshake");
    assert!(seen[0].1.is_empty(), "connect carries no arguments");
}

#[tokio::test]
async fn test_connect_listener_runs_on_every_reconnect() {
    let fake = FakeTransport::new();
    let client = client_with(&fake);
    let connects = record(&client, CONNECT_EVENT);

    assert_ok!(client.connect().await);
    fake.simulate_reconnect().await;
    fake.simulate_reconnect().await;

    assert_eq!(connects.lock().unwrap().len(), 3);
    // The built-in bootstrap listener is still first in line
    assert_eq!(client.listener_count(CONNECT_EVENT), 2);
}

#[tokio::test]
async fn test_failing_handler_is_contained() {
    let fake = FakeTransport::new();
    let client = client_with(&fake);

    client.add_event_listener("ping", |_args| async {
        Err(anyhow::anyhow!("synthetic error"))
    });
    let h2 = record(&client, "ping");

    client.handle_event("ping", vec![json!("payload")]).await;

    assert_eq!(*h2.lock().unwrap(), vec![vec![json!("payload")]]);
}

#[tokio::test]
async fn test_unregistered_event_is_ignored() {
    let fake = FakeTransport::new();
    let client = client_with(&fake);
    let other = record(&client, "deviceEvent");

    client.handle_event("nobodyListens", vec![json!(1)]).await;

    assert!(other.lock().unwrap().is_empty());
}

#[tokio::test]
async fn test_inbound_events_reach_handlers_in_order() {
    let fake = FakeTransport::new();
    let client = client_with(&fake);
    let events = record(&client, "deviceEvent");

    assert_ok!(client.connect().await);
    fake.emit("deviceEvent", vec![json!({"seq": 1})]).await;
    fake.emit("deviceEvent", vec![json!({"seq": 2}), json!("extra")]).await;

    assert_eq!(
        *events.lock().unwrap(),
        vec![
            vec![json!({"seq": 1})],
            vec![json!({"seq": 2}), json!("extra")],
        ]
    );
}

#[tokio::test]
async fn test_send_message_returns_reply() {
    let fake = FakeTransport::new();
    fake.reply_to("getStatus", Some(json!({"status": "ok"})));
    let client = client_with(&fake);

    assert_ok!(client.connect().await);
    let reply = client.send_message("getStatus", json!({"id": 1})).await;

    assert_eq!(assert_ok!(reply), Some(json!({"status": "ok"})));
    assert_eq!(
        *fake.calls.lock().unwrap(),
        vec![("getStatus".to_string(), json!({"id": 1}))]
    );
}

#[tokio::test]
async fn test_send_message_without_reply_payload() {
    let fake = FakeTransport::new();
    fake.reply_to("ack", None);
    let client = client_with(&fake);

    assert_ok!(client.connect().await);
    assert_eq!(assert_ok!(client.send_message("ack", json!(null)).await), None);
}

#[tokio::test]
async fn test_send_message_while_disconnected() {
    let fake = FakeTransport::new();
    let client = client_with(&fake);

    let err = assert_err!(client.send_message("getStatus", json!({"id": 1})).await);

    assert!(err.is_communication());
    assert!(fake.calls.lock().unwrap().is_empty());
}

#[tokio::test]
async fn test_authentication_failure_is_distinct() {
    let fake = FakeTransport::new();
    fake.fail_connect(ConnectFailure::Authentication);
    let client = client_with(&fake);
    let connects = record(&client, CONNECT_EVENT);

    let err = assert_err!(client.connect().await);

    assert!(err.is_authentication());
    assert!(!err.is_communication());
    assert!(!client.is_connected());
    assert!(connects.lock().unwrap().is_empty());
}

#[tokio::test]
async fn test_communication_failure_is_distinct() {
    let fake = FakeTransport::new();
    fake.fail_connect(ConnectFailure::Communication);
    let client = client_with(&fake);

    let err = assert_err!(client.connect().await);

    assert!(err.is_communication());
    assert!(!err.is_authentication());
}

#[tokio::test]
async fn test_disconnect_when_never_connected() {
    let fake = FakeTransport::new();
    let client = client_with(&fake);

    client.disconnect().await;
    client.disconnect().await;

    assert_eq!(fake.disconnects.load(Ordering::SeqCst), 2);
    assert_eq!(fake.shutdowns.load(Ordering::SeqCst), 2);
}

#[tokio::test]
async fn test_disconnect_always_shuts_down() {
    let fake = FakeTransport::new();
    let client = client_with(&fake);
    assert_ok!(client.connect().await);

    fake.disconnect_fails.store(true, Ordering::SeqCst);
    client.disconnect().await;

    assert_eq!(fake.disconnects.load(Ordering::SeqCst), 1);
    assert_eq!(fake.shutdowns.load(Ordering::SeqCst), 1);
    assert!(!client.is_connected());
}

#[tokio::test]
async fn test_reconnect_after_disconnect() {
    let fake = FakeTransport::new();
    let client = client_with(&fake);

    assert_ok!(client.connect().await);
    client.disconnect().await;
    assert_ok!(client.connect().await);

    assert_eq!(fake.handshakes(), 2);
    assert!(client.is_connected());
}

#[tokio::test]
async fn test_wait_returns_after_disconnect() {
    let fake = FakeTransport::new();
    let client = Arc::new(client_with(&fake));
    assert_ok!(client.connect().await);

    let waiter = {
        let client = Arc::clone(&client);
        tokio::spawn(async move { client.wait().await })
    };

    tokio::time::sleep(Duration::from_millis(20)).await;
    assert!(!waiter.is_finished());

    client.disconnect().await;
    let joined = tokio::time::timeout(Duration::from_secs(1), waiter).await;
    assert!(matches!(joined, Ok(Ok(()))));
}
