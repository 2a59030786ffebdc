//! Socket.IO Wire Protocol
//!
//! Single responsibility: Encode and decode Engine.IO v4 / Socket.IO v5 text packets.
//!
//! # Wire Format
//!
//! Every WebSocket text frame is one Engine.IO packet:
//!
//! ```text
//! <engine type digit><data>
//!
//! 0  open     {"sid": "...", "pingInterval": 25000, "pingTimeout": 20000, ...}
//! 1  close
//! 2  ping     (server -> client, answered with 3)
//! 3  pong
//! 4  message  <socket.io packet>
//! 5  upgrade
//! 6  noop
//! ```
//!
//! A Socket.IO packet carried in an Engine.IO message:
//!
//! ```text
//! <type digit>[<attachments>-][/<namespace>,][<ack id>][<json>]
//!
//! 0  CONNECT        40{"token":"..."}          40/admin,{"token":"..."}
//! 1  DISCONNECT     41
//! 2  EVENT          42["event",arg1,arg2]     4212["event",arg]   (ack requested, id 12)
//! 3  ACK            4312[reply]
//! 4  CONNECT_ERROR  44{"message":"Not authorized"}
//! 5  BINARY_EVENT   (not supported)
//! 6  BINARY_ACK     (not supported)
//! ```
//!
//! The root namespace `/` is never written on the wire.

use serde::Deserialize;
use serde_json::Value;
use url::Url;

use crate::error::GatewayError;

/// Root namespace.
pub const ROOT_NAMESPACE: &str = "/";

/// Engine.IO close packet.
pub const ENGINE_CLOSE: &str = "1";

/// Engine.IO handshake data carried by the open packet.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Handshake {
    pub sid: String,
    /// Milliseconds between server pings
    pub ping_interval: u64,
    /// Milliseconds the server waits for a pong
    pub ping_timeout: u64,
    #[serde(default)]
    pub max_payload: Option<u64>,
}

/// A decoded Engine.IO packet.
#[derive(Debug, Clone, PartialEq)]
pub enum EnginePacket {
    Open(Handshake),
    Close,
    Ping(String),
    Pong(String),
    Message(String),
    Upgrade,
    Noop,
}

/// A decoded Socket.IO packet.
#[derive(Debug, Clone, PartialEq)]
pub enum SocketPacket {
    Connect {
        namespace: String,
        data: Option<Value>,
    },
    Disconnect {
        namespace: String,
    },
    Event {
        namespace: String,
        id: Option<u64>,
        event: String,
        args: Vec<Value>,
    },
    Ack {
        namespace: String,
        id: u64,
        args: Vec<Value>,
    },
    ConnectError {
        namespace: String,
        message: String,
        data: Option<Value>,
    },
    /// Binary packets, which this client does not handle.
    Unsupported {
        namespace: String,
        kind: u8,
    },
}

/// Decode one Engine.IO text frame.
pub fn decode_engine(frame: &str) -> Result<EnginePacket, GatewayError> {
    let kind = frame
        .as_bytes()
        .first()
        .copied()
        .ok_or_else(|| GatewayError::Protocol("Empty engine packet".into()))?;
    if !kind.is_ascii_digit() {
        return Err(GatewayError::Protocol(format!(
            "Invalid engine packet type: {:?}",
            kind as char
        )));
    }
    let data = &frame[1..];

    match kind {
        b'0' => {
            let handshake = serde_json::from_str(data)
                .map_err(|e| GatewayError::Protocol(format!("Invalid open packet: {}", e)))?;
            Ok(EnginePacket::Open(handshake))
        }
        b'1' => Ok(EnginePacket::Close),
        b'2' => Ok(EnginePacket::Ping(data.to_string())),
        b'3' => Ok(EnginePacket::Pong(data.to_string())),
        b'4' => Ok(EnginePacket::Message(data.to_string())),
        b'5' => Ok(EnginePacket::Upgrade),
        b'6' => Ok(EnginePacket::Noop),
        other => Err(GatewayError::Protocol(format!(
            "Unknown engine packet type: {}",
            other as char
        ))),
    }
}

/// Pong answering a ping that carried `data`.
pub fn encode_pong(data: &str) -> String {
    format!("3{}", data)
}

/// Decode the Socket.IO packet carried in an Engine.IO message.
pub fn decode_socket(payload: &str) -> Result<SocketPacket, GatewayError> {
    let kind = payload
        .as_bytes()
        .first()
        .copied()
        .filter(u8::is_ascii_digit)
        .ok_or_else(|| GatewayError::Protocol(format!("Invalid socket packet: {:?}", payload)))?
        - b'0';
    let mut rest = &payload[1..];

    // Binary packets carry an attachment count before the namespace
    if kind == 5 || kind == 6 {
        if let Some(dash) = rest.find('-') {
            rest = &rest[dash + 1..];
        }
    }

    let namespace = if rest.starts_with('/') {
        match rest.find(',') {
            Some(comma) => {
                let namespace = &rest[..comma];
                rest = &rest[comma + 1..];
                namespace
            }
            None => std::mem::take(&mut rest),
        }
    } else {
        ROOT_NAMESPACE
    }
    .to_string();

    if kind == 5 || kind == 6 {
        return Ok(SocketPacket::Unsupported { namespace, kind });
    }

    let digits = rest
        .find(|c: char| !c.is_ascii_digit())
        .unwrap_or(rest.len());
    let id = if digits > 0 {
        Some(
            rest[..digits]
                .parse::<u64>()
                .map_err(|e| GatewayError::Protocol(format!("Invalid ack id: {}", e)))?,
        )
    } else {
        None
    };
    rest = &rest[digits..];

    let body = if rest.trim().is_empty() {
        None
    } else {
        Some(
            serde_json::from_str::<Value>(rest)
                .map_err(|e| GatewayError::Protocol(format!("Invalid packet body: {}", e)))?,
        )
    };

    match kind {
        0 => Ok(SocketPacket::Connect { namespace, data: body }),
        1 => Ok(SocketPacket::Disconnect { namespace }),
        2 => {
            let mut items = match body {
                Some(Value::Array(items)) => items.into_iter(),
                _ => return Err(GatewayError::Protocol("Event body is not an array".into())),
            };
            let event = match items.next() {
                Some(Value::String(event)) => event,
                _ => return Err(GatewayError::Protocol("Event name missing".into())),
            };
            Ok(SocketPacket::Event {
                namespace,
                id,
                event,
                args: items.collect(),
            })
        }
        3 => {
            let id = id.ok_or_else(|| GatewayError::Protocol("Ack without id".into()))?;
            let args = match body {
                Some(Value::Array(items)) => items,
                None => Vec::new(),
                Some(_) => return Err(GatewayError::Protocol("Ack body is not an array".into())),
            };
            Ok(SocketPacket::Ack { namespace, id, args })
        }
        4 => {
            let message = body
                .as_ref()
                .and_then(|b| b.get("message").and_then(Value::as_str).or_else(|| b.as_str()))
                .unwrap_or("Connection refused")
                .to_string();
            let data = body.as_ref().and_then(|b| b.get("data")).cloned();
            Ok(SocketPacket::ConnectError {
                namespace,
                message,
                data,
            })
        }
        other => Err(GatewayError::Protocol(format!(
            "Unknown socket packet type: {}",
            other
        ))),
    }
}

fn namespace_prefix(namespace: &str) -> String {
    if namespace.is_empty() || namespace == ROOT_NAMESPACE {
        String::new()
    } else {
        format!("{},", namespace)
    }
}

/// Namespace connect carrying the auth object, wrapped in an Engine.IO message.
pub fn encode_connect(namespace: &str, auth: &Value) -> Result<String, GatewayError> {
    let body = if auth.is_null() {
        String::new()
    } else {
        serde_json::to_string(auth)?
    };
    Ok(format!("40{}{}", namespace_prefix(namespace), body))
}

/// Namespace disconnect, wrapped in an Engine.IO message.
pub fn encode_disconnect(namespace: &str) -> String {
    let prefix = namespace_prefix(namespace);
    format!("41{}", prefix.trim_end_matches(','))
}

/// Event with a single payload argument, optionally requesting an ack.
pub fn encode_event(
    namespace: &str,
    id: Option<u64>,
    event: &str,
    payload: &Value,
) -> Result<String, GatewayError> {
    let body = serde_json::to_string(&Value::Array(vec![
        Value::String(event.to_string()),
        payload.clone(),
    ]))?;
    let id = id.map(|id| id.to_string()).unwrap_or_default();
    Ok(format!("42{}{}{}", namespace_prefix(namespace), id, body))
}

/// Ack for a server event that requested one.
pub fn encode_ack(namespace: &str, id: u64, args: &[Value]) -> Result<String, GatewayError> {
    let body = serde_json::to_string(args)?;
    Ok(format!("43{}{}{}", namespace_prefix(namespace), id, body))
}

/// Build the WebSocket endpoint for a gateway base URL.
///
/// `https://gateway.example.com` becomes
/// `wss://gateway.example.com/socket.io/?EIO=4&transport=websocket`.
pub fn endpoint_url(base: &str) -> Result<String, GatewayError> {
    let mut url = Url::parse(base)
        .map_err(|e| GatewayError::Config(format!("Invalid gateway URL {}: {}", base, e)))?;

    let scheme = match url.scheme() {
        "http" | "ws" => "ws",
        "https" | "wss" => "wss",
        other => {
            return Err(GatewayError::Config(format!(
                "Unsupported gateway URL scheme: {}",
                other
            )))
        }
    };
    url.set_scheme(scheme)
        .map_err(|_| GatewayError::Config(format!("Cannot use scheme {} for {}", scheme, base)))?;

    let path = url.path().trim_end_matches('/').to_string();
    if path.ends_with("/socket.io") {
        url.set_path(&format!("{}/", path));
    } else {
        url.set_path(&format!("{}/socket.io/", path));
    }

    url.query_pairs_mut()
        .append_pair("EIO", "4")
        .append_pair("transport", "websocket");

    Ok(url.to_string())
}
