//! Socket.IO event channel over a WebSocket.
//!
//! Only the pieces the relay uses are implemented: Engine.IO v4 text packets
//! on the `websocket` transport, and Socket.IO v5 CONNECT / DISCONNECT /
//! EVENT / ACK packets without binary attachments.
//!
//! ## Shape
//! - [`EventChannel::spawn`] starts one background task that owns the socket.
//! - Outgoing [`ClientEvent`]s go through an unbounded mpsc sender, so every
//!   emission is fire-and-forget. Events emitted while disconnected stay
//!   queued and flush after the next successful connect.
//! - Inbound traffic arrives as [`Inbound`] values: connect / disconnect
//!   transitions plus decoded [`ServerEvent`]s.

use futures_util::{SinkExt, StreamExt};
use serde::Deserialize;
use serde_json::Value;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::time::Instant;
use tokio_tungstenite::tungstenite::Message as WsMessage;
use tracing::{debug, info, warn};

use crate::error::{Result, WebchatError};
use crate::protocol::{ClientEvent, ServerEvent};

// ---------------------------------------------------------------------------
// Emission seam
// ---------------------------------------------------------------------------

/// Anything a view can hand a [`ClientEvent`] to.
pub trait Emit {
    fn emit(&self, event: ClientEvent);
}

impl Emit for mpsc::UnboundedSender<ClientEvent> {
    fn emit(&self, event: ClientEvent) {
        debug!(event = event.name(), "emit");
        if self.send(event).is_err() {
            warn!("event channel closed, dropping emission");
        }
    }
}

// ---------------------------------------------------------------------------
// Engine.IO packets
// ---------------------------------------------------------------------------

/// Payload of the Engine.IO `open` packet.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Handshake {
    pub sid: String,
    #[serde(default)]
    pub upgrades: Vec<String>,
    pub ping_interval: u64,
    pub ping_timeout: u64,
    #[serde(default)]
    pub max_payload: Option<u64>,
}

impl Handshake {
    /// How long to wait for a server ping before declaring the link dead.
    pub fn liveness_window(&self) -> Duration {
        Duration::from_millis(self.ping_interval + self.ping_timeout)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EnginePacket {
    Open(Handshake),
    Close,
    Ping(String),
    Pong(String),
    Message(String),
    Upgrade,
    Noop,
}

impl EnginePacket {
    pub fn parse(text: &str) -> Result<Self> {
        let mut chars = text.chars();
        let kind = chars
            .next()
            .ok_or_else(|| WebchatError::Framing("empty engine packet".into()))?;
        let body = chars.as_str();
        Ok(match kind {
            '0' => EnginePacket::Open(
                serde_json::from_str(body).map_err(|e| WebchatError::json("engine open", e))?,
            ),
            '1' => EnginePacket::Close,
            '2' => EnginePacket::Ping(body.to_string()),
            '3' => EnginePacket::Pong(body.to_string()),
            '4' => EnginePacket::Message(body.to_string()),
            '5' => EnginePacket::Upgrade,
            '6' => EnginePacket::Noop,
            other => {
                return Err(WebchatError::Framing(format!(
                    "unknown engine packet type '{other}'"
                )))
            }
        })
    }

    pub fn encode(&self) -> String {
        match self {
            // Clients never send `open`; encode the type byte only.
            EnginePacket::Open(_) => "0".to_string(),
            EnginePacket::Close => "1".to_string(),
            EnginePacket::Ping(data) => format!("2{data}"),
            EnginePacket::Pong(data) => format!("3{data}"),
            EnginePacket::Message(data) => format!("4{data}"),
            EnginePacket::Upgrade => "5".to_string(),
            EnginePacket::Noop => "6".to_string(),
        }
    }
}

// ---------------------------------------------------------------------------
// Socket.IO packets
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq)]
pub enum SocketPacket {
    Connect { namespace: String, data: Option<Value> },
    Disconnect { namespace: String },
    Event {
        namespace: String,
        id: Option<u64>,
        name: String,
        payload: Value,
    },
    Ack {
        namespace: String,
        id: u64,
        data: Value,
    },
    ConnectError { namespace: String, data: Option<Value> },
}

impl SocketPacket {
    pub fn event(name: &str, payload: Option<Value>) -> Self {
        SocketPacket::Event {
            namespace: "/".to_string(),
            id: None,
            name: name.to_string(),
            payload: payload.unwrap_or(Value::Null),
        }
    }

    pub fn parse(text: &str) -> Result<Self> {
        let mut chars = text.chars();
        let kind = chars
            .next()
            .ok_or_else(|| WebchatError::Framing("empty socket packet".into()))?;
        let mut rest = chars.as_str();

        let namespace = if rest.starts_with('/') {
            match rest.find(',') {
                Some(idx) => {
                    let ns = &rest[..idx];
                    rest = &rest[idx + 1..];
                    ns.to_string()
                }
                None => {
                    let ns = rest.to_string();
                    rest = "";
                    ns
                }
            }
        } else {
            "/".to_string()
        };

        let digits = rest.bytes().take_while(u8::is_ascii_digit).count();
        let id = if digits > 0 {
            Some(
                rest[..digits]
                    .parse::<u64>()
                    .map_err(|e| WebchatError::Framing(format!("bad ack id: {e}")))?,
            )
        } else {
            None
        };
        rest = &rest[digits..];

        let data = if rest.is_empty() {
            None
        } else {
            Some(serde_json::from_str::<Value>(rest).map_err(|e| WebchatError::json("socket packet", e))?)
        };

        match kind {
            '0' => Ok(SocketPacket::Connect { namespace, data }),
            '1' => Ok(SocketPacket::Disconnect { namespace }),
            '2' => {
                let mut args = match data {
                    Some(Value::Array(args)) => args.into_iter(),
                    _ => return Err(WebchatError::Framing("event without argument array".into())),
                };
                let name = match args.next() {
                    Some(Value::String(name)) => name,
                    _ => return Err(WebchatError::Framing("event without a name".into())),
                };
                Ok(SocketPacket::Event {
                    namespace,
                    id,
                    name,
                    payload: args.next().unwrap_or(Value::Null),
                })
            }
            '3' => Ok(SocketPacket::Ack {
                namespace,
                id: id.ok_or_else(|| WebchatError::Framing("ack without id".into()))?,
                data: data.unwrap_or(Value::Null),
            }),
            '4' => Ok(SocketPacket::ConnectError { namespace, data }),
            '5' | '6' => Err(WebchatError::Framing(
                "binary packets are not supported".into(),
            )),
            other => Err(WebchatError::Framing(format!(
                "unknown socket packet type '{other}'"
            ))),
        }
    }

    pub fn encode(&self) -> String {
        fn ns_prefix(namespace: &str) -> String {
            if namespace == "/" {
                String::new()
            } else {
                format!("{namespace},")
            }
        }

        match self {
            SocketPacket::Connect { namespace, data } => match data {
                Some(d) => format!("0{}{}", ns_prefix(namespace), d),
                None => format!("0{}", ns_prefix(namespace)),
            },
            SocketPacket::Disconnect { namespace } => format!("1{}", ns_prefix(namespace)),
            SocketPacket::Event {
                namespace,
                id,
                name,
                payload,
            } => {
                let args = if payload.is_null() {
                    Value::Array(vec![Value::String(name.clone())])
                } else {
                    Value::Array(vec![Value::String(name.clone()), payload.clone()])
                };
                let id = id.map(|i| i.to_string()).unwrap_or_default();
                format!("2{}{}{}", ns_prefix(namespace), id, args)
            }
            SocketPacket::Ack {
                namespace,
                id,
                data,
            } => format!("3{}{}{}", ns_prefix(namespace), id, data),
            SocketPacket::ConnectError { namespace, data } => match data {
                Some(d) => format!("4{}{}", ns_prefix(namespace), d),
                None => format!("4{}", ns_prefix(namespace)),
            },
        }
    }
}

/// Full wire text for a client event on the default namespace.
pub fn encode_client_event(event: &ClientEvent) -> String {
    EnginePacket::Message(SocketPacket::event(event.name(), event.payload()).encode()).encode()
}

/// Build the websocket endpoint from an `http(s)://` base URL.
pub fn websocket_url(base_url: &str, path: &str) -> String {
    let base = base_url.trim_end_matches('/');
    let base = if let Some(rest) = base.strip_prefix("https://") {
        format!("wss://{rest}")
    } else if let Some(rest) = base.strip_prefix("http://") {
        format!("ws://{rest}")
    } else {
        base.to_string()
    };
    let path = path.trim_matches('/');
    format!("{base}/{path}/?EIO=4&transport=websocket")
}

// ---------------------------------------------------------------------------
// Channel runtime
// ---------------------------------------------------------------------------

/// What the channel task reports to its owner.
#[derive(Debug, Clone, PartialEq)]
pub enum Inbound {
    Connected,
    Disconnected,
    Event(ServerEvent),
}

#[derive(Debug, Clone)]
pub struct ChannelConfig {
    /// `ws://host/socket.io/?EIO=4&transport=websocket`
    pub url: String,
    /// Delay between reconnect attempts; `None` disables reconnecting.
    pub reconnect_delay: Option<Duration>,
}

impl ChannelConfig {
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            reconnect_delay: Some(Duration::from_secs(2)),
        }
    }
}

/// Handles held by the owner of a running channel.
pub struct EventChannel {
    pub emitter: mpsc::UnboundedSender<ClientEvent>,
    pub inbound: mpsc::UnboundedReceiver<Inbound>,
}

enum SessionEnd {
    /// Every emitter was dropped; stop for good.
    ClientGone,
    /// The server side went away.
    ServerClosed,
}

impl EventChannel {
    /// Spawn the channel task. Must be called inside a tokio runtime.
    pub fn spawn(config: ChannelConfig) -> Self {
        let (out_tx, out_rx) = mpsc::unbounded_channel();
        let (in_tx, in_rx) = mpsc::unbounded_channel();
        tokio::spawn(run(config, out_rx, in_tx));
        EventChannel {
            emitter: out_tx,
            inbound: in_rx,
        }
    }
}

async fn run(
    config: ChannelConfig,
    mut out_rx: mpsc::UnboundedReceiver<ClientEvent>,
    in_tx: mpsc::UnboundedSender<Inbound>,
) {
    loop {
        match session(&config.url, &mut out_rx, &in_tx).await {
            Ok(SessionEnd::ClientGone) => {
                debug!("all emitters dropped, closing event channel");
                return;
            }
            Ok(SessionEnd::ServerClosed) => info!(url = %config.url, "event channel closed by server"),
            Err(e) => warn!(error = %e, url = %config.url, "event channel failed"),
        }

        if in_tx.send(Inbound::Disconnected).is_err() {
            return;
        }
        match config.reconnect_delay {
            Some(delay) => tokio::time::sleep(delay).await,
            None => return,
        }
    }
}

async fn session(
    url: &str,
    out_rx: &mut mpsc::UnboundedReceiver<ClientEvent>,
    in_tx: &mpsc::UnboundedSender<Inbound>,
) -> Result<SessionEnd> {
    let (ws, _resp) = tokio_tungstenite::connect_async(url).await?;
    let (mut sink, mut stream) = ws.split();

    let handshake = loop {
        match stream.next().await {
            Some(Ok(WsMessage::Text(text))) => match EnginePacket::parse(&text)? {
                EnginePacket::Open(h) => break h,
                other => debug!(?other, "ignoring packet before open"),
            },
            Some(Ok(_)) => continue,
            Some(Err(e)) => return Err(e.into()),
            None => return Ok(SessionEnd::ServerClosed),
        }
    };
    debug!(sid = %handshake.sid, ping_interval = handshake.ping_interval, "engine open");

    let connect = SocketPacket::Connect {
        namespace: "/".into(),
        data: None,
    };
    sink.send(WsMessage::Text(EnginePacket::Message(connect.encode()).encode()))
        .await?;

    let window = handshake.liveness_window();
    let mut deadline = Instant::now() + window;
    // Outgoing events wait until the namespace connect is acknowledged.
    let mut connected = false;

    loop {
        tokio::select! {
            out = out_rx.recv(), if connected => {
                match out {
                    Some(event) => {
                        sink.send(WsMessage::Text(encode_client_event(&event))).await?;
                    }
                    None => {
                        let _ = sink.send(WsMessage::Text(EnginePacket::Close.encode())).await;
                        return Ok(SessionEnd::ClientGone);
                    }
                }
            }
            frame = stream.next() => {
                let text = match frame {
                    Some(Ok(WsMessage::Text(text))) => text,
                    Some(Ok(WsMessage::Close(_))) | None => return Ok(SessionEnd::ServerClosed),
                    Some(Ok(_)) => continue,
                    Some(Err(e)) => return Err(e.into()),
                };
                match EnginePacket::parse(&text) {
                    Ok(EnginePacket::Ping(data)) => {
                        deadline = Instant::now() + window;
                        sink.send(WsMessage::Text(EnginePacket::Pong(data).encode())).await?;
                    }
                    Ok(EnginePacket::Close) => return Ok(SessionEnd::ServerClosed),
                    Ok(EnginePacket::Message(body)) => match SocketPacket::parse(&body) {
                        Ok(SocketPacket::Connect { .. }) => {
                            connected = true;
                            info!(url, "event channel connected");
                            if in_tx.send(Inbound::Connected).is_err() {
                                return Ok(SessionEnd::ClientGone);
                            }
                        }
                        Ok(SocketPacket::Disconnect { .. }) => return Ok(SessionEnd::ServerClosed),
                        Ok(SocketPacket::ConnectError { data, .. }) => {
                            return Err(WebchatError::Framing(format!(
                                "namespace connect refused: {}",
                                data.unwrap_or(Value::Null)
                            )));
                        }
                        Ok(SocketPacket::Event { name, payload, .. }) => {
                            match ServerEvent::decode(&name, payload) {
                                Ok(event) => {
                                    if in_tx.send(Inbound::Event(event)).is_err() {
                                        return Ok(SessionEnd::ClientGone);
                                    }
                                }
                                Err(e) => warn!(error = %e, event = %name, "dropping undecodable event"),
                            }
                        }
                        Ok(SocketPacket::Ack { id, .. }) => debug!(id, "ignoring ack"),
                        Err(e) => warn!(error = %e, "dropping malformed socket packet"),
                    },
                    Ok(other) => debug!(?other, "ignoring engine packet"),
                    Err(e) => warn!(error = %e, "dropping malformed engine packet"),
                }
            }
            _ = tokio::time::sleep_until(deadline) => {
                return Err(WebchatError::Framing(format!(
                    "no ping from server within {} ms",
                    window.as_millis()
                )));
            }
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
