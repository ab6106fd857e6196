//! Crate-level error type.
//!
//! Every failure in this crate is local: a view logs the error and degrades
//! one feature. Only startup failures in the binary are fatal.

use thiserror::Error;

/// Errors produced by the transport, the HTTP helpers, and config loading.
#[derive(Debug, Error)]
pub enum WebchatError {
    /// The server replied with a non-2xx HTTP status code.
    #[error("HTTP {status} from {url}")]
    Http { status: u16, url: String },

    /// A TCP-level connection could not be established or the request failed.
    #[error("connection failed to {url}: {detail}")]
    Connect { url: String, detail: String },

    /// A response body or event payload could not be decoded.
    #[error("JSON decode error on '{context}': {source}")]
    Json {
        context: String,
        #[source]
        source: serde_json::Error,
    },

    /// The server returned `{"success": false, ...}`.
    #[error("{0}")]
    Api(String),

    /// WebSocket handshake or I/O failure.
    #[error("websocket error: {0}")]
    WebSocket(#[from] tokio_tungstenite::tungstenite::Error),

    /// A malformed Engine.IO or Socket.IO packet.
    #[error("malformed packet: {0}")]
    Framing(String),

    #[error("config I/O error on {path}: {source}")]
    ConfigIo {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("config parse error: {0}")]
    ConfigParse(#[from] toml::de::Error),

    /// A config value parsed but is out of range.
    #[error("invalid config: {0}")]
    ConfigInvalid(String),
}

impl WebchatError {
    pub(crate) fn json(context: impl Into<String>, source: serde_json::Error) -> Self {
        WebchatError::Json {
            context: context.into(),
            source,
        }
    }
}

pub type Result<T> = std::result::Result<T, WebchatError>;
