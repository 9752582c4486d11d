use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use rand::Rng;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use thiserror::Error;
use tokio_tungstenite::tungstenite::Utf8Bytes;

/// Signaling errors
#[derive(Debug, Error)]
pub enum SignalingError {
    #[error("media unavailable: {0}")]
    MediaUnavailable(String),

    #[error("negotiation failed: {0}")]
    NegotiationFailed(String),

    #[error("connection not established within {}s", .0.as_secs())]
    ConnectionTimeout(Duration),

    #[error("missing render target: {0}")]
    MissingRenderTarget(String),

    #[error("stream ended in room {0}")]
    RemoteEnded(RoomId),

    #[error("invalid configuration: {0}")]
    Config(String),

    #[error("websocket error: {0}")]
    WebSocket(#[from] tokio_tungstenite::tungstenite::Error),

    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("internal error: {0}")]
    Internal(String),
}

impl SignalingError {
    /// Notice category for session-level errors; transport errors have none.
    pub fn kind(&self) -> Option<NoticeKind> {
        match self {
            SignalingError::MediaUnavailable(_) => Some(NoticeKind::MediaUnavailable),
            SignalingError::NegotiationFailed(_) => Some(NoticeKind::NegotiationFailed),
            SignalingError::ConnectionTimeout(_) => Some(NoticeKind::ConnectionTimeout),
            SignalingError::MissingRenderTarget(_) => Some(NoticeKind::MissingRenderTarget),
            SignalingError::RemoteEnded(_) => Some(NoticeKind::RemoteEnded),
            _ => None,
        }
    }

    /// Only negotiation failures earn the publisher its automatic retry.
    pub fn is_retryable(&self) -> bool {
        matches!(self, SignalingError::NegotiationFailed(_))
    }
}

const CONNECTION_ID_LEN: usize = 13;
const HEX_CHARS: &[u8] = b"0123456789abcdef";

/// Room identifier as used by the message channel
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct RoomId(Arc<str>);

impl RoomId {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for RoomId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for RoomId {
    fn from(s: &str) -> Self {
        Self(Arc::from(s))
    }
}

impl From<String> for RoomId {
    fn from(s: String) -> Self {
        Self(Arc::from(s))
    }
}

impl From<&RoomId> for RoomId {
    fn from(room: &RoomId) -> Self {
        room.clone()
    }
}

impl Serialize for RoomId {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.as_str())
    }
}

impl<'de> Deserialize<'de> for RoomId {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        Ok(RoomId::from(s))
    }
}

/// Connection ID: 13-byte fixed array ("conn_" + 8 hex), one per channel connection
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ConnectionId {
    bytes: [u8; CONNECTION_ID_LEN],
}

impl ConnectionId {
    pub fn generate() -> Self {
        let mut bytes = [0u8; CONNECTION_ID_LEN];
        bytes[..5].copy_from_slice(b"conn_");

        let mut rng = rand::rng();
        let value: u32 = rng.random();

        for i in 0..8 {
            let nibble = ((value >> (28 - i * 4)) & 0xF) as usize;
            bytes[5 + i] = HEX_CHARS[nibble];
        }
        Self { bytes }
    }

    pub fn as_str(&self) -> &str {
        std::str::from_utf8(&self.bytes).unwrap_or("")
    }
}

impl fmt::Display for ConnectionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Which side of the media session this participant plays
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    Publisher,
    Subscriber,
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Role::Publisher => f.write_str("publisher"),
            Role::Subscriber => f.write_str("subscriber"),
        }
    }
}

/// Session connection state. `Connecting` covers the whole negotiation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConnectionState {
    New,
    Connecting,
    Connected,
    Failed,
    Closed,
}

impl ConnectionState {
    pub fn is_active(self) -> bool {
        matches!(self, ConnectionState::Connecting | ConnectionState::Connected)
    }
}

/// User-visible failure categories
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NoticeKind {
    MediaUnavailable,
    NegotiationFailed,
    ConnectionTimeout,
    MissingRenderTarget,
    RemoteEnded,
}

/// Transient notice for the host page
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Notice {
    pub room: RoomId,
    pub kind: NoticeKind,
    pub message: String,
}

/// Everything the coordinator reports to its observers
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CoordinatorEvent {
    StateChanged {
        room: RoomId,
        role: Role,
        state: ConnectionState,
    },
    Notice(Notice),
}

/// Result of a `start_publishing` request
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StartOutcome {
    Started,
    /// A publisher session for the room is already negotiating or connected.
    AlreadyActive,
}

/// Wrapper for outbound WebSocket text frames using tungstenite's Utf8Bytes.
#[derive(Debug, Clone)]
pub struct OutboundMessage(Utf8Bytes);

impl OutboundMessage {
    /// Serialize any wire message into a text frame payload
    pub fn encode<T: Serialize>(msg: &T) -> Result<Self, SignalingError> {
        Ok(Self::from(serde_json::to_string(msg)?))
    }

    /// Get the inner Utf8Bytes for tungstenite Message::Text
    pub fn into_inner(self) -> Utf8Bytes {
        self.0
    }
}

impl From<String> for OutboundMessage {
    fn from(s: String) -> Self {
        Self(Utf8Bytes::from(s))
    }
}
