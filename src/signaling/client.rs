use std::time::Duration;

use futures_util::{SinkExt, StreamExt};
use tokio::sync::mpsc;
use tokio_tungstenite::tungstenite::{Bytes, Message};
use tracing::{debug, info, warn};

use super::actor::CoordinatorHandle;
use super::messages::{ControlMessage, SignalMessage};
use super::types::{ConnectionId, OutboundMessage, RoomId, SignalingError};

pub const PING_INTERVAL: Duration = Duration::from_secs(30);
pub const PONG_TIMEOUT: Duration = Duration::from_secs(10);

/// Receives signaling messages decoded from the channel
pub trait SignalSink: Send + Sync {
    fn deliver(&self, msg: SignalMessage) -> Result<(), SignalingError>;
}

impl SignalSink for CoordinatorHandle {
    fn deliver(&self, msg: SignalMessage) -> Result<(), SignalingError> {
        CoordinatorHandle::deliver(self, msg)
    }
}

impl SignalSink for mpsc::UnboundedSender<SignalMessage> {
    fn deliver(&self, msg: SignalMessage) -> Result<(), SignalingError> {
        self.send(msg)
            .map_err(|_| SignalingError::Internal("signal receiver dropped".to_string()))
    }
}

/// WebSocket client for the room-keyed message channel.
///
/// Joins its rooms on connect, forwards decoded signaling frames to a sink and
/// writes outgoing messages as JSON text frames. Frames that are not
/// signaling messages (chat, polls, ...) are skipped.
pub struct ChannelClient {
    id: ConnectionId,
    url: String,
    rooms: Vec<RoomId>,
}

impl ChannelClient {
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            id: ConnectionId::generate(),
            url: url.into(),
            rooms: Vec::new(),
        }
    }

    /// Add a room to join once connected
    pub fn join(mut self, room: impl Into<RoomId>) -> Self {
        self.rooms.push(room.into());
        self
    }

    pub fn id(&self) -> ConnectionId {
        self.id
    }

    /// Run until the channel closes, the outbound queue closes, or keepalive fails.
    pub async fn run(
        self,
        sink: impl SignalSink,
        mut outbound: mpsc::UnboundedReceiver<SignalMessage>,
    ) -> Result<(), SignalingError> {
        let (ws_stream, _) = tokio_tungstenite::connect_async(self.url.as_str()).await?;
        let (mut ws_tx, mut ws_rx) = ws_stream.split();

        info!("Connection {} open to {}", self.id, self.url);

        for room in &self.rooms {
            let join = OutboundMessage::encode(&ControlMessage::JoinRoom { room: room.clone() })?;
            ws_tx.send(Message::Text(join.into_inner())).await?;
            info!("Connection {} joined room {}", self.id, room);
        }

        let mut ping_interval = tokio::time::interval(PING_INTERVAL);
        let mut pong_deadline: Option<tokio::time::Instant> = None;

        loop {
            let pong_timeout = async {
                match pong_deadline {
                    Some(deadline) => tokio::time::sleep_until(deadline).await,
                    None => std::future::pending().await,
                }
            };

            tokio::select! {
                _ = ping_interval.tick() => {
                    if pong_deadline.is_some() {
                        warn!("No Pong received, disconnecting {}", self.id);
                        break;
                    }
                    ws_tx.send(Message::Ping(Bytes::new())).await?;
                    pong_deadline = Some(tokio::time::Instant::now() + PONG_TIMEOUT);
                    debug!("Ping sent on {}", self.id);
                }

                _ = pong_timeout => {
                    warn!("Pong timeout, disconnecting {}", self.id);
                    break;
                }

                msg = outbound.recv() => {
                    let Some(msg) = msg else {
                        info!("Outbound queue closed on {}", self.id);
                        break;
                    };
                    debug!("Sending {} for room {} on {}", msg.event_name(), msg.room(), self.id);
                    let frame = OutboundMessage::encode(&msg)?;
                    ws_tx.send(Message::Text(frame.into_inner())).await?;
                }

                msg = ws_rx.next() => {
                    let msg = match msg {
                        Some(Ok(m)) => m,
                        Some(Err(e)) => {
                            warn!("WebSocket error on {}: {}", self.id, e);
                            return Err(e.into());
                        }
                        None => break,
                    };

                    match msg {
                        Message::Text(text) => self.handle_text(text.as_str(), &sink)?,
                        Message::Pong(_) => {
                            pong_deadline = None;
                            debug!("Pong received on {}", self.id);
                        }
                        Message::Close(_) => {
                            info!("Close received on {}", self.id);
                            break;
                        }
                        _ => {}
                    }
                }
            }
        }

        let _ = ws_tx.close().await;
        info!("Connection {} closed", self.id);

        Ok(())
    }

    fn handle_text(&self, text: &str, sink: &impl SignalSink) -> Result<(), SignalingError> {
        match serde_json::from_str::<SignalMessage>(text) {
            Ok(msg) => {
                debug!("Received {} for room {} on {}", msg.event_name(), msg.room(), self.id);
                sink.deliver(msg)
            }
            Err(e) => {
                debug!("Skipping non-signaling frame on {}: {}", self.id, e);
                Ok(())
            }
        }
    }
}
