//! Collaborators the coordinator drives but does not implement: the peer
//! negotiation primitive, media capture, and the video render targets.

use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::mpsc;
use tracing::debug;

use super::actor::CoordinatorCommand;
use super::messages::{IceCandidateDescriptor, SessionDescription};
use super::types::{RoomId, SignalingError};
use crate::config::{MediaConstraints, RtcConfig};

/// Connection state as reported by the negotiation primitive
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PeerConnectionState {
    New,
    Connecting,
    Connected,
    Disconnected,
    Failed,
    Closed,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TrackKind {
    Audio,
    Video,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MediaTrack {
    pub id: String,
    pub kind: TrackKind,
}

/// Track received from the remote peer, with the stream it belongs to
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RemoteTrack {
    pub stream_id: String,
    pub track: MediaTrack,
}

/// One negotiation-primitive instance. Owned by exactly one session.
#[async_trait]
pub trait PeerConnection: Send + Sync {
    async fn create_offer(&mut self) -> Result<SessionDescription, SignalingError>;

    async fn create_answer(&mut self) -> Result<SessionDescription, SignalingError>;

    async fn set_local_description(&mut self, desc: SessionDescription)
    -> Result<(), SignalingError>;

    async fn set_remote_description(&mut self, desc: SessionDescription)
    -> Result<(), SignalingError>;

    async fn add_ice_candidate(&mut self, candidate: IceCandidateDescriptor)
    -> Result<(), SignalingError>;

    fn add_track(&mut self, track: &MediaTrack) -> Result<(), SignalingError>;

    fn close(&mut self);
}

/// Creates peer connections. Callbacks of the new connection must be routed
/// into `events`.
pub trait PeerConnectionFactory: Send + Sync {
    fn create(
        &self,
        config: &RtcConfig,
        events: PeerEventSink,
    ) -> Result<Box<dyn PeerConnection>, SignalingError>;
}

#[async_trait]
pub trait MediaCapture: Send + Sync {
    /// Fails with `MediaUnavailable` when permission is denied or no device exists.
    async fn acquire(
        &self,
        constraints: MediaConstraints,
    ) -> Result<Box<dyn MediaHandle>, SignalingError>;
}

/// Captured local media. `stop` ends every track.
pub trait MediaHandle: Send + Sync {
    fn tracks(&self) -> Vec<MediaTrack>;

    fn stop(&mut self);
}

/// The page's local and remote video elements
pub trait VideoSurface: Send + Sync {
    fn show_local(&self, room: &RoomId, media: &dyn MediaHandle) -> Result<(), SignalingError>;

    fn show_remote(&self, room: &RoomId, track: &RemoteTrack) -> Result<(), SignalingError>;

    fn clear_local(&self, room: &RoomId);

    fn clear_remote(&self, room: &RoomId);
}

/// External collaborators shared by every session of a coordinator
#[derive(Clone)]
pub struct Collaborators {
    pub peers: Arc<dyn PeerConnectionFactory>,
    pub media: Arc<dyn MediaCapture>,
    pub surface: Arc<dyn VideoSurface>,
}

/// Primitive callbacks, as queued for the coordinator
#[derive(Debug)]
pub(crate) enum PeerEvent {
    /// `None` marks the end of candidate gathering
    LocalCandidate(Option<IceCandidateDescriptor>),
    RemoteTrack(RemoteTrack),
    StateChange(PeerConnectionState),
}

/// Callback target handed to each new peer connection.
///
/// Events are tagged with the session epoch, so callbacks from a connection
/// that has since been closed or superseded are ignored by the coordinator.
#[derive(Clone)]
pub struct PeerEventSink {
    room: RoomId,
    epoch: u64,
    tx: mpsc::WeakUnboundedSender<CoordinatorCommand>,
}

impl PeerEventSink {
    pub(crate) fn new(
        room: RoomId,
        epoch: u64,
        tx: mpsc::WeakUnboundedSender<CoordinatorCommand>,
    ) -> Self {
        Self { room, epoch, tx }
    }

    pub fn room(&self) -> &RoomId {
        &self.room
    }

    pub fn local_candidate(&self, candidate: Option<IceCandidateDescriptor>) {
        self.emit(PeerEvent::LocalCandidate(candidate));
    }

    pub fn remote_track(&self, track: RemoteTrack) {
        self.emit(PeerEvent::RemoteTrack(track));
    }

    pub fn connection_state(&self, state: PeerConnectionState) {
        self.emit(PeerEvent::StateChange(state));
    }

    fn emit(&self, event: PeerEvent) {
        let Some(tx) = self.tx.upgrade() else {
            debug!("Coordinator gone, dropping {:?} for room {}", event, self.room);
            return;
        };
        let _ = tx.send(CoordinatorCommand::Peer {
            room: self.room.clone(),
            epoch: self.epoch,
            event,
        });
    }
}
