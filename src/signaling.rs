//! WebRTC signaling coordination over a room-keyed message channel

mod actor;
mod client;
mod messages;
mod negotiation;
mod session;
mod types;

pub use actor::CoordinatorHandle;
pub use client::{ChannelClient, PING_INTERVAL, PONG_TIMEOUT, SignalSink};
pub use messages::{
    ControlMessage, IceCandidateDescriptor, SdpType, SessionDescription, SignalMessage,
};
pub use negotiation::{
    Collaborators, MediaCapture, MediaHandle, MediaTrack, PeerConnection, PeerConnectionFactory,
    PeerConnectionState, PeerEventSink, RemoteTrack, TrackKind, VideoSurface,
};
pub use types::{
    ConnectionId, ConnectionState, CoordinatorEvent, Notice, NoticeKind, OutboundMessage, Role,
    RoomId, SignalingError, StartOutcome,
};
