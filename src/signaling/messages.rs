use serde::{Deserialize, Serialize};

use super::types::RoomId;

/// Kind of a session description
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SdpType {
    Offer,
    Answer,
    Pranswer,
    Rollback,
}

/// Session description in the browser's JSON shape: `{"type": "offer", "sdp": "..."}`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionDescription {
    #[serde(rename = "type")]
    pub kind: SdpType,
    pub sdp: String,
}

impl SessionDescription {
    pub fn offer(sdp: impl Into<String>) -> Self {
        Self {
            kind: SdpType::Offer,
            sdp: sdp.into(),
        }
    }

    pub fn answer(sdp: impl Into<String>) -> Self {
        Self {
            kind: SdpType::Answer,
            sdp: sdp.into(),
        }
    }
}

/// ICE candidate as produced by `RTCIceCandidate.toJSON()`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IceCandidateDescriptor {
    pub candidate: String,
    #[serde(rename = "sdpMid", default, skip_serializing_if = "Option::is_none")]
    pub sdp_mid: Option<String>,
    #[serde(rename = "sdpMLineIndex", default, skip_serializing_if = "Option::is_none")]
    pub sdp_mline_index: Option<u16>,
    #[serde(rename = "usernameFragment", default, skip_serializing_if = "Option::is_none")]
    pub username_fragment: Option<String>,
}

impl IceCandidateDescriptor {
    pub fn new(candidate: impl Into<String>) -> Self {
        Self {
            candidate: candidate.into(),
            sdp_mid: None,
            sdp_mline_index: None,
            username_fragment: None,
        }
    }
}

/// Media-signaling messages exchanged through the room channel
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum SignalMessage {
    /// Publisher's offer, answered by whoever subscribes in the room
    #[serde(rename = "offer")]
    Offer {
        room: RoomId,
        offer: SessionDescription,
    },

    #[serde(rename = "answer")]
    Answer {
        room: RoomId,
        answer: SessionDescription,
    },

    /// Trickled candidate; may arrive before the description it belongs to
    #[serde(rename = "ice_candidate")]
    IceCandidate {
        room: RoomId,
        candidate: IceCandidateDescriptor,
    },

    #[serde(rename = "stream_ended")]
    StreamEnded { room: RoomId },
}

impl SignalMessage {
    pub fn room(&self) -> &RoomId {
        match self {
            SignalMessage::Offer { room, .. }
            | SignalMessage::Answer { room, .. }
            | SignalMessage::IceCandidate { room, .. }
            | SignalMessage::StreamEnded { room } => room,
        }
    }

    /// Wire name of the event, used in logs
    pub fn event_name(&self) -> &'static str {
        match self {
            SignalMessage::Offer { .. } => "offer",
            SignalMessage::Answer { .. } => "answer",
            SignalMessage::IceCandidate { .. } => "ice_candidate",
            SignalMessage::StreamEnded { .. } => "stream_ended",
        }
    }
}

/// Channel control messages sent by the client
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum ControlMessage {
    /// Subscribe this connection to a room's broadcasts
    #[serde(rename = "join_room")]
    JoinRoom { room: RoomId },
}
