use tokio::task::JoinHandle;
use tracing::{debug, warn};

use super::messages::{IceCandidateDescriptor, SessionDescription};
use super::negotiation::{MediaHandle, PeerConnection};
use super::types::{ConnectionState, Role, RoomId, SignalingError};

/// One media negotiation for a room.
///
/// The session exclusively owns its media and peer-connection handles and
/// releases both exactly once, either through `release` or on drop.
pub(crate) struct Session {
    pub room: RoomId,
    pub role: Role,
    pub epoch: u64,
    pub state: ConnectionState,
    pub media: Option<Box<dyn MediaHandle>>,
    pub peer: Option<Box<dyn PeerConnection>>,
    /// Candidates buffered for the room before this session existed. They may
    /// belong to an earlier negotiation, so a rejected one is dropped.
    pub early: Vec<IceCandidateDescriptor>,
    /// Remote candidates received before the remote description
    pub pending: Vec<IceCandidateDescriptor>,
    pub remote_description_set: bool,
    /// Publisher already spent its automatic retry
    pub retried: bool,
    pub connect_timer: Option<JoinHandle<()>>,
}

impl Session {
    pub fn new(room: RoomId, role: Role, epoch: u64) -> Self {
        Self {
            room,
            role,
            epoch,
            state: ConnectionState::New,
            media: None,
            peer: None,
            early: Vec::new(),
            pending: Vec::new(),
            remote_description_set: false,
            retried: false,
            connect_timer: None,
        }
    }

    pub fn cancel_timer(&mut self) {
        if let Some(timer) = self.connect_timer.take() {
            timer.abort();
        }
    }

    /// Apply the remote description, then every candidate queued before it:
    /// room-buffered ones first, in arrival order.
    pub async fn apply_remote_description(
        &mut self,
        desc: SessionDescription,
    ) -> Result<(), SignalingError> {
        let peer = self
            .peer
            .as_mut()
            .ok_or_else(|| SignalingError::NegotiationFailed("no peer connection".to_string()))?;
        peer.set_remote_description(desc).await?;
        self.remote_description_set = true;

        for candidate in std::mem::take(&mut self.early) {
            if let Err(e) = peer.add_ice_candidate(candidate).await {
                warn!("Dropping stale early candidate for room {}: {}", self.room, e);
            }
        }

        if !self.pending.is_empty() {
            debug!(
                "Applying {} queued candidates for room {}",
                self.pending.len(),
                self.room
            );
        }
        for candidate in std::mem::take(&mut self.pending) {
            peer.add_ice_candidate(candidate).await?;
        }
        Ok(())
    }

    /// Apply a remote candidate now, or queue it until the remote description is set.
    pub async fn add_remote_candidate(
        &mut self,
        candidate: IceCandidateDescriptor,
    ) -> Result<(), SignalingError> {
        match self.peer.as_mut() {
            Some(peer) if self.remote_description_set => peer.add_ice_candidate(candidate).await,
            _ => {
                debug!("Queuing early candidate for room {}", self.room);
                self.pending.push(candidate);
                Ok(())
            }
        }
    }

    /// Stop the media, close the peer connection and cancel the connect timer.
    /// Calling it again is a no-op.
    pub fn release(&mut self) {
        self.cancel_timer();
        if let Some(mut media) = self.media.take() {
            media.stop();
        }
        if let Some(mut peer) = self.peer.take() {
            peer.close();
        }
        self.early.clear();
        self.pending.clear();
    }
}

impl Drop for Session {
    fn drop(&mut self) {
        self.release();
    }
}
