#![allow(dead_code)]

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::mpsc;

use livecast::config::{CoordinatorConfig, MediaConstraints, RtcConfig};
use livecast::signaling::{
    Collaborators, ConnectionState, CoordinatorEvent, CoordinatorHandle, IceCandidateDescriptor,
    MediaCapture, MediaHandle, MediaTrack, NoticeKind, PeerConnection, PeerConnectionFactory,
    PeerEventSink, RemoteTrack, RoomId, SessionDescription, SignalMessage, SignalingError,
    TrackKind, VideoSurface,
};

const WAIT: Duration = Duration::from_secs(60);

/// Everything one fake peer connection saw
pub struct PeerRecord {
    pub index: usize,
    pub sink: PeerEventSink,
    pub reject_remote: bool,
    pub rejected_candidates: Vec<String>,
    pub remote_set: AtomicBool,
    pub closes: AtomicUsize,
    pub tracks: Mutex<Vec<MediaTrack>>,
    pub candidates: Mutex<Vec<String>>,
    pub local: Mutex<Vec<SessionDescription>>,
}

impl PeerRecord {
    pub fn candidates(&self) -> Vec<String> {
        self.candidates.lock().unwrap().clone()
    }

    pub fn closes(&self) -> usize {
        self.closes.load(Ordering::SeqCst)
    }
}

struct FakePeer(Arc<PeerRecord>);

#[async_trait]
impl PeerConnection for FakePeer {
    async fn create_offer(&mut self) -> Result<SessionDescription, SignalingError> {
        Ok(SessionDescription::offer(format!("v=0 offer-{}", self.0.index)))
    }

    async fn create_answer(&mut self) -> Result<SessionDescription, SignalingError> {
        Ok(SessionDescription::answer(format!("v=0 answer-{}", self.0.index)))
    }

    async fn set_local_description(
        &mut self,
        desc: SessionDescription,
    ) -> Result<(), SignalingError> {
        self.0.local.lock().unwrap().push(desc);
        // trickle one host candidate, like a browser does right after commit
        self.0.sink.local_candidate(Some(IceCandidateDescriptor {
            candidate: format!(
                "candidate:{} 1 udp 2122260223 10.0.0.{} 5000 typ host",
                self.0.index, self.0.index
            ),
            sdp_mid: Some("0".to_string()),
            sdp_mline_index: Some(0),
            username_fragment: None,
        }));
        Ok(())
    }

    async fn set_remote_description(
        &mut self,
        _desc: SessionDescription,
    ) -> Result<(), SignalingError> {
        if self.0.reject_remote {
            return Err(SignalingError::NegotiationFailed(
                "remote description rejected".to_string(),
            ));
        }
        self.0.remote_set.store(true, Ordering::SeqCst);
        Ok(())
    }

    async fn add_ice_candidate(
        &mut self,
        candidate: IceCandidateDescriptor,
    ) -> Result<(), SignalingError> {
        if !self.0.remote_set.load(Ordering::SeqCst) {
            return Err(SignalingError::NegotiationFailed(
                "InvalidStateError: no remote description".to_string(),
            ));
        }
        if self.0.rejected_candidates.contains(&candidate.candidate) {
            return Err(SignalingError::NegotiationFailed(
                "OperationError: unknown ufrag".to_string(),
            ));
        }
        self.0.candidates.lock().unwrap().push(candidate.candidate);
        Ok(())
    }

    fn add_track(&mut self, track: &MediaTrack) -> Result<(), SignalingError> {
        self.0.tracks.lock().unwrap().push(track.clone());
        Ok(())
    }

    fn close(&mut self) {
        self.0.closes.fetch_add(1, Ordering::SeqCst);
    }
}

#[derive(Default)]
pub struct FakePeers {
    peers: Mutex<Vec<Arc<PeerRecord>>>,
    rejections_left: AtomicUsize,
    rejected_candidates: Vec<String>,
}

impl FakePeers {
    /// The next `n` connections reject their remote description
    pub fn rejecting_remote_descriptions(n: usize) -> Self {
        Self {
            rejections_left: AtomicUsize::new(n),
            ..Self::default()
        }
    }

    /// Every connection rejects this candidate as belonging to another negotiation
    pub fn rejecting_candidate(mut self, candidate: &str) -> Self {
        self.rejected_candidates.push(candidate.to_string());
        self
    }

    pub fn count(&self) -> usize {
        self.peers.lock().unwrap().len()
    }

    pub fn peer(&self, index: usize) -> Arc<PeerRecord> {
        self.peers.lock().unwrap()[index].clone()
    }
}

impl PeerConnectionFactory for FakePeers {
    fn create(
        &self,
        _config: &RtcConfig,
        events: PeerEventSink,
    ) -> Result<Box<dyn PeerConnection>, SignalingError> {
        let reject_remote = self
            .rejections_left
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok();
        let mut peers = self.peers.lock().unwrap();
        let record = Arc::new(PeerRecord {
            index: peers.len(),
            sink: events,
            reject_remote,
            rejected_candidates: self.rejected_candidates.clone(),
            remote_set: AtomicBool::new(false),
            closes: AtomicUsize::new(0),
            tracks: Mutex::default(),
            candidates: Mutex::default(),
            local: Mutex::default(),
        });
        peers.push(record.clone());
        Ok(Box::new(FakePeer(record)))
    }
}

#[derive(Default)]
pub struct FakeMedia {
    pub deny: bool,
    /// Never answer, like a permission prompt nobody clicks
    pub hang: bool,
    pub acquisitions: AtomicUsize,
    pub stops: Arc<AtomicUsize>,
}

impl FakeMedia {
    pub fn denied() -> Self {
        Self {
            deny: true,
            ..Self::default()
        }
    }

    pub fn hanging() -> Self {
        Self {
            hang: true,
            ..Self::default()
        }
    }

    pub fn acquisitions(&self) -> usize {
        self.acquisitions.load(Ordering::SeqCst)
    }

    pub fn stops(&self) -> usize {
        self.stops.load(Ordering::SeqCst)
    }
}

struct FakeStream {
    stops: Arc<AtomicUsize>,
}

impl MediaHandle for FakeStream {
    fn tracks(&self) -> Vec<MediaTrack> {
        vec![
            MediaTrack {
                id: "cam".to_string(),
                kind: TrackKind::Video,
            },
            MediaTrack {
                id: "mic".to_string(),
                kind: TrackKind::Audio,
            },
        ]
    }

    fn stop(&mut self) {
        self.stops.fetch_add(1, Ordering::SeqCst);
    }
}

#[async_trait]
impl MediaCapture for FakeMedia {
    async fn acquire(
        &self,
        _constraints: MediaConstraints,
    ) -> Result<Box<dyn MediaHandle>, SignalingError> {
        self.acquisitions.fetch_add(1, Ordering::SeqCst);
        if self.hang {
            std::future::pending::<()>().await;
        }
        if self.deny {
            return Err(SignalingError::MediaUnavailable(
                "NotAllowedError: permission denied".to_string(),
            ));
        }
        Ok(Box::new(FakeStream {
            stops: self.stops.clone(),
        }))
    }
}

/// Stand-in for the page's `localVideo` / `remoteVideo` elements
pub struct FakeSurface {
    pub has_local: bool,
    pub has_remote: bool,
    pub local: Mutex<HashMap<RoomId, usize>>,
    pub remote: Mutex<HashMap<RoomId, String>>,
}

impl Default for FakeSurface {
    fn default() -> Self {
        Self {
            has_local: true,
            has_remote: true,
            local: Mutex::default(),
            remote: Mutex::default(),
        }
    }
}

impl FakeSurface {
    pub fn without_local_target() -> Self {
        Self {
            has_local: false,
            ..Self::default()
        }
    }

    pub fn without_remote_target() -> Self {
        Self {
            has_remote: false,
            ..Self::default()
        }
    }

    pub fn remote_stream(&self, room: &str) -> Option<String> {
        self.remote.lock().unwrap().get(&RoomId::from(room)).cloned()
    }

    pub fn shows_local(&self, room: &str) -> bool {
        self.local.lock().unwrap().contains_key(&RoomId::from(room))
    }
}

impl VideoSurface for FakeSurface {
    fn show_local(&self, room: &RoomId, media: &dyn MediaHandle) -> Result<(), SignalingError> {
        if !self.has_local {
            return Err(SignalingError::MissingRenderTarget("localVideo".to_string()));
        }
        self.local
            .lock()
            .unwrap()
            .insert(room.clone(), media.tracks().len());
        Ok(())
    }

    fn show_remote(&self, room: &RoomId, track: &RemoteTrack) -> Result<(), SignalingError> {
        if !self.has_remote {
            return Err(SignalingError::MissingRenderTarget("remoteVideo".to_string()));
        }
        self.remote
            .lock()
            .unwrap()
            .insert(room.clone(), track.stream_id.clone());
        Ok(())
    }

    fn clear_local(&self, room: &RoomId) {
        self.local.lock().unwrap().remove(room);
    }

    fn clear_remote(&self, room: &RoomId) {
        self.remote.lock().unwrap().remove(room);
    }
}

pub struct Fakes {
    pub peers: FakePeers,
    pub media: FakeMedia,
    pub surface: FakeSurface,
}

impl Default for Fakes {
    fn default() -> Self {
        Self {
            peers: FakePeers::default(),
            media: FakeMedia::default(),
            surface: FakeSurface::default(),
        }
    }
}

/// One coordinator wired to fakes, with its outbound queue and event stream
pub struct Participant {
    pub handle: CoordinatorHandle,
    pub events: async_channel::Receiver<CoordinatorEvent>,
    pub outbound: mpsc::UnboundedReceiver<SignalMessage>,
    pub peers: Arc<FakePeers>,
    pub media: Arc<FakeMedia>,
    pub surface: Arc<FakeSurface>,
}

impl Participant {
    pub fn spawn() -> Self {
        Self::spawn_with(Fakes::default())
    }

    pub fn spawn_with(fakes: Fakes) -> Self {
        Self::spawn_configured(CoordinatorConfig::default(), fakes)
    }

    pub fn spawn_configured(config: CoordinatorConfig, fakes: Fakes) -> Self {
        let peers = Arc::new(fakes.peers);
        let media = Arc::new(fakes.media);
        let surface = Arc::new(fakes.surface);
        let (outbound_tx, outbound) = mpsc::unbounded_channel();

        let collaborators = Collaborators {
            peers: peers.clone(),
            media: media.clone(),
            surface: surface.clone(),
        };
        let (handle, events) = CoordinatorHandle::spawn(config, collaborators, outbound_tx);

        Self {
            handle,
            events,
            outbound,
            peers,
            media,
            surface,
        }
    }

    /// Round-trip through the actor so every queued command has been processed
    pub async fn settle(&self, room: &str) -> Option<ConnectionState> {
        self.handle.session_state(room).await.unwrap()
    }

    pub async fn next_outbound(&mut self) -> SignalMessage {
        tokio::time::timeout(WAIT, self.outbound.recv())
            .await
            .expect("timed out waiting for outbound message")
            .expect("outbound channel closed")
    }

    /// Everything sent so far, without waiting
    pub fn drain_outbound(&mut self) -> Vec<SignalMessage> {
        let mut sent = Vec::new();
        while let Ok(msg) = self.outbound.try_recv() {
            sent.push(msg);
        }
        sent
    }

    pub fn drain_events(&self) -> Vec<CoordinatorEvent> {
        let mut events = Vec::new();
        while let Ok(event) = self.events.try_recv() {
            events.push(event);
        }
        events
    }

    pub fn notices(events: &[CoordinatorEvent]) -> Vec<NoticeKind> {
        events
            .iter()
            .filter_map(|event| match event {
                CoordinatorEvent::Notice(notice) => Some(notice.kind),
                _ => None,
            })
            .collect()
    }

    pub fn states(events: &[CoordinatorEvent], room: &str) -> Vec<ConnectionState> {
        events
            .iter()
            .filter_map(|event| match event {
                CoordinatorEvent::StateChanged { room: r, state, .. } if r.as_str() == room => {
                    Some(*state)
                }
                _ => None,
            })
            .collect()
    }
}

pub fn offer(room: &str, sdp: &str) -> SignalMessage {
    SignalMessage::Offer {
        room: RoomId::from(room),
        offer: SessionDescription::offer(sdp),
    }
}

pub fn answer(room: &str, sdp: &str) -> SignalMessage {
    SignalMessage::Answer {
        room: RoomId::from(room),
        answer: SessionDescription::answer(sdp),
    }
}

pub fn candidate(room: &str, candidate: &str) -> SignalMessage {
    SignalMessage::IceCandidate {
        room: RoomId::from(room),
        candidate: IceCandidateDescriptor::new(candidate),
    }
}

pub fn video_track(stream_id: &str) -> RemoteTrack {
    RemoteTrack {
        stream_id: stream_id.to_string(),
        track: MediaTrack {
            id: "remote-cam".to_string(),
            kind: TrackKind::Video,
        },
    }
}

pub fn count_offers(sent: &[SignalMessage]) -> usize {
    sent.iter()
        .filter(|msg| matches!(msg, SignalMessage::Offer { .. }))
        .count()
}
