use std::collections::{HashMap, VecDeque};
use std::time::Duration;

use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use super::messages::{IceCandidateDescriptor, SessionDescription, SignalMessage};
use super::negotiation::{Collaborators, PeerConnectionState, PeerEvent, PeerEventSink};
use super::session::Session;
use super::types::{
    ConnectionState, CoordinatorEvent, Notice, Role, RoomId, SignalingError, StartOutcome,
};
use crate::config::CoordinatorConfig;

/// Commands processed by the coordinator actor, one at a time
pub(crate) enum CoordinatorCommand {
    StartPublishing {
        room: RoomId,
        reply: oneshot::Sender<Result<StartOutcome, SignalingError>>,
    },
    Stop {
        room: RoomId,
        reply: oneshot::Sender<bool>,
    },
    /// Message received from the room channel
    Signal(SignalMessage),
    /// Callback fired by a session's peer connection
    Peer {
        room: RoomId,
        epoch: u64,
        event: PeerEvent,
    },
    ConnectTimeout {
        room: RoomId,
        epoch: u64,
    },
    State {
        room: RoomId,
        reply: oneshot::Sender<Option<ConnectionState>>,
    },
    Shutdown {
        reply: oneshot::Sender<()>,
    },
}

pub(crate) struct Coordinator {
    config: CoordinatorConfig,
    collaborators: Collaborators,
    outbound: mpsc::UnboundedSender<SignalMessage>,
    events: async_channel::Sender<CoordinatorEvent>,
    /// Weak so that timers and peer callbacks never keep the actor alive
    commands: mpsc::WeakUnboundedSender<CoordinatorCommand>,
    sessions: HashMap<RoomId, Session>,
    early_candidates: HashMap<RoomId, VecDeque<IceCandidateDescriptor>>,
    next_epoch: u64,
}

pub(crate) async fn coordinator_actor(
    mut coordinator: Coordinator,
    mut rx: mpsc::UnboundedReceiver<CoordinatorCommand>,
) {
    while let Some(cmd) = rx.recv().await {
        match cmd {
            CoordinatorCommand::StartPublishing { room, reply } => {
                let result = coordinator.start_publishing(room).await;
                let _ = reply.send(result);
            }

            CoordinatorCommand::Stop { room, reply } => {
                let _ = reply.send(coordinator.stop(&room));
            }

            CoordinatorCommand::Signal(msg) => coordinator.handle_signal(msg).await,

            CoordinatorCommand::Peer { room, epoch, event } => {
                coordinator.handle_peer_event(room, epoch, event).await
            }

            CoordinatorCommand::ConnectTimeout { room, epoch } => {
                coordinator.handle_timeout(room, epoch)
            }

            CoordinatorCommand::State { room, reply } => {
                let _ = reply.send(coordinator.sessions.get(&room).map(|s| s.state));
            }

            CoordinatorCommand::Shutdown { reply } => {
                coordinator.close_all();
                let _ = reply.send(());
                break;
            }
        }
    }

    coordinator.close_all();
    info!("Signaling coordinator stopped");
}

impl Coordinator {
    async fn start_publishing(&mut self, room: RoomId) -> Result<StartOutcome, SignalingError> {
        if let Some(existing) = self.sessions.get(&room) {
            if existing.role == Role::Publisher && existing.state.is_active() {
                debug!("Already publishing in room {}, ignoring start", room);
                return Ok(StartOutcome::AlreadyActive);
            }
        }

        // one session per room: publishing replaces a subscription
        if let Some(previous) = self.sessions.remove(&room) {
            info!("Closing {} session in room {} to publish", previous.role, room);
            self.teardown(previous, ConnectionState::Closed, None);
        }

        match self.open_publisher(room.clone(), false).await {
            Err(e) if e.is_retryable() => {
                warn!("Publishing in room {} failed ({}), retrying once", room, e);
                self.open_publisher(room, true).await?;
            }
            other => other?,
        }
        Ok(StartOutcome::Started)
    }

    async fn open_publisher(&mut self, room: RoomId, retried: bool) -> Result<(), SignalingError> {
        let mut session = self.new_session(room.clone(), Role::Publisher);
        session.retried = retried;

        let budget = self.config.connect_timeout();
        match within(budget, self.negotiate_publisher(&mut session)).await {
            Ok(offer) => {
                info!("Publishing in room {} (epoch {})", room, session.epoch);
                self.send(SignalMessage::Offer {
                    room: room.clone(),
                    offer,
                });
                self.sessions.insert(room, session);
                Ok(())
            }
            Err(e) => {
                self.teardown(session, ConnectionState::Failed, Some(&e));
                Err(e)
            }
        }
    }

    /// media → local preview → peer connection → tracks → offer → local description
    async fn negotiate_publisher(
        &self,
        session: &mut Session,
    ) -> Result<SessionDescription, SignalingError> {
        let media = session
            .media
            .insert(self.collaborators.media.acquire(self.config.media).await?);
        self.collaborators.surface.show_local(&session.room, &**media)?;
        let tracks = media.tracks();

        let sink = self.sink(session);
        let peer = session
            .peer
            .insert(self.collaborators.peers.create(&self.config.rtc, sink)?);
        for track in &tracks {
            peer.add_track(track)?;
        }

        let offer = peer.create_offer().await?;
        peer.set_local_description(offer.clone()).await?;
        Ok(offer)
    }

    /// peer connection → remote offer (+ queued candidates) → answer → local description
    async fn negotiate_subscriber(
        &self,
        session: &mut Session,
        offer: SessionDescription,
    ) -> Result<SessionDescription, SignalingError> {
        let sink = self.sink(session);
        session.peer = Some(self.collaborators.peers.create(&self.config.rtc, sink)?);
        session.apply_remote_description(offer).await?;

        let peer = session
            .peer
            .as_mut()
            .ok_or_else(|| SignalingError::NegotiationFailed("no peer connection".to_string()))?;
        let answer = peer.create_answer().await?;
        peer.set_local_description(answer.clone()).await?;
        Ok(answer)
    }

    async fn handle_signal(&mut self, msg: SignalMessage) {
        debug!("Received {} for room {}", msg.event_name(), msg.room());

        match msg {
            SignalMessage::Offer { room, offer } => self.handle_offer(room, offer).await,
            SignalMessage::Answer { room, answer } => self.handle_answer(room, answer).await,
            SignalMessage::IceCandidate { room, candidate } => {
                self.handle_remote_candidate(room, candidate).await
            }
            SignalMessage::StreamEnded { room } => self.handle_stream_ended(room),
        }
    }

    async fn handle_offer(&mut self, room: RoomId, offer: SessionDescription) {
        if let Some(existing) = self.sessions.get(&room) {
            if existing.role == Role::Publisher {
                warn!("Ignoring offer for room {}: publishing there", room);
                return;
            }
        }

        if let Some(previous) = self.sessions.remove(&room) {
            info!(
                "New offer supersedes session {} in room {}",
                previous.epoch, room
            );
            self.teardown(previous, ConnectionState::Closed, None);
        }

        let mut session = self.new_session(room.clone(), Role::Subscriber);
        if let Some(early) = self.early_candidates.remove(&room) {
            debug!(
                "Handing {} early candidates to session in room {}",
                early.len(),
                room
            );
            session.early.extend(early);
        }

        let budget = self.config.connect_timeout();
        match within(budget, self.negotiate_subscriber(&mut session, offer)).await {
            Ok(answer) => {
                info!("Answering offer in room {} (epoch {})", room, session.epoch);
                self.send(SignalMessage::Answer {
                    room: room.clone(),
                    answer,
                });
                self.sessions.insert(room, session);
            }
            Err(e) => {
                warn!("Could not answer offer in room {}: {}", room, e);
                self.teardown(session, ConnectionState::Failed, Some(&e));
            }
        }
    }

    async fn handle_answer(&mut self, room: RoomId, answer: SessionDescription) {
        let budget = self.config.connect_timeout();
        let result = match self.sessions.get_mut(&room) {
            Some(session) if session.role == Role::Publisher && !session.remote_description_set => {
                within(budget, session.apply_remote_description(answer)).await
            }
            Some(_) => {
                debug!("Ignoring unexpected answer for room {}", room);
                return;
            }
            None => {
                debug!("No session for answer in room {}", room);
                return;
            }
        };

        if let Err(e) = result {
            self.fail_session(room, e).await;
        }
    }

    async fn handle_remote_candidate(&mut self, room: RoomId, candidate: IceCandidateDescriptor) {
        let budget = self.config.connect_timeout();
        let result = match self.sessions.get_mut(&room) {
            Some(session) => within(budget, session.add_remote_candidate(candidate)).await,
            None => {
                self.buffer_early_candidate(room, candidate);
                return;
            }
        };

        if let Err(e) = result {
            self.fail_session(room, e).await;
        }
    }

    fn buffer_early_candidate(&mut self, room: RoomId, candidate: IceCandidateDescriptor) {
        let limit = self.config.max_early_candidates;
        if limit == 0 {
            debug!("Dropping candidate for room {} without session", room);
            return;
        }

        let queue = self.early_candidates.entry(room.clone()).or_default();
        if queue.len() >= limit {
            warn!("Early candidate buffer full for room {}, dropping oldest", room);
            queue.pop_front();
        }
        queue.push_back(candidate);
        debug!("Buffered early candidate for room {} ({} queued)", room, queue.len());
    }

    fn handle_stream_ended(&mut self, room: RoomId) {
        self.early_candidates.remove(&room);

        match self.sessions.remove(&room) {
            Some(session) => {
                info!("Stream ended in room {}", room);
                let err = SignalingError::RemoteEnded(room);
                self.teardown(session, ConnectionState::Closed, Some(&err));
            }
            None => debug!("Stream ended in room {} without a session", room),
        }
    }

    async fn handle_peer_event(&mut self, room: RoomId, epoch: u64, event: PeerEvent) {
        let current = self
            .sessions
            .get(&room)
            .is_some_and(|session| session.epoch == epoch);
        if !current {
            debug!("Stale {:?} for room {} (epoch {})", event, room, epoch);
            return;
        }

        match event {
            PeerEvent::LocalCandidate(Some(candidate)) => {
                self.send(SignalMessage::IceCandidate { room, candidate });
            }

            PeerEvent::LocalCandidate(None) => {
                debug!("Candidate gathering complete for room {}", room);
            }

            PeerEvent::RemoteTrack(track) => {
                debug!("Remote {:?} track in room {}", track.track.kind, room);
                if let Err(e) = self.collaborators.surface.show_remote(&room, &track) {
                    self.fail_session(room, e).await;
                }
            }

            PeerEvent::StateChange(state) => self.handle_peer_state(room, state).await,
        }
    }

    async fn handle_peer_state(&mut self, room: RoomId, state: PeerConnectionState) {
        match state {
            PeerConnectionState::Connected => {
                if let Some(session) = self.sessions.get_mut(&room) {
                    session.cancel_timer();
                    set_state(&self.events, session, ConnectionState::Connected);
                    info!("Room {} connected as {}", room, session.role);
                }
            }

            PeerConnectionState::Failed => {
                let err = SignalingError::NegotiationFailed("peer connection failed".to_string());
                self.fail_session(room, err).await;
            }

            PeerConnectionState::Closed => {
                if let Some(session) = self.sessions.remove(&room) {
                    info!("Peer connection in room {} closed", room);
                    self.teardown(session, ConnectionState::Closed, None);
                }
            }

            PeerConnectionState::Disconnected => {
                warn!("Peer connection in room {} disconnected", room);
            }

            PeerConnectionState::New | PeerConnectionState::Connecting => {
                debug!("Peer connection in room {}: {:?}", room, state);
            }
        }
    }

    fn handle_timeout(&mut self, room: RoomId, epoch: u64) {
        let expired = self.sessions.get(&room).is_some_and(|session| {
            session.epoch == epoch && session.state != ConnectionState::Connected
        });
        if !expired {
            return;
        }

        if let Some(session) = self.sessions.remove(&room) {
            let err = SignalingError::ConnectionTimeout(self.config.connect_timeout());
            warn!("Room {}: {}", room, err);
            self.teardown(session, ConnectionState::Failed, Some(&err));
        }
    }

    /// Tear down a failed session; a publisher gets one fresh attempt.
    async fn fail_session(&mut self, room: RoomId, err: SignalingError) {
        let Some(session) = self.sessions.remove(&room) else {
            return;
        };
        let retry = session.role == Role::Publisher && !session.retried && err.is_retryable();

        warn!("Session in room {} failed: {}", room, err);
        self.teardown(session, ConnectionState::Failed, Some(&err));

        if retry {
            info!("Restarting publisher in room {}", room);
            if let Err(e) = self.open_publisher(room.clone(), true).await {
                warn!("Retry in room {} failed: {}", room, e);
            }
        }
    }

    fn stop(&mut self, room: &RoomId) -> bool {
        self.early_candidates.remove(room);

        let Some(session) = self.sessions.remove(room) else {
            debug!("Stop for room {} without a session", room);
            return false;
        };
        if session.role == Role::Publisher {
            self.send(SignalMessage::StreamEnded { room: room.clone() });
        }
        info!("Stopped {} session in room {}", session.role, room);
        self.teardown(session, ConnectionState::Closed, None);
        true
    }

    fn close_all(&mut self) {
        self.early_candidates.clear();
        let sessions: Vec<Session> = self.sessions.drain().map(|(_, s)| s).collect();
        for session in sessions {
            self.teardown(session, ConnectionState::Closed, None);
        }
    }

    fn new_session(&mut self, room: RoomId, role: Role) -> Session {
        self.next_epoch += 1;
        let mut session = Session::new(room, role, self.next_epoch);
        session.connect_timer = Some(self.arm_connect_timer(&session.room, session.epoch));
        set_state(&self.events, &mut session, ConnectionState::Connecting);
        session
    }

    /// Release handles, clear rendered media, report the final state and any notice.
    fn teardown(&self, mut session: Session, state: ConnectionState, err: Option<&SignalingError>) {
        session.release();
        match session.role {
            Role::Publisher => self.collaborators.surface.clear_local(&session.room),
            Role::Subscriber => self.collaborators.surface.clear_remote(&session.room),
        }
        set_state(&self.events, &mut session, state);

        if let Some(kind) = err.and_then(SignalingError::kind) {
            let notice = Notice {
                room: session.room.clone(),
                kind,
                message: err.map(ToString::to_string).unwrap_or_default(),
            };
            let _ = self.events.try_send(CoordinatorEvent::Notice(notice));
        }
    }

    fn arm_connect_timer(&self, room: &RoomId, epoch: u64) -> JoinHandle<()> {
        let tx = self.commands.clone();
        let room = room.clone();
        let budget = self.config.connect_timeout();

        tokio::spawn(async move {
            tokio::time::sleep(budget).await;
            if let Some(tx) = tx.upgrade() {
                let _ = tx.send(CoordinatorCommand::ConnectTimeout { room, epoch });
            }
        })
    }

    fn sink(&self, session: &Session) -> PeerEventSink {
        PeerEventSink::new(session.room.clone(), session.epoch, self.commands.clone())
    }

    fn send(&self, msg: SignalMessage) {
        if let Err(e) = self.outbound.send(msg) {
            warn!(
                "Message channel closed, dropping {} for room {}",
                e.0.event_name(),
                e.0.room()
            );
        }
    }
}

/// Bound a negotiation step by the connect budget. The actor handles one
/// command at a time, so a step that never resolves must not hold it.
async fn within<T>(
    budget: Duration,
    step: impl Future<Output = Result<T, SignalingError>>,
) -> Result<T, SignalingError> {
    tokio::time::timeout(budget, step)
        .await
        .map_err(|_| SignalingError::ConnectionTimeout(budget))?
}

fn set_state(
    events: &async_channel::Sender<CoordinatorEvent>,
    session: &mut Session,
    state: ConnectionState,
) {
    if session.state == state {
        return;
    }
    debug!(
        "Room {} ({}): {:?} -> {:?}",
        session.room, session.role, session.state, state
    );
    session.state = state;
    let _ = events.try_send(CoordinatorEvent::StateChanged {
        room: session.room.clone(),
        role: session.role,
        state,
    });
}

/// Handle to communicate with the coordinator actor
#[derive(Clone)]
pub struct CoordinatorHandle {
    pub(crate) tx: mpsc::UnboundedSender<CoordinatorCommand>,
}

impl CoordinatorHandle {
    /// Spawn the coordinator on the current tokio runtime.
    ///
    /// Outgoing signaling messages are written to `outbound`; state changes
    /// and notices are published on the returned receiver.
    pub fn spawn(
        config: CoordinatorConfig,
        collaborators: Collaborators,
        outbound: mpsc::UnboundedSender<SignalMessage>,
    ) -> (Self, async_channel::Receiver<CoordinatorEvent>) {
        let (tx, rx) = mpsc::unbounded_channel();
        let (events_tx, events_rx) = async_channel::unbounded();

        let coordinator = Coordinator {
            config,
            collaborators,
            outbound,
            events: events_tx,
            commands: tx.downgrade(),
            sessions: HashMap::new(),
            early_candidates: HashMap::new(),
            next_epoch: 0,
        };
        tokio::spawn(coordinator_actor(coordinator, rx));

        (Self { tx }, events_rx)
    }

    /// Start publishing local media into a room
    pub async fn start_publishing(
        &self,
        room: impl Into<RoomId>,
    ) -> Result<StartOutcome, SignalingError> {
        let (reply_tx, reply_rx) = oneshot::channel();
        self.send(CoordinatorCommand::StartPublishing {
            room: room.into(),
            reply: reply_tx,
        })?;
        reply_rx.await.map_err(|_| actor_closed())?
    }

    /// Close the room's session; publishers also announce `stream_ended`.
    /// Returns whether a session existed.
    pub async fn stop(&self, room: impl Into<RoomId>) -> Result<bool, SignalingError> {
        let (reply_tx, reply_rx) = oneshot::channel();
        self.send(CoordinatorCommand::Stop {
            room: room.into(),
            reply: reply_tx,
        })?;
        reply_rx.await.map_err(|_| actor_closed())
    }

    /// Hand a message received from the channel to the coordinator
    pub fn deliver(&self, msg: SignalMessage) -> Result<(), SignalingError> {
        self.send(CoordinatorCommand::Signal(msg))
    }

    pub async fn session_state(
        &self,
        room: impl Into<RoomId>,
    ) -> Result<Option<ConnectionState>, SignalingError> {
        let (reply_tx, reply_rx) = oneshot::channel();
        self.send(CoordinatorCommand::State {
            room: room.into(),
            reply: reply_tx,
        })?;
        reply_rx.await.map_err(|_| actor_closed())
    }

    /// Close every session and stop the actor
    pub async fn shutdown(&self) {
        let (reply_tx, reply_rx) = oneshot::channel();
        if self
            .send(CoordinatorCommand::Shutdown { reply: reply_tx })
            .is_ok()
        {
            let _ = reply_rx.await;
        }
    }

    fn send(&self, cmd: CoordinatorCommand) -> Result<(), SignalingError> {
        self.tx.send(cmd).map_err(|_| actor_closed())
    }
}

fn actor_closed() -> SignalingError {
    SignalingError::Internal("actor channel closed".to_string())
}
