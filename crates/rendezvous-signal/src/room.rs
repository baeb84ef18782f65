//! Rooms: one operator channel relaying to many participant sessions
//!
//! A room is created when an operator connects and lives until the operator
//! channel goes away. Each participant that names the room gets a
//! [`StreamSession`]; frames are relayed between the operator and that
//! session, and offers, answers and ICE candidates are recorded on the way
//! through.
//!
//! The session map and every session's negotiation state sit behind one
//! mutex per room. The lock is never held across an `.await`. Frames from the
//! operator are queued with a non-blocking send while the lock is held;
//! frames from a participant copy the operator handle out and write after the
//! lock is released.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use futures_util::{Stream, StreamExt};
use parking_lot::Mutex;
use rendezvous_core::token::generate_session_id;
use tracing::{debug, info, warn};

use crate::channel::ChannelHandle;
use crate::error::RelayError;
use crate::heartbeat::Heartbeat;
use crate::messages::{MessageKind, SignalFrame, SignalMessage};
use crate::registry::RoomRegistry;
use crate::session::{SessionSnapshot, StreamSession};

/// Room lifecycle
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum RoomState {
    /// Operator channel live
    Open,
    /// Torn down; terminal
    Closed,
}

#[derive(Debug)]
struct RoomInner {
    state: RoomState,
    sessions: HashMap<String, StreamSession>,
    heartbeat: Option<Heartbeat>,
}

/// A relay between one operator and its participants
#[derive(Debug)]
pub struct Room {
    id: String,
    operator: ChannelHandle,
    inner: Mutex<RoomInner>,
}

impl Room {
    /// Create an open room; nothing is sent until [`Room::announce`]
    pub fn new(id: String, operator: ChannelHandle) -> Arc<Self> {
        Arc::new(Self {
            id,
            operator,
            inner: Mutex::new(RoomInner {
                state: RoomState::Open,
                sessions: HashMap::new(),
                heartbeat: None,
            }),
        })
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn operator(&self) -> &ChannelHandle {
        &self.operator
    }

    pub fn state(&self) -> RoomState {
        self.inner.lock().state
    }

    pub fn is_closed(&self) -> bool {
        self.state() == RoomState::Closed
    }

    pub fn session_count(&self) -> usize {
        self.inner.lock().sessions.len()
    }

    /// Copy of one session's negotiation state
    pub fn session(&self, session_id: &str) -> Option<SessionSnapshot> {
        self.inner
            .lock()
            .sessions
            .get(session_id)
            .map(StreamSession::snapshot)
    }

    /// Tell the operator which id this room ended up with
    pub async fn announce(&self) -> Result<(), RelayError> {
        self.operator.send(SignalMessage::new_room(&self.id)).await
    }

    /// Start pushing `beat` frames to the operator
    pub fn start_heartbeat(&self, period: Duration) {
        let mut inner = self.inner.lock();
        if inner.state == RoomState::Open && inner.heartbeat.is_none() {
            inner.heartbeat = Some(Heartbeat::start(self.operator.clone(), period));
        }
    }

    pub fn has_heartbeat(&self) -> bool {
        self.inner
            .lock()
            .heartbeat
            .as_ref()
            .is_some_and(Heartbeat::is_running)
    }

    /// Admit a participant and tell both ends the new session id
    ///
    /// If either notification fails the session is withdrawn again and no
    /// frames will ever be relayed to it.
    pub async fn new_session(&self, participant: ChannelHandle) -> Result<String, RelayError> {
        let session_id = {
            let mut inner = self.inner.lock();
            if inner.state == RoomState::Closed {
                return Err(RelayError::RoomClosed(self.id.clone()));
            }

            let mut session_id = generate_session_id();
            while inner.sessions.contains_key(&session_id) {
                session_id = generate_session_id();
            }

            inner.sessions.insert(
                session_id.clone(),
                StreamSession::new(session_id.clone(), self.operator.clone(), participant.clone()),
            );
            session_id
        };

        let notify = async {
            self.operator
                .send(SignalMessage::new_session(&session_id))
                .await?;
            participant
                .send(SignalMessage::new_session(&session_id))
                .await
        };

        if let Err(e) = notify.await {
            warn!(
                "Room {}: admitting session {} failed: {}",
                self.id, session_id, e
            );
            self.remove_session(&session_id);
            return Err(e);
        }

        info!("Room {}: session {} joined", self.id, session_id);
        Ok(session_id)
    }

    /// Drop a session from the map, returning it if it was present
    pub fn remove_session(&self, session_id: &str) -> Option<StreamSession> {
        self.inner.lock().sessions.remove(session_id)
    }

    /// Relay one frame read from the operator channel
    ///
    /// Never waits on a participant. A session whose queue is full is evicted
    /// so frames for the other sessions keep flowing; state is only recorded
    /// for frames that were actually queued.
    pub fn handle_operator_frame(&self, frame: SignalFrame) {
        let session_id = frame.session_id().to_string();
        let kind = frame.kind();
        let value = match kind {
            MessageKind::AddCallerIceCandidate | MessageKind::GotOffer => {
                Some(frame.message().value.clone())
            }
            _ => None,
        };

        let mut inner = self.inner.lock();
        let Some(session) = inner.sessions.get_mut(&session_id) else {
            warn!(
                "Room {}: dropping {:?} for unknown session {:?}",
                self.id,
                frame.message().kind,
                session_id
            );
            return;
        };

        debug!(
            "Room {}: operator -> {} ({})",
            self.id,
            session_id,
            frame.message().kind
        );
        let forwarded = session.participant().try_forward(frame);
        match forwarded {
            Ok(()) => match (kind, value) {
                (MessageKind::AddCallerIceCandidate, Some(value)) => {
                    session.add_operator_ice_candidate(value)
                }
                (MessageKind::GotOffer, Some(value)) => session.set_offer(value),
                _ => {}
            },
            Err(RelayError::QueueFull) => {
                warn!(
                    "Room {}: session {} is not keeping up, evicting",
                    self.id, session_id
                );
                if let Some(session) = inner.sessions.remove(&session_id) {
                    session.participant().close();
                }
            }
            Err(e) => {
                debug!("Room {}: forward to {} failed: {}", self.id, session_id, e);
            }
        }
    }

    /// Relay one frame read from the participant channel of `session_id`
    pub async fn handle_participant_frame(&self, session_id: &str, frame: SignalFrame) {
        if frame.session_id() != session_id {
            debug!(
                "Room {}: session {} sent frame for {:?}, ignored",
                self.id,
                session_id,
                frame.session_id()
            );
            return;
        }

        let operator = {
            let mut inner = self.inner.lock();
            let Some(session) = inner.sessions.get_mut(session_id) else {
                return;
            };

            match frame.kind() {
                MessageKind::AddCalleeIceCandidate => {
                    session.add_participant_ice_candidate(frame.message().value.clone())
                }
                MessageKind::GotAnswer => session.set_answer(frame.message().value.clone()),
                _ => {}
            }
            session.operator().clone()
        };

        debug!(
            "Room {}: {} -> operator ({})",
            self.id,
            session_id,
            frame.message().kind
        );
        if let Err(e) = operator.forward(frame).await {
            debug!("Room {}: forward to operator failed: {}", self.id, e);
        }
    }

    /// Operator relay loop; tears the room down when `inbound` ends
    pub async fn run_operator<S>(self: &Arc<Self>, mut inbound: S, registry: &RoomRegistry)
    where
        S: Stream<Item = SignalFrame> + Unpin,
    {
        while let Some(frame) = inbound.next().await {
            self.handle_operator_frame(frame);
        }
        debug!("Room {}: operator channel ended", self.id);
        self.close(registry);
    }

    /// Participant relay loop; removes the session when `inbound` ends
    pub async fn run_participant<S>(&self, session_id: &str, mut inbound: S)
    where
        S: Stream<Item = SignalFrame> + Unpin,
    {
        while let Some(frame) = inbound.next().await {
            self.handle_participant_frame(session_id, frame).await;
        }

        if let Some(session) = self.remove_session(session_id) {
            session.participant().close();
            info!("Room {}: session {} left", self.id, session_id);
        }
    }

    /// Tear the room down
    ///
    /// Stops the heartbeat, closes the operator channel, unregisters the room,
    /// then tells every participant `roomClosed` and closes its channel.
    /// Notifications never wait on a slow socket. Returns `false` if the room
    /// was already closed.
    pub fn close(self: &Arc<Self>, registry: &RoomRegistry) -> bool {
        let (heartbeat, sessions) = {
            let mut inner = self.inner.lock();
            if inner.state == RoomState::Closed {
                return false;
            }
            inner.state = RoomState::Closed;
            (inner.heartbeat.take(), std::mem::take(&mut inner.sessions))
        };

        if let Some(mut heartbeat) = heartbeat {
            heartbeat.stop();
        }
        self.operator.close();
        registry.remove_room(self);

        let count = sessions.len();
        for (session_id, session) in sessions {
            let participant = session.participant();
            if let Err(e) = participant.try_send(SignalMessage::room_closed(&session_id)) {
                debug!(
                    "Room {}: roomClosed to {} not delivered: {}",
                    self.id, session_id, e
                );
            }
            participant.close();
        }

        info!("Room {} closed ({} sessions)", self.id, count);
        true
    }
}
