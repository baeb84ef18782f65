//! Issued-but-unclaimed session tokens
//!
//! An operator asks for a token before any WebSocket exists and hands it to
//! the participant out of band. The token stays claimable until its TTL runs
//! out. Expired entries are removed the first time they are looked at, or by
//! the periodic sweep.

use std::collections::HashMap;
use std::time::Duration;

use parking_lot::Mutex;
use tokio::time::Instant;
use tracing::debug;

use crate::registry::RoomRegistry;

/// A pending token and its lifetime
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct PendingSession {
    pub token: String,
    pub created_at: Instant,
    pub expires_at: Instant,
    /// First time a claim check succeeded for this token
    pub connected_at: Option<Instant>,
}

impl PendingSession {
    fn new(token: String, ttl: Duration) -> Self {
        let now = Instant::now();
        Self {
            token,
            created_at: now,
            expires_at: now + ttl,
            connected_at: None,
        }
    }

    pub fn is_expired_at(&self, now: Instant) -> bool {
        now > self.expires_at
    }
}

/// Pending-session store
///
/// All access goes through one mutex, so a claim check and the removal of an
/// expired entry happen as a single step.
#[derive(Debug, Default)]
pub struct PendingSessions {
    sessions: Mutex<HashMap<String, PendingSession>>,
}

impl PendingSessions {
    pub fn new() -> Self {
        Self::default()
    }

    /// Store `token` for `ttl`, replacing any existing entry
    pub fn create(&self, token: &str, ttl: Duration) {
        let session = PendingSession::new(token.to_string(), ttl);
        self.sessions.lock().insert(token.to_string(), session);
        debug!("Pending session created: {}", token);
    }

    /// Store `token` only if it is not already pending
    pub fn try_create(&self, token: &str, ttl: Duration) -> bool {
        let mut sessions = self.sessions.lock();
        if sessions.contains_key(token) {
            return false;
        }
        sessions.insert(token.to_string(), PendingSession::new(token.to_string(), ttl));
        debug!("Pending session created: {}", token);
        true
    }

    /// Copy of the entry for `token`, if pending and not expired
    pub fn get(&self, token: &str) -> Option<PendingSession> {
        let mut sessions = self.sessions.lock();
        match sessions.get(token) {
            Some(s) if s.is_expired_at(Instant::now()) => {
                sessions.remove(token);
                debug!("Pending session expired: {}", token);
                None
            }
            Some(s) => Some(s.clone()),
            None => None,
        }
    }

    /// Whether `token` may be claimed right now
    ///
    /// A token the store does not know is still valid if a room with that id
    /// is live, so additional participants can find an already claimed room.
    /// A valid pending token is not consumed here; the claimer deletes it once
    /// its room is registered.
    pub fn validate(&self, token: &str, rooms: &RoomRegistry) -> bool {
        let mut sessions = self.sessions.lock();
        let now = Instant::now();

        let Some(session) = sessions.get_mut(token) else {
            return rooms.contains(token);
        };

        if session.is_expired_at(now) {
            sessions.remove(token);
            debug!("Pending session expired on claim: {}", token);
            return false;
        }

        session.connected_at.get_or_insert(now);
        true
    }

    /// Remove `token`; returns whether it was pending
    pub fn delete(&self, token: &str) -> bool {
        self.sessions.lock().remove(token).is_some()
    }

    pub fn contains(&self, token: &str) -> bool {
        self.get(token).is_some()
    }

    /// Remove every expired entry
    pub fn purge_expired(&self) -> usize {
        let now = Instant::now();
        let mut sessions = self.sessions.lock();
        let before = sessions.len();
        sessions.retain(|_, s| !s.is_expired_at(now));
        let removed = before - sessions.len();
        if removed > 0 {
            debug!("Purged {} expired pending sessions", removed);
        }
        removed
    }

    pub fn len(&self) -> usize {
        self.sessions.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.sessions.lock().is_empty()
    }
}
