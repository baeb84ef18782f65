//! Token issuance, claim checks and room admission
//!
//! [`ClaimService`] bundles the process-wide pieces (pending store, rate
//! limiter, room registry) so the transport can be handed one value at
//! startup instead of reaching for globals.

use std::net::IpAddr;
use std::sync::Arc;
use std::time::Duration;

use rendezvous_core::{Config, RelayConfig, TokenGenerator};
use tracing::{debug, info, warn};

use crate::channel::{self, ChannelHandle, ChannelReceiver};
use crate::error::RelayError;
use crate::pending::PendingSessions;
use crate::rate_limiter::{RateLimiter, RateLimiterConfig};
use crate::registry::RoomRegistry;
use crate::room::Room;

/// Issues tokens and turns valid claims into rooms
pub struct ClaimService {
    generator: TokenGenerator,
    session_ttl: Duration,
    pending: PendingSessions,
    limiter: RateLimiter,
    rooms: Arc<RoomRegistry>,
    relay: RelayConfig,
}

impl ClaimService {
    pub fn new(config: &Config) -> Self {
        Self {
            generator: TokenGenerator::new(config.sessions.token_format),
            session_ttl: config.sessions.ttl(),
            pending: PendingSessions::new(),
            limiter: RateLimiter::with_config(RateLimiterConfig::from(&config.rate_limit)),
            rooms: Arc::new(RoomRegistry::new()),
            relay: config.relay.clone(),
        }
    }

    pub fn generator(&self) -> &TokenGenerator {
        &self.generator
    }

    pub fn pending(&self) -> &PendingSessions {
        &self.pending
    }

    pub fn rooms(&self) -> &Arc<RoomRegistry> {
        &self.rooms
    }

    pub fn get_room(&self, id: &str) -> Option<Arc<Room>> {
        self.rooms.get(id)
    }

    /// Outbound queue sized and timed per the relay config
    pub fn new_channel(&self) -> (ChannelHandle, ChannelReceiver) {
        channel::channel(self.relay.channel_capacity, self.relay.send_timeout())
    }

    /// Issue a fresh token, unique among pending tokens and live rooms
    pub fn create_pending_session(&self) -> String {
        let token = self
            .generator
            .generate_unique(|candidate| self.reserve_pending(candidate));
        info!("Pending session issued: {}", token);
        token
    }

    fn reserve_pending(&self, candidate: &str) -> bool {
        !self.rooms.contains(candidate)
            && self.pending.try_create(candidate, self.session_ttl)
            && self.confirm_pending(candidate)
    }

    /// Second look after a pending insert: a fresh room may have taken the id
    /// between the registry check and the insert, in which case the entry is
    /// withdrawn. Together with [`Self::confirm_room`] one side always sees
    /// the other, so an id is never both pending and live.
    fn confirm_pending(&self, token: &str) -> bool {
        if self.rooms.contains(token) {
            self.pending.delete(token);
            debug!("Pending token {} collided with a new room", token);
            return false;
        }
        true
    }

    /// Rate-limit then validate a presented token
    ///
    /// `address` is `None` when the caller has no meaningful source address;
    /// such checks bypass the limiter.
    pub fn claim_if_valid(&self, token: &str, address: Option<IpAddr>) -> bool {
        if let Some(ip) = address {
            if !self.limiter.allow(ip) {
                return false;
            }
        }

        let valid = self.pending.validate(token, &self.rooms);
        debug!("Claim check for {}: {}", token, if valid { "valid" } else { "rejected" });
        valid
    }

    /// Build, register and announce a room for a new operator channel
    ///
    /// A valid `claim` becomes the room id if no room holds it yet, and the
    /// pending token is consumed once that room is registered. A missing,
    /// invalid or lost claim falls back to a freshly generated id.
    pub async fn open_room(
        &self,
        operator: ChannelHandle,
        claim: Option<&str>,
    ) -> Result<Arc<Room>, RelayError> {
        let claimed = claim
            .filter(|token| self.claim_if_valid(token, None))
            .and_then(|token| self.register_claimed_room(token, &operator));

        let room = match claimed {
            Some(room) => room,
            None => self.register_fresh_room(&operator),
        };

        if let Err(e) = room.announce().await {
            warn!("Room {}: operator unreachable: {}", room.id(), e);
            room.close(&self.rooms);
            return Err(e);
        }
        room.start_heartbeat(self.relay.heartbeat_interval());

        info!("Room {} opened", room.id());
        Ok(room)
    }

    fn register_claimed_room(&self, token: &str, operator: &ChannelHandle) -> Option<Arc<Room>> {
        let room = Room::new(token.to_string(), operator.clone());
        match self.rooms.register(Arc::clone(&room)) {
            Ok(()) => {
                self.pending.delete(token);
                Some(room)
            }
            Err(e) => {
                debug!("Claim of {} lost: {}", token, e);
                None
            }
        }
    }

    fn register_fresh_room(&self, operator: &ChannelHandle) -> Arc<Room> {
        loop {
            let id = self.generator.generate();
            if self.pending.contains(&id) {
                continue;
            }
            let room = Room::new(id, operator.clone());
            if self.rooms.register(Arc::clone(&room)).is_ok() && self.confirm_room(&room) {
                return room;
            }
        }
    }

    /// Second look after registering a fresh room: if the id was issued as a
    /// pending token meanwhile, the room backs off and a new id is drawn.
    fn confirm_room(&self, room: &Arc<Room>) -> bool {
        if self.pending.contains(room.id()) {
            self.rooms.remove_room(room);
            debug!("Fresh room id {} collided with a pending token", room.id());
            return false;
        }
        true
    }

    /// Purge expired pending tokens and idle limiter entries
    pub fn sweep(&self) -> (usize, usize) {
        let pending = self.pending.purge_expired();
        let addresses = self.limiter.cleanup_expired();
        (pending, addresses)
    }
}
