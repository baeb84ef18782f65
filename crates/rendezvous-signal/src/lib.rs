//! Rendezvous Signal Server
//!
//! Pairs an operator (the side that streams) with any number of participants
//! and relays WebRTC negotiation messages between them. No media passes
//! through the server.
//!
//! # Protocol
//!
//! 1. Operator optionally requests a pending token over HTTP and shares it
//! 2. Operator opens `/ws/serve` (with `claim=<token>`) and receives `newRoom`
//! 3. Participant opens `/ws/connect?id=<room>`; both sides receive `newSession`
//! 4. Offers, answers and ICE candidates are relayed verbatim by session id
//! 5. When the operator leaves, every participant receives `roomClosed`

pub mod api;
pub mod channel;
pub mod claim;
pub mod error;
pub mod heartbeat;
pub mod messages;
pub mod pending;
pub mod rate_limiter;
pub mod registry;
pub mod room;
pub mod server;
pub mod session;
pub mod ws;

pub use channel::{ChannelHandle, ChannelReceiver};
pub use claim::ClaimService;
pub use error::RelayError;
pub use messages::{MessageKind, SignalFrame, SignalMessage};
pub use pending::{PendingSession, PendingSessions};
pub use rate_limiter::{RateLimiter, RateLimiterConfig};
pub use registry::RoomRegistry;
pub use room::{Room, RoomState};
pub use server::{AppState, ServerOptions, SignalServer};
pub use session::{SessionSnapshot, StreamSession};
