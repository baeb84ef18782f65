//! Rendezvous Core - Shared configuration, error types, and token generation
//!
//! This crate contains the foundational pieces used by the signal server.
//! It has no dependencies on networking code.

pub mod config;
pub mod error;
pub mod token;

pub use config::{Config, RateLimitConfig, RelayConfig, ServerConfig, SessionConfig};
pub use error::*;
pub use token::{normalize_token, TokenFormat, TokenGenerator};

/// Default listen port
pub const DEFAULT_PORT: u16 = 8080;

/// Default pending-session lifetime in seconds (15 minutes)
pub const DEFAULT_SESSION_TTL_SECS: u64 = 15 * 60;

/// Default heartbeat interval on operator channels in seconds
pub const DEFAULT_HEARTBEAT_SECS: u64 = 10;

/// Default maximum claim attempts per address within the rate window
pub const DEFAULT_MAX_CLAIM_ATTEMPTS: usize = 10;

/// Default rate-limit window in seconds
pub const DEFAULT_RATE_WINDOW_SECS: u64 = 60;
