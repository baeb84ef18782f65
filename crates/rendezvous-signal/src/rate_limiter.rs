//! Rate limiter for token claim attempts
//!
//! Short numeric tokens can be enumerated, so every claim attempt from an
//! address is recorded in a sliding window. Once an address has used up its
//! attempts for the window, further attempts are rejected without being
//! recorded, and are allowed again as old attempts age out.
//!
//! Only claim checks go through here; established channels are never limited.

use std::collections::{HashMap, VecDeque};
use std::net::IpAddr;
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use rendezvous_core::RateLimitConfig;
use tokio::time::Instant;
use tracing::{debug, warn};

/// Rate limiter configuration
#[derive(Clone, Debug)]
pub struct RateLimiterConfig {
    /// Maximum attempts per address inside the window
    pub max_attempts: usize,
    /// Sliding window length
    pub window: Duration,
}

impl Default for RateLimiterConfig {
    fn default() -> Self {
        Self::from(&RateLimitConfig::default())
    }
}

impl From<&RateLimitConfig> for RateLimiterConfig {
    fn from(config: &RateLimitConfig) -> Self {
        Self {
            max_attempts: config.max_attempts,
            window: config.window(),
        }
    }
}

/// Sliding-window limiter keyed by source address
#[derive(Clone)]
pub struct RateLimiter {
    config: RateLimiterConfig,
    entries: Arc<Mutex<HashMap<IpAddr, VecDeque<Instant>>>>,
}

impl RateLimiter {
    /// Create a new rate limiter with default configuration
    pub fn new() -> Self {
        Self::with_config(RateLimiterConfig::default())
    }

    /// Create a new rate limiter with custom configuration
    pub fn with_config(config: RateLimiterConfig) -> Self {
        Self {
            config,
            entries: Arc::new(Mutex::new(HashMap::new())),
        }
    }

    /// Record an attempt from `ip` if it is under the cap
    ///
    /// Returns `true` if allowed, `false` if rate limited.
    pub fn allow(&self, ip: IpAddr) -> bool {
        let now = Instant::now();
        let mut entries = self.entries.lock();
        let attempts = entries.entry(ip).or_default();

        prune(attempts, now, self.config.window);

        if attempts.len() >= self.config.max_attempts {
            warn!(
                "Rate limiter: rejected claim from {} ({} attempts in {}s)",
                ip,
                attempts.len(),
                self.config.window.as_secs()
            );
            return false;
        }

        attempts.push_back(now);
        debug!(
            "Rate limiter: recorded attempt for {} ({}/{})",
            ip,
            attempts.len(),
            self.config.max_attempts
        );
        true
    }

    /// Drop addresses with no attempts left in the window
    pub fn cleanup_expired(&self) -> usize {
        let now = Instant::now();
        let mut entries = self.entries.lock();
        let before = entries.len();

        entries.retain(|_, attempts| {
            prune(attempts, now, self.config.window);
            !attempts.is_empty()
        });

        let removed = before - entries.len();
        if removed > 0 {
            debug!("Rate limiter: cleaned up {} idle addresses", removed);
        }
        removed
    }

    /// Get statistics about rate limiter state
    pub fn stats(&self) -> RateLimiterStats {
        let now = Instant::now();
        let entries = self.entries.lock();
        let limited_count = entries
            .values()
            .filter(|attempts| {
                attempts
                    .iter()
                    .filter(|t| now.duration_since(**t) < self.config.window)
                    .count()
                    >= self.config.max_attempts
            })
            .count();

        RateLimiterStats {
            limited_count,
            total_tracked: entries.len(),
        }
    }
}

impl Default for RateLimiter {
    fn default() -> Self {
        Self::new()
    }
}

// Attempts are pushed in time order, so expired ones sit at the front.
fn prune(attempts: &mut VecDeque<Instant>, now: Instant, window: Duration) {
    while let Some(oldest) = attempts.front() {
        if now.duration_since(*oldest) >= window {
            attempts.pop_front();
        } else {
            break;
        }
    }
}

/// Rate limiter statistics
#[derive(Debug, Clone, Copy)]
pub struct RateLimiterStats {
    /// Addresses currently at their cap
    pub limited_count: usize,
    /// Total number of tracked addresses
    pub total_tracked: usize,
}
