//! Rendezvous token generation
//!
//! Provides:
//! - Numeric session codes (6 zero-padded digits)
//! - Human-readable phrase codes from an unambiguous alphabet
//! - Hex session ids used to address streams inside a room
//!
//! All values are drawn from the OS random source. If that source fails the
//! generators fall back to a clock-derived value so issuance stays available;
//! such tokens are guessable and are logged as degraded.

use std::time::{SystemTime, UNIX_EPOCH};

use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

/// Length of a generated numeric code
pub const NUMERIC_CODE_LENGTH: usize = 6;

/// Accepted length range for presented numeric tokens
pub const NUMERIC_TOKEN_MIN_LEN: usize = 6;
pub const NUMERIC_TOKEN_MAX_LEN: usize = 8;

/// Number of distinct numeric codes
const NUMERIC_CODE_SPACE: u32 = 1_000_000;

/// Largest multiple of the code space that fits in a u32; draws at or above
/// this are rejected so every code is equally likely.
const NUMERIC_REJECT_THRESHOLD: u32 = (u32::MAX / NUMERIC_CODE_SPACE) * NUMERIC_CODE_SPACE;

/// Length of a generated phrase code
pub const PHRASE_CODE_LENGTH: usize = 8;

/// Characters used in phrase codes (unambiguous set, 32 entries)
const PHRASE_CHARS: &[u8] = b"23456789ABCDEFGHJKLMNPQRSTUVWXYZ";

/// Random bytes in a session id (hex encoded to twice this length)
pub const SESSION_ID_BYTES: usize = 8;

/// Shape of tokens handed out for rooms
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TokenFormat {
    /// Six decimal digits, e.g. "042917"
    #[default]
    Numeric,
    /// Eight characters from the unambiguous alphabet, e.g. "K7QX2MZP"
    Phrase,
}

/// Try to generate a uniformly distributed 6-digit code
pub fn try_generate_numeric_code() -> Result<String, getrandom::Error> {
    loop {
        let mut bytes = [0u8; 4];
        getrandom::fill(&mut bytes)?;
        let n = u32::from_le_bytes(bytes);
        if n < NUMERIC_REJECT_THRESHOLD {
            return Ok(format!("{:06}", n % NUMERIC_CODE_SPACE));
        }
    }
}

/// Generate a 6-digit code, falling back to the clock if the RNG fails
pub fn generate_numeric_code() -> String {
    try_generate_numeric_code().unwrap_or_else(|e| {
        warn!("RNG unavailable ({}), using clock-derived session code", e);
        format!("{:06}", clock_nanos() % NUMERIC_CODE_SPACE as u128)
    })
}

/// Try to generate a phrase code
pub fn try_generate_phrase_code() -> Result<String, getrandom::Error> {
    let mut bytes = [0u8; PHRASE_CODE_LENGTH];
    getrandom::fill(&mut bytes)?;
    Ok(encode_phrase(&bytes))
}

/// Generate a phrase code, falling back to the clock if the RNG fails
pub fn generate_phrase_code() -> String {
    try_generate_phrase_code().unwrap_or_else(|e| {
        warn!("RNG unavailable ({}), using clock-derived phrase code", e);
        let nanos = clock_nanos().to_le_bytes();
        encode_phrase(&nanos[..PHRASE_CODE_LENGTH])
    })
}

/// Generate a session id (16 hex chars)
pub fn generate_session_id() -> String {
    let mut bytes = [0u8; SESSION_ID_BYTES];
    if let Err(e) = getrandom::fill(&mut bytes) {
        warn!("RNG unavailable ({}), using clock-derived session id", e);
        let nanos = clock_nanos().to_le_bytes();
        bytes.copy_from_slice(&nanos[..SESSION_ID_BYTES]);
    }
    hex::encode(bytes)
}

// 256 is a multiple of 32, so `b % 32` is unbiased.
fn encode_phrase(bytes: &[u8]) -> String {
    bytes
        .iter()
        .map(|b| PHRASE_CHARS[(*b as usize) % PHRASE_CHARS.len()] as char)
        .collect()
}

fn clock_nanos() -> u128 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_nanos())
        .unwrap_or(0)
}

/// Normalize a presented token (trim, drop dashes and whitespace, uppercase)
pub fn normalize_token(token: &str) -> String {
    token
        .chars()
        .filter(|c| !c.is_whitespace() && *c != '-')
        .map(|c| c.to_ascii_uppercase())
        .collect()
}

/// Check that a presented token is 6-8 ASCII digits
pub fn is_numeric_token(token: &str) -> bool {
    (NUMERIC_TOKEN_MIN_LEN..=NUMERIC_TOKEN_MAX_LEN).contains(&token.len())
        && token.bytes().all(|b| b.is_ascii_digit())
}

/// Check that a presented token is a well-formed phrase code
pub fn is_phrase_token(token: &str) -> bool {
    token.len() == PHRASE_CODE_LENGTH && token.bytes().all(|b| PHRASE_CHARS.contains(&b))
}

/// Token generator bound to one format
#[derive(Clone, Copy, Debug, Default)]
pub struct TokenGenerator {
    format: TokenFormat,
}

impl TokenGenerator {
    pub fn new(format: TokenFormat) -> Self {
        Self { format }
    }

    /// Draw one candidate token
    pub fn generate(&self) -> String {
        match self.format {
            TokenFormat::Numeric => generate_numeric_code(),
            TokenFormat::Phrase => generate_phrase_code(),
        }
    }

    /// Draw candidates until `accept` takes one
    ///
    /// `accept` must atomically check and reserve the candidate (e.g. insert it
    /// into a store only if vacant); returning `false` means it collided.
    pub fn generate_unique(&self, mut accept: impl FnMut(&str) -> bool) -> String {
        let mut attempts = 0u32;
        loop {
            let candidate = self.generate();
            attempts += 1;
            if accept(&candidate) {
                if attempts > 1 {
                    debug!("Token issued after {} attempts", attempts);
                }
                return candidate;
            }
        }
    }

    /// Check whether a token has this generator's exact shape
    ///
    /// No normalization happens here; pass presented tokens through
    /// [`normalize_token`] first, since stores are keyed by the canonical form.
    pub fn matches(&self, token: &str) -> bool {
        match self.format {
            TokenFormat::Numeric => is_numeric_token(token),
            TokenFormat::Phrase => is_phrase_token(token),
        }
    }
}
