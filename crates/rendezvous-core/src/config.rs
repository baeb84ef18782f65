//! Configuration system for the rendezvous signal server
//!
//! Supports TOML configuration files with sensible defaults.
//! Configuration is loaded from:
//! - macOS: ~/Library/Application Support/rendezvous/config.toml
//! - Linux: ~/.config/rendezvous/config.toml
//! - Windows: %APPDATA%/rendezvous/config.toml

use std::net::{IpAddr, Ipv4Addr};
use std::path::{Path, PathBuf};
use std::time::Duration;

use directories::ProjectDirs;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::error::ConfigError;
use crate::token::TokenFormat;

/// Main configuration structure
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Listener settings
    pub server: ServerConfig,
    /// Pending-session settings
    pub sessions: SessionConfig,
    /// Claim rate limiting
    pub rate_limit: RateLimitConfig,
    /// Relay and channel settings
    pub relay: RelayConfig,
}

/// Listener configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    /// Port to listen on
    pub port: u16,
    /// Bind address
    pub bind: IpAddr,
    /// Take the client address from the first `X-Forwarded-For` entry
    pub trust_forwarded_for: bool,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            port: crate::DEFAULT_PORT,
            bind: IpAddr::V4(Ipv4Addr::UNSPECIFIED),
            trust_forwarded_for: false,
        }
    }
}

/// Pending-session configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SessionConfig {
    /// How long an issued token stays claimable
    pub ttl_secs: u64,
    /// Shape of generated tokens and room ids
    pub token_format: TokenFormat,
    /// Reject presented tokens that do not have the `token_format` shape
    pub strict_token_format: bool,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            ttl_secs: crate::DEFAULT_SESSION_TTL_SECS,
            token_format: TokenFormat::Numeric,
            strict_token_format: true,
        }
    }
}

impl SessionConfig {
    pub fn ttl(&self) -> Duration {
        Duration::from_secs(self.ttl_secs)
    }
}

/// Rate limiter configuration for token claims
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RateLimitConfig {
    /// Maximum claim attempts per address inside the window
    pub max_attempts: usize,
    /// Sliding window length in seconds
    pub window_secs: u64,
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            max_attempts: crate::DEFAULT_MAX_CLAIM_ATTEMPTS,
            window_secs: crate::DEFAULT_RATE_WINDOW_SECS,
        }
    }
}

impl RateLimitConfig {
    pub fn window(&self) -> Duration {
        Duration::from_secs(self.window_secs)
    }
}

/// Relay configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RelayConfig {
    /// Interval between `beat` messages on operator channels
    pub heartbeat_interval_secs: u64,
    /// Upper bound on a single relayed write
    pub send_timeout_ms: u64,
    /// Outbound queue depth per channel
    pub channel_capacity: usize,
    /// How often expired pending sessions and limiter entries are swept
    pub janitor_interval_secs: u64,
}

impl Default for RelayConfig {
    fn default() -> Self {
        Self {
            heartbeat_interval_secs: crate::DEFAULT_HEARTBEAT_SECS,
            send_timeout_ms: 5_000,
            channel_capacity: 64,
            janitor_interval_secs: 60,
        }
    }
}

impl RelayConfig {
    pub fn heartbeat_interval(&self) -> Duration {
        Duration::from_secs(self.heartbeat_interval_secs)
    }

    pub fn send_timeout(&self) -> Duration {
        Duration::from_millis(self.send_timeout_ms)
    }

    pub fn janitor_interval(&self) -> Duration {
        Duration::from_secs(self.janitor_interval_secs)
    }
}

impl Config {
    /// Load configuration from the default path
    pub fn load() -> Self {
        match Self::default_path() {
            Some(path) => Self::load_from(&path).unwrap_or_else(|e| {
                warn!("Failed to load config from {:?}: {}, using defaults", path, e);
                Self::default()
            }),
            None => {
                debug!("No config directory found, using defaults");
                Self::default()
            }
        }
    }

    /// Load configuration from a specific path
    pub fn load_from(path: &Path) -> Result<Self, ConfigError> {
        if !path.exists() {
            debug!("Config file {:?} not found, using defaults", path);
            return Ok(Self::default());
        }

        let content = std::fs::read_to_string(path)?;
        let config: Config = toml::from_str(&content)?;
        config.validate()?;

        info!("Loaded config from {:?}", path);
        Ok(config)
    }

    /// Save configuration to a specific path
    pub fn save_to(&self, path: &Path) -> Result<(), ConfigError> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let content = toml::to_string_pretty(self)?;
        std::fs::write(path, content)?;

        info!("Saved config to {:?}", path);
        Ok(())
    }

    /// Reject values that would make the relay misbehave
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.sessions.ttl_secs == 0 {
            return Err(ConfigError::Invalid {
                field: "sessions.ttl_secs",
                reason: "must be greater than zero".into(),
            });
        }
        if self.rate_limit.window_secs == 0 {
            return Err(ConfigError::Invalid {
                field: "rate_limit.window_secs",
                reason: "must be greater than zero".into(),
            });
        }
        if self.relay.heartbeat_interval_secs == 0 {
            return Err(ConfigError::Invalid {
                field: "relay.heartbeat_interval_secs",
                reason: "must be greater than zero".into(),
            });
        }
        if self.relay.janitor_interval_secs == 0 {
            return Err(ConfigError::Invalid {
                field: "relay.janitor_interval_secs",
                reason: "must be greater than zero".into(),
            });
        }
        if self.relay.channel_capacity == 0 {
            return Err(ConfigError::Invalid {
                field: "relay.channel_capacity",
                reason: "must be greater than zero".into(),
            });
        }
        Ok(())
    }

    /// Get the default config file path
    pub fn default_path() -> Option<PathBuf> {
        ProjectDirs::from("com", "rendezvous", "rendezvous")
            .map(|dirs| dirs.config_dir().join("config.toml"))
    }

    /// Generate a sample configuration file content
    pub fn sample() -> String {
        let config = Self::default();
        toml::to_string_pretty(&config).unwrap_or_else(|_| String::new())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = Config::default();
        assert_eq!(config.server.port, crate::DEFAULT_PORT);
        assert_eq!(config.sessions.ttl(), Duration::from_secs(900));
        assert_eq!(config.rate_limit.max_attempts, 10);
        assert_eq!(config.rate_limit.window(), Duration::from_secs(60));
        assert_eq!(config.relay.heartbeat_interval(), Duration::from_secs(10));
        assert_eq!(config.sessions.token_format, TokenFormat::Numeric);
    }

    #[test]
    fn test_partial_config() {
        let toml_str = r#"
            [sessions]
            ttl_secs = 60
            token_format = "phrase"
        "#;
        let config: Config = toml::from_str(toml_str).unwrap();
        assert_eq!(config.sessions.ttl_secs, 60);
        assert_eq!(config.sessions.token_format, TokenFormat::Phrase);
        // Other values should be defaults
        assert_eq!(config.server.port, crate::DEFAULT_PORT);
        assert!(config.sessions.strict_token_format);
    }

    #[test]
    fn test_sample_config() {
        let sample = Config::sample();
        assert!(sample.contains("[server]"));
        assert!(sample.contains("[sessions]"));
        assert!(sample.contains("[rate_limit]"));
        assert!(sample.contains("[relay]"));
    }

    #[test]
    fn test_config_load_missing() {
        let config = Config::load_from(Path::new("/nonexistent/config.toml")).unwrap();
        assert_eq!(config.server.port, crate::DEFAULT_PORT);
    }

    #[test]
    fn test_save_and_reload() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("config.toml");

        let mut config = Config::default();
        config.server.port = 9443;
        config.rate_limit.max_attempts = 3;
        config.save_to(&path).unwrap();

        let loaded = Config::load_from(&path).unwrap();
        assert_eq!(loaded.server.port, 9443);
        assert_eq!(loaded.rate_limit.max_attempts, 3);
    }

    #[test]
    fn test_rejects_zero_ttl() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        std::fs::write(&path, "[sessions]\nttl_secs = 0\n").unwrap();

        let err = Config::load_from(&path).unwrap_err();
        assert!(matches!(err, ConfigError::Invalid { field: "sessions.ttl_secs", .. }));
    }
}
