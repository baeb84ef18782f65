//! Relay error types

use thiserror::Error;

/// Errors raised while admitting sessions or moving frames between channels
#[derive(Error, Debug)]
pub enum RelayError {
    #[error("channel closed")]
    ChannelClosed,

    #[error("channel send timed out")]
    SendTimeout,

    #[error("channel queue full")]
    QueueFull,

    #[error("room {0} is closed")]
    RoomClosed(String),

    #[error("room {0} already exists")]
    RoomExists(String),

    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),
}
