//! Signal protocol messages
//!
//! Every frame on every channel is one JSON envelope
//! `{"SessionID": "...", "Type": "...", "Value": "..."}`. The relay only looks
//! at `SessionID` and `Type`; `Value` is carried verbatim.

use serde::{Deserialize, Serialize};

/// Envelope sent over the signaling WebSocket
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SignalMessage {
    /// Stream session the message is addressed to (empty for room-level)
    #[serde(
        rename = "SessionID",
        alias = "sessionId",
        alias = "sessionID",
        alias = "session_id",
        default
    )]
    pub session_id: String,

    /// Message type, see [`MessageKind`]
    #[serde(rename = "Type", alias = "type", default)]
    pub kind: String,

    /// Opaque payload (SDP, ICE candidate, room id, ...)
    #[serde(rename = "Value", alias = "value", default)]
    pub value: String,
}

/// Message types the relay knows about
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum MessageKind {
    /// Room created; value carries the room id
    NewRoom,
    /// Stream session admitted; value carries the session id
    NewSession,
    /// Operator left; sent to every participant
    RoomClosed,
    /// Participant named a room that does not exist
    RoomNotFound,
    /// Keepalive on operator channels
    Beat,
    /// ICE candidate from the operator side
    AddCallerIceCandidate,
    /// SDP offer from the operator side
    GotOffer,
    /// ICE candidate from the participant side
    AddCalleeIceCandidate,
    /// SDP answer from the participant side
    GotAnswer,
    /// Anything else, relayed untouched
    Other,
}

impl MessageKind {
    pub fn parse(kind: &str) -> Self {
        match kind {
            "newRoom" => Self::NewRoom,
            "newSession" => Self::NewSession,
            "roomClosed" => Self::RoomClosed,
            "roomNotFound" => Self::RoomNotFound,
            "beat" => Self::Beat,
            "addCallerIceCandidate" => Self::AddCallerIceCandidate,
            "gotOffer" => Self::GotOffer,
            "addCalleeIceCandidate" => Self::AddCalleeIceCandidate,
            "gotAnswer" => Self::GotAnswer,
            _ => Self::Other,
        }
    }

    /// Wire name; `Other` has none and maps to an empty string
    pub fn as_str(self) -> &'static str {
        match self {
            Self::NewRoom => "newRoom",
            Self::NewSession => "newSession",
            Self::RoomClosed => "roomClosed",
            Self::RoomNotFound => "roomNotFound",
            Self::Beat => "beat",
            Self::AddCallerIceCandidate => "addCallerIceCandidate",
            Self::GotOffer => "gotOffer",
            Self::AddCalleeIceCandidate => "addCalleeIceCandidate",
            Self::GotAnswer => "gotAnswer",
            Self::Other => "",
        }
    }
}

impl SignalMessage {
    pub fn new(
        session_id: impl Into<String>,
        kind: MessageKind,
        value: impl Into<String>,
    ) -> Self {
        Self {
            session_id: session_id.into(),
            kind: kind.as_str().to_string(),
            value: value.into(),
        }
    }

    pub fn new_room(room_id: &str) -> Self {
        Self::new("", MessageKind::NewRoom, room_id)
    }

    pub fn new_session(session_id: &str) -> Self {
        Self::new(session_id, MessageKind::NewSession, session_id)
    }

    pub fn room_closed(session_id: &str) -> Self {
        Self::new(session_id, MessageKind::RoomClosed, "")
    }

    pub fn room_not_found() -> Self {
        Self::new("", MessageKind::RoomNotFound, "")
    }

    pub fn beat() -> Self {
        Self::new("", MessageKind::Beat, "")
    }

    pub fn kind(&self) -> MessageKind {
        MessageKind::parse(&self.kind)
    }

    /// Parse from JSON
    pub fn from_json(json: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(json)
    }

    /// Serialize to JSON
    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }
}

/// A decoded message together with the exact text it arrived as
///
/// Relayed messages are forwarded as `text`, so the receiving side sees the
/// sender's bytes rather than a re-encoding.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SignalFrame {
    message: SignalMessage,
    text: String,
}

impl SignalFrame {
    /// Decode a text frame received from a channel
    pub fn parse(text: impl Into<String>) -> Result<Self, serde_json::Error> {
        let text = text.into();
        let message = SignalMessage::from_json(&text)?;
        Ok(Self { message, text })
    }

    /// Encode a locally built message
    pub fn encode(message: SignalMessage) -> Result<Self, serde_json::Error> {
        let text = message.to_json()?;
        Ok(Self { message, text })
    }

    pub fn message(&self) -> &SignalMessage {
        &self.message
    }

    pub fn session_id(&self) -> &str {
        &self.message.session_id
    }

    pub fn kind(&self) -> MessageKind {
        self.message.kind()
    }

    pub fn text(&self) -> &str {
        &self.text
    }

    pub fn into_text(self) -> String {
        self.text
    }
}
