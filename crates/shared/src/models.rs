//! Wire messages and the frame decoder.
//!
//! Frames are flat JSON objects tagged by `type` with camelCase fields, e.g.
//! `{"type":"play","startAt":1700000000500,"origin":"k3j9x"}`.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Milliseconds since the Unix epoch.
pub type EpochMillis = i64;

/// Opaque token identifying one client installation.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ClientIdentity(String);

impl ClientIdentity {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ClientIdentity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// `hello` payload: sent once per connection after it opens.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Hello {
    pub client_id: ClientIdentity,
    pub ts: EpochMillis,
}

/// `request_play` payload.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PlayRequest {
    pub client_id: ClientIdentity,
    pub client_time: EpochMillis,
}

/// `play` payload: start playback at `start_at`. `origin` is the client whose
/// request caused the broadcast.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PlayDirective {
    pub start_at: EpochMillis,
    pub origin: ClientIdentity,
}

/// WebSocket message types.
pub mod ws_types {
    pub const HELLO: &str = "hello";
    pub const REQUEST_PLAY: &str = "request_play";
    pub const PLAY: &str = "play";

    pub(crate) const KNOWN: &[&str] = &[HELLO, REQUEST_PLAY, PLAY];
}

/// Every message understood by this protocol version.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum WsMessage {
    Hello(Hello),
    RequestPlay(PlayRequest),
    Play(PlayDirective),
}

impl WsMessage {
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Hello(_) => ws_types::HELLO,
            Self::RequestPlay(_) => ws_types::REQUEST_PLAY,
            Self::Play(_) => ws_types::PLAY,
        }
    }

    /// Serialize to a text frame.
    pub fn encode(&self) -> serde_json::Result<String> {
        serde_json::to_string(self)
    }
}

/// A frame that could not be understood. The frame is dropped; the
/// connection it arrived on stays open.
#[derive(Debug, thiserror::Error)]
pub enum ProtocolError {
    #[error("frame is not valid JSON: {0}")]
    InvalidJson(#[source] serde_json::Error),
    #[error("frame has no string `type` field")]
    MissingType,
    #[error("malformed `{kind}` message: {source}")]
    Malformed {
        kind: String,
        #[source]
        source: serde_json::Error,
    },
}

/// A decoded text frame.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Inbound {
    Message(WsMessage),
    /// Well-formed frame with a `type` this version does not know.
    Unknown(String),
}

/// Decode one text frame. Unknown `type` values are not an error so newer
/// peers can add messages without breaking older ones.
pub fn decode_frame(text: &str) -> Result<Inbound, ProtocolError> {
    let value: serde_json::Value = serde_json::from_str(text).map_err(ProtocolError::InvalidJson)?;
    let kind = value
        .get("type")
        .and_then(|t| t.as_str())
        .ok_or(ProtocolError::MissingType)?
        .to_string();
    if !ws_types::KNOWN.contains(&kind.as_str()) {
        return Ok(Inbound::Unknown(kind));
    }
    serde_json::from_value(value)
        .map(Inbound::Message)
        .map_err(|source| ProtocolError::Malformed { kind, source })
}
