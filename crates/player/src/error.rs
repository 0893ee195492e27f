//! Coordination errors. None of them reach the end user: every path degrades
//! to unsynchronized local playback.

use std::time::Duration;

#[derive(Debug, thiserror::Error)]
pub enum CoordinationError {
    #[error("connection error: {0}")]
    Connection(#[from] tokio_tungstenite::tungstenite::Error),
    #[error(transparent)]
    Protocol(#[from] shared::ProtocolError),
    #[error("encode message: {0}")]
    Encode(#[from] serde_json::Error),
    #[error("no reply from relay within {0:?}")]
    Timeout(Duration),
    #[error("not connected to relay")]
    NotConnected,
    #[error("a play request is already pending")]
    RequestInFlight,
}
