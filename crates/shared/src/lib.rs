//! Shared wire protocol for the playback relayer and player.

mod models;

// Explicit re-exports (avoids rust-analyzer issues with `pub use models::*`)
pub use models::ws_types;
pub use models::{
    decode_frame, ClientIdentity, EpochMillis, Hello, Inbound, PlayDirective, PlayRequest,
    ProtocolError, WsMessage,
};
