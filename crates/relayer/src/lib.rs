//! Playback relayer: turns `request_play` into one shared start time and fans
//! it out to every connected player.

pub mod api;
pub mod config;
pub mod relay;
