//! Synchronized playback participant.
//!
//! [`relay_client::CoordinationClient`] talks to the relayer and decides when
//! local playback starts; [`playback`] runs it.

pub mod cli;
pub mod clock;
pub mod config;
pub mod error;
pub mod identity;
pub mod playback;
pub mod relay_client;
