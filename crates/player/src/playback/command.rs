//! External player process integration.

use std::process::Stdio;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use shared::PlayDirective;
use tokio::process::Command;

use super::PlaybackHandler;

/// Launches a configured player command (e.g. `mpv --fs ~/Video.mp4`).
///
/// A running child counts as "already playing"; further starts are ignored
/// until it exits. Without a command the start is only logged.
pub struct CommandPlayer {
    argv: Vec<String>,
    playing: Arc<AtomicBool>,
}

impl CommandPlayer {
    /// Split `command` on whitespace and expand a leading `~` in each word.
    pub fn new(command: Option<&str>) -> Self {
        let argv = command
            .map(|c| {
                c.split_whitespace()
                    .map(|word| shellexpand::tilde(word).to_string())
                    .collect()
            })
            .unwrap_or_default();
        Self {
            argv,
            playing: Arc::new(AtomicBool::new(false)),
        }
    }

    pub fn is_playing(&self) -> bool {
        self.playing.load(Ordering::SeqCst)
    }

    pub fn argv(&self) -> &[String] {
        &self.argv
    }
}

impl PlaybackHandler for CommandPlayer {
    fn start_playback_locally(&self, directive: &PlayDirective) {
        let Some((program, args)) = self.argv.split_first() else {
            tracing::info!(origin = %directive.origin, "playback started (no player command configured)");
            return;
        };
        if self.playing.swap(true, Ordering::SeqCst) {
            tracing::info!(origin = %directive.origin, "already playing");
            return;
        }

        let child = Command::new(program)
            .args(args)
            .stdin(Stdio::null())
            .spawn();
        match child {
            Ok(mut child) => {
                tracing::info!(origin = %directive.origin, program = %program, "playback started");
                let playing = Arc::clone(&self.playing);
                tokio::spawn(async move {
                    match child.wait().await {
                        Ok(status) => tracing::info!(%status, "player exited"),
                        Err(e) => tracing::warn!(error = %e, "waiting for player failed"),
                    }
                    playing.store(false, Ordering::SeqCst);
                });
            }
            Err(e) => {
                tracing::error!(program = %program, error = %e, "failed to start player");
                self.playing.store(false, Ordering::SeqCst);
            }
        }
    }
}
