//! Local playback scheduling.
//!
//! The sequencer is a two-state machine. Until a handler registers, play
//! directives are queued in arrival order; registration drains the queue
//! exactly once, re-scheduling each entry against the current time.

mod command;

use std::sync::{Arc, Mutex};
use std::time::Duration;

use shared::{EpochMillis, PlayDirective};

use crate::clock::Clock;

pub use command::CommandPlayer;

/// Starts media playback. Implementations must tolerate being called while
/// playback is already running (treat it as a no-op). Failures stay inside
/// the handler; the sequencer never retries.
pub trait PlaybackHandler: Send + Sync {
    fn start_playback_locally(&self, directive: &PlayDirective);
}

impl<F> PlaybackHandler for F
where
    F: Fn(&PlayDirective) + Send + Sync,
{
    fn start_playback_locally(&self, directive: &PlayDirective) {
        self(directive)
    }
}

enum HandlerState {
    NotReady(Vec<PlayDirective>),
    Ready(Arc<dyn PlaybackHandler>),
}

pub struct PlaybackSequencer {
    state: Mutex<HandlerState>,
    clock: Arc<dyn Clock>,
}

impl PlaybackSequencer {
    pub fn new(clock: Arc<dyn Clock>) -> Self {
        Self {
            state: Mutex::new(HandlerState::NotReady(Vec::new())),
            clock,
        }
    }

    #[cfg(test)]
    pub(crate) fn is_ready(&self) -> bool {
        matches!(*self.lock(), HandlerState::Ready(_))
    }

    /// Directives waiting for a handler.
    #[cfg(test)]
    pub(crate) fn queued(&self) -> usize {
        match &*self.lock() {
            HandlerState::NotReady(queue) => queue.len(),
            HandlerState::Ready(_) => 0,
        }
    }

    /// Start playback at `directive.start_at`, or queue the directive if no
    /// handler has registered yet.
    pub fn schedule(&self, directive: PlayDirective) {
        let handler = {
            let mut state = self.lock();
            match &mut *state {
                HandlerState::NotReady(queue) => {
                    tracing::info!(
                        origin = %directive.origin,
                        queued = queue.len() + 1,
                        "playback handler not ready, queueing play"
                    );
                    queue.push(directive);
                    return;
                }
                HandlerState::Ready(handler) => Arc::clone(handler),
            }
        };
        self.start_at(handler, directive);
    }

    /// Install the handler and flush anything queued before it existed.
    pub fn register(&self, handler: Arc<dyn PlaybackHandler>) {
        let previous = std::mem::replace(&mut *self.lock(), HandlerState::Ready(handler.clone()));
        let backlog = match previous {
            HandlerState::NotReady(queue) => queue,
            HandlerState::Ready(_) => {
                tracing::warn!("playback handler replaced");
                Vec::new()
            }
        };
        if !backlog.is_empty() {
            tracing::info!(count = backlog.len(), "flushing queued plays");
        }
        for directive in backlog {
            self.start_at(handler.clone(), directive);
        }
    }

    fn start_at(&self, handler: Arc<dyn PlaybackHandler>, directive: PlayDirective) {
        let delay = delay_until(directive.start_at, self.clock.now_ms());
        tracing::debug!(origin = %directive.origin, delay_ms = delay.as_millis() as u64, "playback scheduled");
        tokio::spawn(async move {
            if !delay.is_zero() {
                tokio::time::sleep(delay).await;
            }
            handler.start_playback_locally(&directive);
        });
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, HandlerState> {
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }
}

/// `max(0, start_at - now)`.
pub fn delay_until(start_at: EpochMillis, now: EpochMillis) -> Duration {
    Duration::from_millis(start_at.saturating_sub(now).max(0) as u64)
}
