//! Coordination client: agrees with the relayer on when playback starts.
//!
//! A player asks the relay for a start time with `request_play`; the relay
//! answers by broadcasting `play` to everyone, the requester included.
//! Incoming directives are dispatched in priority order:
//!
//! 1. a pending local request takes the directive as its reply;
//! 2. otherwise a directive whose origin is this player is an echo and is
//!    dropped;
//! 3. otherwise it is a remote trigger and local playback is scheduled.

mod mailbox;
mod ws;

use std::fmt;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use shared::{decode_frame, ClientIdentity, Inbound, PlayDirective, PlayRequest, WsMessage};
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;

use crate::clock::{Clock, SystemClock};
use crate::error::CoordinationError;
use crate::playback::{PlaybackHandler, PlaybackSequencer};

pub use mailbox::Mailbox;

/// Lifecycle of the relay connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    Disconnected,
    Connecting,
    Open,
    Closing,
}

impl fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Disconnected => "disconnected",
            Self::Connecting => "connecting",
            Self::Open => "open",
            Self::Closing => "closing",
        };
        f.write_str(s)
    }
}

#[derive(Debug, Clone)]
pub struct ClientOptions {
    pub url: String,
    /// How long a play request waits for the relay before giving up.
    pub request_timeout: Duration,
    /// Fixed pause between a close and the next connection attempt.
    pub reconnect_delay: Duration,
}

impl Default for ClientOptions {
    fn default() -> Self {
        Self {
            url: "ws://localhost:8080".to_string(),
            request_timeout: Duration::from_millis(2_000),
            reconnect_delay: Duration::from_millis(3_000),
        }
    }
}

pub struct CoordinationClient {
    identity: ClientIdentity,
    options: ClientOptions,
    clock: Arc<dyn Clock>,
    state: watch::Sender<ConnectionState>,
    outbound: Mutex<Option<mpsc::UnboundedSender<WsMessage>>>,
    pending: Mailbox<PlayDirective>,
    request_lock: tokio::sync::Mutex<()>,
    sequencer: PlaybackSequencer,
    task: Mutex<Option<JoinHandle<()>>>,
}

impl CoordinationClient {
    pub fn new(identity: ClientIdentity, options: ClientOptions) -> Arc<Self> {
        Self::with_clock(identity, options, Arc::new(SystemClock))
    }

    pub fn with_clock(
        identity: ClientIdentity,
        options: ClientOptions,
        clock: Arc<dyn Clock>,
    ) -> Arc<Self> {
        let (state, _) = watch::channel(ConnectionState::Disconnected);
        Arc::new(Self {
            identity,
            options,
            sequencer: PlaybackSequencer::new(clock.clone()),
            clock,
            state,
            outbound: Mutex::new(None),
            pending: Mailbox::new(),
            request_lock: tokio::sync::Mutex::new(()),
            task: Mutex::new(None),
        })
    }

    pub fn identity(&self) -> &ClientIdentity {
        &self.identity
    }

    pub fn state(&self) -> ConnectionState {
        *self.state.borrow()
    }

    pub fn subscribe_state(&self) -> watch::Receiver<ConnectionState> {
        self.state.subscribe()
    }

    /// Wait up to `within` for the connection to open.
    pub async fn wait_until_open(&self, within: Duration) -> bool {
        let mut rx = self.subscribe_state();
        let opened = tokio::time::timeout(within, rx.wait_for(|s| *s == ConnectionState::Open))
            .await
            .is_ok_and(|r| r.is_ok());
        opened
    }

    /// Start the connection loop. Returns `false` if it is already running.
    /// The loop reconnects on its own after every close.
    pub fn connect(self: &Arc<Self>) -> bool {
        let mut task = self.task.lock().unwrap_or_else(|e| e.into_inner());
        if task.as_ref().is_some_and(|t| !t.is_finished()) {
            return false;
        }
        *task = Some(tokio::spawn(ws::run(Arc::clone(self))));
        true
    }

    /// Stop the connection loop and drop the current connection.
    pub fn shutdown(&self) {
        if let Some(task) = self.task.lock().unwrap_or_else(|e| e.into_inner()).take() {
            task.abort();
        }
        self.detach();
        self.set_state(ConnectionState::Disconnected);
    }

    /// Install the playback handler, flushing any plays that arrived first.
    pub fn register_playback_handler(&self, handler: Arc<dyn PlaybackHandler>) {
        self.sequencer.register(handler);
    }

    /// Ask the relay for a shared start time.
    ///
    /// Resolves to `None` when the relay is unreachable or does not answer
    /// within the request timeout; callers then play immediately. Calls are
    /// serialized: a second caller waits for the first request to resolve
    /// before sending its own.
    pub async fn request_synchronized_start(&self) -> Option<PlayDirective> {
        let _serial = self.request_lock.lock().await;
        match self.try_request().await {
            Ok(directive) => Some(directive),
            Err(e) => {
                tracing::info!(reason = %e, "no coordinated start");
                None
            }
        }
    }

    async fn try_request(&self) -> Result<PlayDirective, CoordinationError> {
        let reply = self
            .pending
            .try_set()
            .ok_or(CoordinationError::RequestInFlight)?;
        let request = WsMessage::RequestPlay(PlayRequest {
            client_id: self.identity.clone(),
            client_time: self.clock.now_ms(),
        });
        if let Err(e) = self.send(request) {
            self.pending.clear();
            return Err(e);
        }
        match tokio::time::timeout(self.options.request_timeout, reply).await {
            Ok(Ok(directive)) => Ok(directive),
            _ => {
                self.pending.clear();
                Err(CoordinationError::Timeout(self.options.request_timeout))
            }
        }
    }

    /// Run after a local unlock: get a shared start time and schedule local
    /// playback for it, or play right away when coordination is unavailable.
    pub async fn trigger_synchronized_playback(&self) {
        let directive = match self.request_synchronized_start().await {
            Some(directive) => {
                tracing::info!(
                    start_in_ms = directive.start_at.saturating_sub(self.clock.now_ms()),
                    "playing at relay start time"
                );
                directive
            }
            None => {
                tracing::info!("playing immediately without coordination");
                PlayDirective {
                    start_at: self.clock.now_ms(),
                    origin: self.identity.clone(),
                }
            }
        };
        self.sequencer.schedule(directive);
    }

    /// Decode one text frame from the relay and dispatch it.
    pub(crate) fn handle_frame(&self, text: &str) -> Result<(), CoordinationError> {
        tracing::debug!(frame = text, "relay frame");
        match decode_frame(text)? {
            Inbound::Message(WsMessage::Play(directive)) => self.on_directive_received(directive),
            Inbound::Message(other) => {
                tracing::debug!(kind = other.kind(), "ignoring relay-bound message");
            }
            Inbound::Unknown(kind) => {
                tracing::info!(kind = %kind, "ignoring unknown message type");
            }
        }
        Ok(())
    }

    pub(crate) fn on_directive_received(&self, directive: PlayDirective) {
        let directive = match self.pending.deliver(directive) {
            Ok(()) => {
                tracing::debug!("play answered pending request");
                return;
            }
            Err(directive) => directive,
        };
        if directive.origin == self.identity {
            tracing::debug!(start_at = directive.start_at, "dropping own echo");
            return;
        }
        tracing::info!(
            origin = %directive.origin,
            start_in_ms = directive.start_at.saturating_sub(self.clock.now_ms()),
            "remote play received"
        );
        self.sequencer.schedule(directive);
    }

    fn send(&self, msg: WsMessage) -> Result<(), CoordinationError> {
        let outbound = self.outbound.lock().unwrap_or_else(|e| e.into_inner());
        let tx = outbound.as_ref().ok_or(CoordinationError::NotConnected)?;
        tx.send(msg).map_err(|_| CoordinationError::NotConnected)
    }

    fn attach(&self, tx: mpsc::UnboundedSender<WsMessage>) {
        *self.outbound.lock().unwrap_or_else(|e| e.into_inner()) = Some(tx);
    }

    fn detach(&self) {
        self.outbound
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .take();
    }

    fn set_state(&self, state: ConnectionState) {
        let previous = self.state.send_replace(state);
        if previous != state {
            tracing::debug!(from = %previous, to = %state, "connection state");
        }
    }
}
