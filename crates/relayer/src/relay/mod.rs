//! WebSocket relay state and broadcast.

use std::collections::HashMap;
use std::sync::{Mutex, RwLock};

use tokio::sync::broadcast;
use uuid::Uuid;

use shared::{ClientIdentity, EpochMillis, PlayDirective};

use crate::config::Config;

/// Message to broadcast to WebSocket clients.
#[derive(Debug, Clone)]
pub enum BroadcastMessage {
    Play(PlayDirective),
}

/// Relay state: broadcast channel plus the set of open connections.
///
/// Nothing here outlives the process. The only memory between requests is
/// the most recent start time, used to coalesce racing requests.
pub struct RelayState {
    tx: broadcast::Sender<BroadcastMessage>,
    connections: RwLock<HashMap<Uuid, Option<ClientIdentity>>>,
    last_start_at: Mutex<Option<EpochMillis>>,
    start_skew_ms: i64,
    coalesce: bool,
}

impl RelayState {
    pub fn new(config: &Config) -> Self {
        let (tx, _) = broadcast::channel(config.broadcast_capacity);
        Self {
            tx,
            connections: RwLock::new(HashMap::new()),
            last_start_at: Mutex::new(None),
            start_skew_ms: config.start_skew_ms,
            coalesce: config.coalesce_requests,
        }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<BroadcastMessage> {
        self.tx.subscribe()
    }

    /// Returns the number of subscribers the message reached.
    pub fn broadcast(&self, msg: BroadcastMessage) -> usize {
        self.tx.send(msg).unwrap_or(0)
    }

    /// Track a newly opened connection. Returns its connection id.
    pub fn register_connection(&self) -> Uuid {
        let conn_id = Uuid::new_v4();
        self.connections
            .write()
            .unwrap_or_else(|e| e.into_inner())
            .insert(conn_id, None);
        conn_id
    }

    /// Attach the identity announced in `hello`. Returns the identity the
    /// connection had before, if any.
    pub fn identify(&self, conn_id: Uuid, client_id: ClientIdentity) -> Option<ClientIdentity> {
        self.connections
            .write()
            .unwrap_or_else(|e| e.into_inner())
            .insert(conn_id, Some(client_id))
            .flatten()
    }

    #[cfg(test)]
    pub(crate) fn connection_ids(&self) -> Vec<Uuid> {
        self.connections
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .keys()
            .copied()
            .collect()
    }

    pub fn client_of(&self, conn_id: Uuid) -> Option<ClientIdentity> {
        self.connections
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .get(&conn_id)
            .cloned()
            .flatten()
    }

    pub fn unregister_connection(&self, conn_id: Uuid) -> Option<ClientIdentity> {
        self.connections
            .write()
            .unwrap_or_else(|e| e.into_inner())
            .remove(&conn_id)
            .flatten()
    }

    pub fn connection_count(&self) -> usize {
        self.connections
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .len()
    }

    /// Pick the start time for a request arriving at `now`.
    ///
    /// With coalescing on, a previously issued start time that is still in
    /// the future is reused so racing requesters land on one instant.
    pub fn schedule_start(&self, now: EpochMillis) -> EpochMillis {
        let mut last = self
            .last_start_at
            .lock()
            .unwrap_or_else(|e| e.into_inner());
        let start_at = match *last {
            Some(prev) if self.coalesce && prev > now => prev,
            _ => now + self.start_skew_ms,
        };
        *last = Some(start_at);
        start_at
    }

    /// Handle `request_play`: choose the start time and broadcast it to every
    /// connection, the requester included.
    pub fn request_play(&self, origin: ClientIdentity, now: EpochMillis) -> PlayDirective {
        let directive = PlayDirective {
            start_at: self.schedule_start(now),
            origin,
        };
        let reached = self.broadcast(BroadcastMessage::Play(directive.clone()));
        tracing::info!(
            origin = %directive.origin,
            start_at = directive.start_at,
            lead_ms = directive.start_at - now,
            reached,
            "play broadcast"
        );
        directive
    }
}

/// Relay wall clock in epoch milliseconds.
pub fn now_ms() -> EpochMillis {
    chrono::Utc::now().timestamp_millis()
}
