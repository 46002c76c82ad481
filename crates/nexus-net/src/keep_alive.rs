//! Fixed-period liveness check for Play-state sessions.
//!
//! Every tick, sessions still holding an unanswered nonce from the previous
//! tick are disconnected; then a fresh nonce is broadcast to every Play
//! session and recorded as pending. A reply clears the entry only if its
//! nonce matches.

use std::sync::Arc;
use std::time::Duration;

use dashmap::DashMap;
use nexus_protocol::ProtocolState;
use nexus_protocol::packets::ClientboundKeepAlive;
use tokio::sync::watch;
use tokio::time::MissedTickBehavior;

use crate::error::NetError;
use crate::session::signalled;
use crate::tcp_server::{ConnectionId, ConnectionManager};

/// What one tick did.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct KeepAliveTick {
    /// Sessions disconnected for not answering the previous nonce.
    pub timed_out: Vec<ConnectionId>,
    /// Sessions sent the new nonce.
    pub pinged: Vec<ConnectionId>,
}

/// Shortest period the monitor ticks at.
pub const MIN_KEEP_ALIVE_INTERVAL: Duration = Duration::from_millis(100);

pub struct KeepAliveMonitor {
    connections: Arc<ConnectionManager>,
    interval: Duration,
    pending: DashMap<ConnectionId, i64>,
}

impl KeepAliveMonitor {
    /// Periods below [`MIN_KEEP_ALIVE_INTERVAL`] are raised to it.
    pub fn new(connections: Arc<ConnectionManager>, interval: Duration) -> Self {
        if interval < MIN_KEEP_ALIVE_INTERVAL {
            tracing::warn!("Keep-alive interval {interval:?} too short, using {MIN_KEEP_ALIVE_INTERVAL:?}");
        }
        Self {
            connections,
            interval: interval.max(MIN_KEEP_ALIVE_INTERVAL),
            pending: DashMap::new(),
        }
    }

    pub fn interval(&self) -> Duration {
        self.interval
    }

    /// Run one tick with a random nonce.
    pub fn tick(&self) -> Result<KeepAliveTick, NetError> {
        self.tick_with_nonce(rand::random::<i64>())
    }

    /// Run one tick with the given nonce.
    pub fn tick_with_nonce(&self, nonce: i64) -> Result<KeepAliveTick, NetError> {
        let mut outcome = KeepAliveTick::default();

        let mut expired = Vec::new();
        self.pending.retain(|client, _| {
            expired.push(*client);
            false
        });
        for client in expired {
            if self.connections.state_of(client) == Some(ProtocolState::Play) {
                tracing::info!("Connection {client:?} timed out");
                self.connections.disconnect(client);
                outcome.timed_out.push(client);
            }
        }

        // Record the nonce before queueing, so an immediate reply finds it.
        let frame = self
            .connections
            .registry()
            .encode(&ClientboundKeepAlive { id: nonce })?;
        for session in self.connections.sessions_in(ProtocolState::Play) {
            let client = session.id();
            self.pending.insert(client, nonce);
            if session.send_frame(frame.clone()) {
                outcome.pinged.push(client);
            } else {
                self.pending.remove(&client);
            }
        }

        tracing::trace!(
            "Keep-alive tick: {} pinged, {} timed out",
            outcome.pinged.len(),
            outcome.timed_out.len()
        );
        Ok(outcome)
    }

    /// Handle a client's keep-alive reply.
    ///
    /// A nonce that is not outstanding for `client` disconnects it.
    pub fn handle_reply(&self, client: ConnectionId, nonce: i64) -> Result<(), NetError> {
        if self.pending.remove_if(&client, |_, expected| *expected == nonce).is_some() {
            return Ok(());
        }

        let reason = match self.pending.get(&client) {
            Some(expected) => format!("keep-alive nonce {nonce} does not match {}", *expected),
            None => format!("unsolicited keep-alive nonce {nonce}"),
        };
        tracing::warn!("Connection {client:?} sent a bad keep-alive: {reason}");
        self.pending.remove(&client);
        self.connections.disconnect(client);
        Err(NetError::ProtocolViolation { client, reason })
    }

    /// Whether `client` has an unanswered nonce.
    pub fn is_pending(&self, client: ConnectionId) -> bool {
        self.pending.contains_key(&client)
    }

    pub fn pending_count(&self) -> usize {
        self.pending.len()
    }

    /// Tick every interval until shutdown.
    pub async fn run(self: Arc<Self>, mut shutdown: watch::Receiver<bool>) {
        let mut ticker = tokio::time::interval(self.interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        // The first tick completes immediately.
        ticker.tick().await;

        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    if let Err(e) = self.tick() {
                        tracing::warn!("Keep-alive tick failed: {e}");
                    }
                }
                _ = signalled(&mut shutdown) => break,
            }
        }
        tracing::debug!("Keep-alive monitor stopped");
    }
}
