//! TCP accept loop and the live session table.

use std::net::SocketAddr;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use dashmap::DashMap;
use nexus_protocol::{FrameConfig, Packet, PacketRegistry, ProtocolState, Uuid};
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::net::TcpListener;
use tokio::sync::watch;

use crate::dispatch::DispatchSender;
use crate::error::NetError;
use crate::session::{Profile, Session, read_loop, signalled, write_loop};

/// Unique identifier for a TCP connection within a server session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ConnectionId(pub u64);

/// Atomic generator for monotonically increasing [`ConnectionId`]s.
pub struct IdGenerator {
    next: AtomicU64,
}

impl IdGenerator {
    /// Create a new generator starting at 1.
    pub fn new() -> Self {
        Self {
            next: AtomicU64::new(1),
        }
    }

    /// Return the next unique [`ConnectionId`].
    pub fn next_id(&self) -> ConnectionId {
        ConnectionId(self.next.fetch_add(1, Ordering::Relaxed))
    }
}

impl Default for IdGenerator {
    fn default() -> Self {
        Self::new()
    }
}

/// Error returned when the session table is at capacity.
#[derive(Debug, thiserror::Error)]
#[error("connection limit reached")]
pub struct ConnectionLimitReached;

/// Owns the live sessions and every operation that targets them.
///
/// Sessions are added on accept and removed when their read loop ends.
/// Iteration tolerates concurrent removal, so a broadcast racing a
/// disconnect simply skips the departed session.
pub struct ConnectionManager {
    sessions: DashMap<ConnectionId, Arc<Session>>,
    registry: Arc<PacketRegistry>,
    id_gen: IdGenerator,
    max_connections: usize,
    frame_config: FrameConfig,
}

impl ConnectionManager {
    pub fn new(registry: Arc<PacketRegistry>, max_connections: usize, frame_config: FrameConfig) -> Self {
        Self {
            sessions: DashMap::new(),
            registry,
            id_gen: IdGenerator::new(),
            max_connections,
            frame_config,
        }
    }

    /// The registry used to encode outbound packets.
    pub fn registry(&self) -> &Arc<PacketRegistry> {
        &self.registry
    }

    /// Return the number of live sessions.
    pub fn len(&self) -> usize {
        self.sessions.len()
    }

    /// Return whether no session is live.
    pub fn is_empty(&self) -> bool {
        self.sessions.is_empty()
    }

    pub fn max_connections(&self) -> usize {
        self.max_connections
    }

    /// Look up a live session.
    pub fn session(&self, client: ConnectionId) -> Option<Arc<Session>> {
        self.sessions.get(&client).map(|entry| Arc::clone(entry.value()))
    }

    /// Current state of a live session.
    pub fn state_of(&self, client: ConnectionId) -> Option<ProtocolState> {
        self.sessions.get(&client).map(|entry| entry.state())
    }

    // -- Outbound ----------------------------------------------------------

    /// Queue `packet` for one client.
    ///
    /// An unknown client is treated as already gone and is not an error.
    /// Fails only when the packet type cannot be encoded.
    pub fn send_to<P: Packet>(&self, client: ConnectionId, packet: &P) -> Result<(), NetError> {
        let frame = self.registry.encode(packet)?;
        match self.sessions.get(&client) {
            Some(session) => {
                if !session.send_frame(frame) {
                    tracing::debug!("Connection {client:?} writer gone, dropping {}", P::NAME);
                }
            }
            None => tracing::debug!("Connection {client:?} gone, dropping {}", P::NAME),
        }
        Ok(())
    }

    /// Queue `packet` for every session currently in `state`.
    ///
    /// The packet is encoded once. Returns the clients it was queued for.
    pub fn broadcast<P: Packet>(&self, packet: &P, state: ProtocolState) -> Result<Vec<ConnectionId>, NetError> {
        let frame = self.registry.encode(packet)?;
        Ok(self
            .sessions_in(state)
            .into_iter()
            .filter(|session| session.send_frame(frame.clone()))
            .map(|session| session.id())
            .collect())
    }

    /// Snapshot of the open sessions currently in `state`, by id.
    pub fn sessions_in(&self, state: ProtocolState) -> Vec<Arc<Session>> {
        let mut sessions: Vec<_> = self
            .sessions
            .iter()
            .filter(|entry| entry.state() == state && !entry.is_closing())
            .map(|entry| Arc::clone(entry.value()))
            .collect();
        sessions.sort_by_key(|session| session.id());
        sessions
    }

    // -- Session control ---------------------------------------------------

    /// Move a session to `state`.
    pub fn set_state(&self, client: ConnectionId, state: ProtocolState) -> Result<(), NetError> {
        let session = self.session(client).ok_or(NetError::UnknownClient(client))?;
        let previous = session
            .transition(state)
            .map_err(|from| NetError::InvalidTransition {
                client,
                from,
                to: state,
            })?;
        tracing::debug!("Connection {client:?} moved from {previous:?} to {state:?}");
        Ok(())
    }

    /// Bind the login identity of a session. Write-once.
    pub fn assign_username(&self, client: ConnectionId, username: &str, uuid: Uuid) -> Result<(), NetError> {
        let session = self.session(client).ok_or(NetError::UnknownClient(client))?;
        let profile = Profile {
            username: username.to_owned(),
            uuid,
        };
        session.assign_profile(profile).map_err(|_| NetError::UsernameAlreadyAssigned {
            client,
            existing: session.username().unwrap_or_default().to_owned(),
        })?;
        tracing::info!("Connection {client:?} logged in as {username}");
        Ok(())
    }

    /// Close a session's socket. It leaves the table once both socket loops
    /// have stopped and the stream is dropped.
    ///
    /// Returns `false` if the client was unknown.
    pub fn disconnect(&self, client: ConnectionId) -> bool {
        match self.sessions.get(&client) {
            Some(session) => {
                session.kick();
                tracing::info!("Disconnecting {client:?}");
                true
            }
            None => false,
        }
    }

    /// Snapshot of `(client, username)` for sessions in `state`, by id.
    pub fn list_sessions(&self, state: ProtocolState) -> Vec<(ConnectionId, Option<String>)> {
        let mut sessions: Vec<_> = self
            .sessions
            .iter()
            .filter(|entry| entry.state() == state)
            .map(|entry| (*entry.key(), entry.username().map(str::to_owned)))
            .collect();
        sessions.sort_by_key(|(id, _)| *id);
        sessions
    }

    /// Ask every session to close.
    pub fn disconnect_all(&self) {
        for entry in self.sessions.iter() {
            entry.kick();
        }
    }

    // -- Accept ------------------------------------------------------------

    /// Register a session for `stream` and start its socket tasks.
    ///
    /// The session is removed from the table when its read loop ends and its
    /// write loop has released the stream.
    pub fn spawn_session<S>(
        self: &Arc<Self>,
        stream: S,
        peer_addr: SocketAddr,
        queue: DispatchSender,
        shutdown: watch::Receiver<bool>,
    ) -> Result<ConnectionId, ConnectionLimitReached>
    where
        S: AsyncRead + AsyncWrite + Send + 'static,
    {
        if self.sessions.len() >= self.max_connections {
            return Err(ConnectionLimitReached);
        }

        let id = self.id_gen.next_id();
        let (session, channels) = Session::new(id, peer_addr);
        self.sessions.insert(id, Arc::clone(&session));

        let (reader, writer) = tokio::io::split(stream);
        let writer_task = tokio::spawn(write_loop(
            Arc::clone(&session),
            writer,
            channels.outbound,
            channels.kicked.clone(),
        ));

        let manager = Arc::clone(self);
        let frame_config = self.frame_config;
        tokio::spawn(async move {
            let exit = read_loop(
                Arc::clone(&session),
                reader,
                frame_config,
                queue,
                channels.kicked,
                shutdown,
            )
            .await;
            session.kick();
            let _ = writer_task.await;
            // Only now is the socket closed, so the slot may be reused.
            manager.sessions.remove(&id);
            tracing::info!("Connection {id:?} closed ({exit:?})");
        });

        Ok(id)
    }

    /// Accept connections until shutdown.
    ///
    /// Sockets arriving while the table is full are closed without a session.
    pub async fn run_with_listener(
        self: &Arc<Self>,
        listener: TcpListener,
        queue: DispatchSender,
        shutdown: watch::Receiver<bool>,
    ) {
        let mut shutdown_rx = shutdown.clone();

        loop {
            tokio::select! {
                result = listener.accept() => {
                    let (stream, peer_addr) = match result {
                        Ok(accepted) => accepted,
                        Err(e) => {
                            tracing::warn!("Accept failed: {e}");
                            continue;
                        }
                    };
                    if self.sessions.len() >= self.max_connections {
                        tracing::info!("Connection limit reached, rejecting {peer_addr}");
                        drop(stream);
                        continue;
                    }
                    if let Err(e) = stream.set_nodelay(true) {
                        tracing::debug!("Could not set TCP_NODELAY for {peer_addr}: {e}");
                    }

                    match self.spawn_session(stream, peer_addr, queue.clone(), shutdown.clone()) {
                        Ok(id) => tracing::info!("Accepted connection {id:?} from {peer_addr}"),
                        Err(ConnectionLimitReached) => {
                            tracing::info!("Connection limit reached, rejecting {peer_addr}");
                        }
                    }
                }
                _ = signalled(&mut shutdown_rx) => {
                    tracing::info!("Accept loop shutting down");
                    break;
                }
            }
        }
    }
}
