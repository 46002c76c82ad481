//! Per-connection session: protocol state, identity and the socket loops.
//!
//! Each accepted socket gets one [`Session`] plus two tasks:
//!
//! - the **read loop** fills a [`FrameBuffer`], extracts frames and queues
//!   them for dispatch. Before queueing, it takes the session's receive gate.
//!   The gate has a single permit and that permit travels with the queued
//!   frame. The next frame is only extracted once the dispatch worker drops
//!   it, so a session has at most one frame in flight.
//! - the **write loop** drains the outbound channel into the socket, so
//!   handlers can send without awaiting socket I/O. The channel is bounded;
//!   a peer that stops reading until it fills is kicked.
//!
//! Disconnecting a session flips its kick signal, which stops both loops,
//! including a write blocked on a peer that no longer reads.

use std::net::SocketAddr;
use std::sync::atomic::{AtomicU8, Ordering};
use std::sync::{Arc, OnceLock};
use std::time::Duration;

use nexus_protocol::{FrameBuffer, FrameConfig, ProtocolState, Uuid};
use tokio::io::{AsyncRead, AsyncWrite, AsyncWriteExt};
use tokio::sync::mpsc::error::TrySendError;
use tokio::sync::{Semaphore, mpsc, watch};

use crate::dispatch::{DispatchSender, QueuedFrame};
use crate::tcp_server::ConnectionId;

/// Frames a session may have queued before it is kicked as unresponsive.
pub const OUTBOUND_QUEUE_CAPACITY: usize = 1024;

/// How long a kicked session's write loop may spend flushing queued frames.
pub const FLUSH_TIMEOUT: Duration = Duration::from_secs(1);

/// Identity bound by the login step.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Profile {
    pub username: String,
    pub uuid: Uuid,
}

/// One client connection.
#[derive(Debug)]
pub struct Session {
    id: ConnectionId,
    peer_addr: SocketAddr,
    state: AtomicU8,
    profile: OnceLock<Profile>,
    outbound: mpsc::Sender<Vec<u8>>,
    receive_gate: Arc<Semaphore>,
    kick: watch::Sender<bool>,
}

/// The receiving ends handed to the session's socket loops.
pub(crate) struct SessionChannels {
    pub outbound: mpsc::Receiver<Vec<u8>>,
    pub kicked: watch::Receiver<bool>,
}

impl Session {
    pub(crate) fn new(id: ConnectionId, peer_addr: SocketAddr) -> (Arc<Self>, SessionChannels) {
        let (outbound, outbound_rx) = mpsc::channel(OUTBOUND_QUEUE_CAPACITY);
        let (kick, kicked) = watch::channel(false);
        let session = Arc::new(Self {
            id,
            peer_addr,
            state: AtomicU8::new(ProtocolState::Handshake.ordinal()),
            profile: OnceLock::new(),
            outbound,
            receive_gate: Arc::new(Semaphore::new(1)),
            kick,
        });
        (
            session,
            SessionChannels {
                outbound: outbound_rx,
                kicked,
            },
        )
    }

    pub fn id(&self) -> ConnectionId {
        self.id
    }

    pub fn peer_addr(&self) -> SocketAddr {
        self.peer_addr
    }

    /// Current protocol state.
    pub fn state(&self) -> ProtocolState {
        ProtocolState::from_ordinal(self.state.load(Ordering::Acquire))
            .unwrap_or(ProtocolState::Handshake)
    }

    /// Move to `next` if the lifecycle allows it.
    ///
    /// Returns the previous state, or the current one on refusal.
    pub(crate) fn transition(&self, next: ProtocolState) -> Result<ProtocolState, ProtocolState> {
        self.state
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |current| {
                ProtocolState::from_ordinal(current)
                    .filter(|state| state.can_transition_to(next))
                    .map(|_| next.ordinal())
            })
            .map(|previous| ProtocolState::from_ordinal(previous).unwrap_or(ProtocolState::Handshake))
            .map_err(|current| ProtocolState::from_ordinal(current).unwrap_or(ProtocolState::Handshake))
    }

    /// Identity bound at login, if any.
    pub fn profile(&self) -> Option<&Profile> {
        self.profile.get()
    }

    /// Username bound at login, if any.
    pub fn username(&self) -> Option<&str> {
        self.profile.get().map(|p| p.username.as_str())
    }

    /// Bind the identity. Hands `profile` back if one was already bound.
    pub(crate) fn assign_profile(&self, profile: Profile) -> Result<(), Profile> {
        self.profile.set(profile)
    }

    /// Queue an encoded frame for the write loop.
    ///
    /// Returns `false` once the write loop has gone away. A full queue kicks
    /// the session and also returns `false`.
    pub(crate) fn send_frame(&self, frame: Vec<u8>) -> bool {
        match self.outbound.try_send(frame) {
            Ok(()) => true,
            Err(TrySendError::Full(_)) => {
                tracing::warn!(
                    "Connection {:?} has {OUTBOUND_QUEUE_CAPACITY} unsent frames, disconnecting",
                    self.id
                );
                self.kick();
                false
            }
            Err(TrySendError::Closed(_)) => false,
        }
    }

    /// Ask both socket loops to stop.
    pub(crate) fn kick(&self) {
        self.kick.send_replace(true);
    }

    /// Whether the session has been asked to disconnect.
    pub fn is_closing(&self) -> bool {
        *self.kick.borrow()
    }
}

/// Resolve once `rx` carries `true` or its sender is gone.
pub(crate) async fn signalled(rx: &mut watch::Receiver<bool>) {
    let _ = rx.wait_for(|flag| *flag).await;
}

// ---------------------------------------------------------------------------
// Socket loops
// ---------------------------------------------------------------------------

/// Why a read loop stopped.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum ReadLoopExit {
    PeerClosed,
    Kicked,
    Shutdown,
    ReadError,
    FatalFrame,
    QueueClosed,
}

/// Read, frame and queue inbound packets until the session ends.
pub(crate) async fn read_loop<R: AsyncRead + Unpin>(
    session: Arc<Session>,
    mut reader: R,
    frame_config: FrameConfig,
    queue: DispatchSender,
    mut kicked: watch::Receiver<bool>,
    mut shutdown: watch::Receiver<bool>,
) -> ReadLoopExit {
    let id = session.id();
    let mut buffer = FrameBuffer::new(frame_config);

    loop {
        loop {
            let frame = match buffer.next_frame() {
                Ok(Some(frame)) => frame,
                Ok(None) => break,
                Err(e) if e.is_fatal() => {
                    tracing::warn!("Connection {id:?} sent an unrecoverable frame: {e}");
                    return ReadLoopExit::FatalFrame;
                }
                Err(e) => {
                    tracing::debug!("Connection {id:?} dropped a frame: {e}");
                    continue;
                }
            };

            let permit = tokio::select! {
                permit = Arc::clone(&session.receive_gate).acquire_owned() => match permit {
                    Ok(permit) => permit,
                    Err(_) => return ReadLoopExit::Kicked,
                },
                _ = signalled(&mut kicked) => return ReadLoopExit::Kicked,
                _ = signalled(&mut shutdown) => return ReadLoopExit::Shutdown,
            };

            // Read after the gate so transitions made by the previous
            // packet's handlers apply to this one.
            let state = session.state();
            tracing::trace!(client = ?id, packet_id = frame.packet_id, ?state, "Frame received");
            let queued = QueuedFrame {
                frame,
                client_id: id,
                state,
                permit,
            };
            if queue.send(queued).is_err() {
                return ReadLoopExit::QueueClosed;
            }
        }

        tokio::select! {
            result = buffer.read_from(&mut reader) => match result {
                Ok(0) => return ReadLoopExit::PeerClosed,
                Ok(n) => tracing::trace!("Connection {id:?} received {n} bytes"),
                Err(e) => {
                    tracing::debug!("Connection {id:?} read failed: {e}");
                    return ReadLoopExit::ReadError;
                }
            },
            _ = signalled(&mut kicked) => return ReadLoopExit::Kicked,
            _ = signalled(&mut shutdown) => return ReadLoopExit::Shutdown,
        }
    }
}

/// Write queued frames to the socket until the session ends.
///
/// A failed write kicks the session. A kick abandons a write the peer is
/// not draining; otherwise frames queued before the kick are flushed for at
/// most [`FLUSH_TIMEOUT`].
pub(crate) async fn write_loop<W: AsyncWrite + Unpin>(
    session: Arc<Session>,
    mut writer: W,
    mut outbound: mpsc::Receiver<Vec<u8>>,
    mut kicked: watch::Receiver<bool>,
) {
    let id = session.id();
    loop {
        tokio::select! {
            frame = outbound.recv() => match frame {
                Some(frame) => {
                    tokio::select! {
                        biased;
                        result = writer.write_all(&frame) => {
                            if let Err(e) = result {
                                tracing::debug!("Connection {id:?} write failed: {e}");
                                session.kick();
                                return;
                            }
                        }
                        _ = signalled(&mut kicked) => {
                            tracing::debug!("Connection {id:?} kicked mid-write, dropping the rest");
                            return;
                        }
                    }
                }
                None => break,
            },
            _ = signalled(&mut kicked) => break,
        }
    }

    // Flush what was queued before the kick, e.g. a final reply.
    let flush = async {
        while let Ok(frame) = outbound.try_recv() {
            writer.write_all(&frame).await?;
        }
        writer.shutdown().await
    };
    match tokio::time::timeout(FLUSH_TIMEOUT, flush).await {
        Ok(Ok(())) => {}
        Ok(Err(e)) => tracing::debug!("Connection {id:?} final flush failed: {e}"),
        Err(_) => tracing::debug!("Connection {id:?} final flush timed out"),
    }
}
