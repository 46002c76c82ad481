//! Packet dispatch: the queue between session read loops and the event bus.
//!
//! Read loops push [`QueuedFrame`]s; any number of [`DispatchWorker`]s pull
//! them, decode against the [`PacketRegistry`] and publish the typed packet.
//! Each queued frame owns its session's receive-gate permit, so dropping the
//! item on any path (published, unknown, malformed, shutdown) reopens the
//! gate exactly once.

use std::sync::Arc;

use nexus_protocol::{
    Frame, PacketDirection, PacketError, PacketRegistry, ProtocolState, RegistryError,
};
use tokio::sync::{Mutex, OwnedSemaphorePermit, mpsc, watch};

use crate::routing::{EventBus, PacketReceived};
use crate::session::signalled;
use crate::tcp_server::ConnectionId;

/// A frame waiting to be decoded, tagged with its origin.
#[derive(Debug)]
pub struct QueuedFrame {
    pub frame: Frame,
    pub client_id: ConnectionId,
    /// Session state when the frame cleared the receive gate.
    pub state: ProtocolState,
    pub(crate) permit: OwnedSemaphorePermit,
}

/// Producer half of the dispatch queue, cloned into every read loop.
#[derive(Debug, Clone)]
pub struct DispatchSender {
    tx: mpsc::UnboundedSender<QueuedFrame>,
}

impl DispatchSender {
    /// Enqueue a frame. Hands it back if every consumer is gone.
    pub fn send(&self, item: QueuedFrame) -> Result<(), QueuedFrame> {
        self.tx.send(item).map_err(|e| e.0)
    }
}

/// Consumer half of the dispatch queue, shared by all workers.
#[derive(Debug, Clone)]
pub struct DispatchQueue {
    rx: Arc<Mutex<mpsc::UnboundedReceiver<QueuedFrame>>>,
}

impl DispatchQueue {
    /// Take the next frame, or `None` once every sender is gone.
    pub async fn recv(&self) -> Option<QueuedFrame> {
        self.rx.lock().await.recv().await
    }
}

/// Create a connected sender/queue pair.
pub fn dispatch_queue() -> (DispatchSender, DispatchQueue) {
    let (tx, rx) = mpsc::unbounded_channel();
    (
        DispatchSender { tx },
        DispatchQueue {
            rx: Arc::new(Mutex::new(rx)),
        },
    )
}

/// What happened to one dequeued frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DispatchOutcome {
    Published,
    UnknownPacket,
    Malformed,
}

/// Drains the dispatch queue into the event bus.
pub struct DispatchWorker {
    index: usize,
    queue: DispatchQueue,
    registry: Arc<PacketRegistry>,
    bus: Arc<dyn EventBus>,
}

impl DispatchWorker {
    pub fn new(
        index: usize,
        queue: DispatchQueue,
        registry: Arc<PacketRegistry>,
        bus: Arc<dyn EventBus>,
    ) -> Self {
        Self {
            index,
            queue,
            registry,
            bus,
        }
    }

    /// Process frames until shutdown or until the queue closes.
    pub async fn run(self, mut shutdown: watch::Receiver<bool>) {
        tracing::debug!("Dispatch worker {} started", self.index);
        loop {
            tokio::select! {
                item = self.queue.recv() => match item {
                    Some(item) => {
                        self.process(item);
                    }
                    None => break,
                },
                _ = signalled(&mut shutdown) => break,
            }
        }
        tracing::debug!("Dispatch worker {} stopped", self.index);
    }

    /// Decode and publish one frame, then release its session's gate.
    pub fn process(&self, item: QueuedFrame) -> DispatchOutcome {
        let QueuedFrame {
            frame,
            client_id,
            state,
            permit,
        } = item;

        let outcome = match self.registry.decode(&frame, state, PacketDirection::ServerBound) {
            Ok(packet) => {
                tracing::trace!(client = ?client_id, packet = packet.name(), "Dispatching packet");
                let event = PacketReceived {
                    packet: Arc::from(packet),
                    client_id,
                    state,
                };
                self.bus.publish(&event);
                DispatchOutcome::Published
            }
            Err(PacketError::Registry(RegistryError::NotFound { id, .. })) => {
                tracing::info!(
                    client = ?client_id,
                    "No packet registered for id {id:#04x} in {state:?}, dropping"
                );
                DispatchOutcome::UnknownPacket
            }
            Err(e) => {
                tracing::warn!(client = ?client_id, "Dropping undecodable packet: {e}");
                DispatchOutcome::Malformed
            }
        };

        drop(permit);
        outcome
    }
}
