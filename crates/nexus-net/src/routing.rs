//! Event bus: fan decoded packets out to type-specific handlers.
//!
//! Dispatch workers publish a [`PacketReceived`] for every decoded packet.
//! The [`PacketRouter`] is the default [`EventBus`]: it looks up handlers by
//! the packet's Rust type and runs them in subscription order. Handlers talk
//! back to clients through the [`HandlerContext`].

use std::any::TypeId;
use std::collections::HashMap;
use std::sync::Arc;

use nexus_protocol::{AnyPacket, Packet, ProtocolState};

use crate::error::NetError;
use crate::tcp_server::{ConnectionId, ConnectionManager};

// ---------------------------------------------------------------------------
// Event
// ---------------------------------------------------------------------------

/// A decoded packet and the client it came from.
#[derive(Debug, Clone)]
pub struct PacketReceived {
    pub packet: Arc<dyn AnyPacket>,
    pub client_id: ConnectionId,
    /// The session state the packet was decoded in.
    pub state: ProtocolState,
}

/// Receives every decoded packet.
///
/// `publish` runs on a dispatch worker and must return before the sending
/// session's next packet is dispatched.
pub trait EventBus: Send + Sync {
    fn publish(&self, event: &PacketReceived);
}

// ---------------------------------------------------------------------------
// Handler
// ---------------------------------------------------------------------------

/// Context provided to every packet handler.
#[derive(Clone)]
pub struct HandlerContext {
    /// The connection that sent this packet.
    pub client_id: ConnectionId,
    /// The state the packet was decoded in.
    pub state: ProtocolState,
    /// Shared connection manager for replies and session control.
    pub connections: Arc<ConnectionManager>,
}

impl HandlerContext {
    /// Queue a packet for the sending client.
    pub fn reply<P: Packet>(&self, packet: &P) -> Result<(), NetError> {
        self.connections.send_to(self.client_id, packet)
    }

    /// Move the sending client to `state`.
    pub fn set_state(&self, state: ProtocolState) -> Result<(), NetError> {
        self.connections.set_state(self.client_id, state)
    }

    /// Disconnect the sending client and report why.
    pub fn violation(&self, reason: impl Into<String>) -> NetError {
        self.connections.disconnect(self.client_id);
        NetError::ProtocolViolation {
            client: self.client_id,
            reason: reason.into(),
        }
    }
}

type ErasedHandler = Box<dyn Fn(&dyn AnyPacket, &HandlerContext) -> Result<(), NetError> + Send + Sync>;

// ---------------------------------------------------------------------------
// Router
// ---------------------------------------------------------------------------

/// Routes decoded packets to the handlers subscribed to their type.
pub struct PacketRouter {
    handlers: HashMap<TypeId, Vec<ErasedHandler>>,
    catch_all: Vec<ErasedHandler>,
    connections: Arc<ConnectionManager>,
}

impl PacketRouter {
    /// Create a router with no subscriptions.
    pub fn new(connections: Arc<ConnectionManager>) -> Self {
        Self {
            handlers: HashMap::new(),
            catch_all: Vec::new(),
            connections,
        }
    }

    /// Run `handler` for every packet of type `P`.
    pub fn subscribe<P, F>(&mut self, handler: F)
    where
        P: Packet,
        F: Fn(&P, &HandlerContext) -> Result<(), NetError> + Send + Sync + 'static,
    {
        let erased: ErasedHandler = Box::new(move |packet: &dyn AnyPacket, ctx: &HandlerContext| {
            match packet.downcast_ref::<P>() {
                Some(packet) => handler(packet, ctx),
                None => Ok(()),
            }
        });
        self.handlers.entry(TypeId::of::<P>()).or_default().push(erased);
    }

    /// Run `handler` for every packet, after the typed handlers.
    pub fn subscribe_all<F>(&mut self, handler: F)
    where
        F: Fn(&dyn AnyPacket, &HandlerContext) -> Result<(), NetError> + Send + Sync + 'static,
    {
        self.catch_all.push(Box::new(handler));
    }

    /// Number of handlers subscribed to `P`.
    pub fn handler_count<P: Packet>(&self) -> usize {
        self.handlers.get(&TypeId::of::<P>()).map_or(0, Vec::len)
    }

    /// Run every handler for `event`. Returns how many ran.
    ///
    /// A failing handler is logged and does not stop the others.
    pub fn route(&self, event: &PacketReceived) -> usize {
        let ctx = HandlerContext {
            client_id: event.client_id,
            state: event.state,
            connections: Arc::clone(&self.connections),
        };
        let packet = event.packet.as_ref();
        let typed = self
            .handlers
            .get(&packet.as_any().type_id())
            .map(Vec::as_slice)
            .unwrap_or_default();

        if typed.is_empty() && self.catch_all.is_empty() {
            tracing::debug!(client = ?event.client_id, "No handler for {}, dropping", packet.name());
            return 0;
        }

        let mut ran = 0;
        for handler in typed.iter().chain(&self.catch_all) {
            ran += 1;
            match handler(packet, &ctx) {
                Ok(()) => {}
                Err(NetError::UnknownClient(client)) => {
                    tracing::debug!("Client {client:?} left while handling {}", packet.name());
                }
                Err(e) => {
                    tracing::warn!(client = ?event.client_id, packet = packet.name(), "Handler failed: {e}");
                }
            }
        }
        ran
    }
}

impl EventBus for PacketRouter {
    fn publish(&self, event: &PacketReceived) {
        self.route(event);
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
