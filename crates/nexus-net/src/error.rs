//! Errors raised by the connection layer.

use nexus_protocol::{PacketError, ProtocolState, RegistryError};

use crate::tcp_server::ConnectionId;

/// Errors raised by connection manager operations and protocol handlers.
#[derive(Debug, thiserror::Error)]
pub enum NetError {
    /// No live session has this id. Usually a benign race with disconnect.
    #[error("unknown client {0:?}")]
    UnknownClient(ConnectionId),

    /// The session's username was already bound.
    #[error("client {client:?} already logged in as `{existing}`")]
    UsernameAlreadyAssigned {
        /// The session.
        client: ConnectionId,
        /// The username bound earlier.
        existing: String,
    },

    /// The requested state change is not an edge of the lifecycle.
    #[error("client {client:?} cannot move from {from:?} to {to:?}")]
    InvalidTransition {
        /// The session.
        client: ConnectionId,
        /// Its current state.
        from: ProtocolState,
        /// The requested state.
        to: ProtocolState,
    },

    /// The client broke the protocol and was disconnected.
    #[error("protocol violation by {client:?}: {reason}")]
    ProtocolViolation {
        /// The offending session.
        client: ConnectionId,
        /// What it did wrong.
        reason: String,
    },

    /// The packet type could not be resolved.
    #[error(transparent)]
    Registry(#[from] RegistryError),

    /// The packet could not be encoded.
    #[error(transparent)]
    Codec(PacketError),
}

impl From<PacketError> for NetError {
    fn from(e: PacketError) -> Self {
        match e {
            PacketError::Registry(e) => NetError::Registry(e),
            other => NetError::Codec(other),
        }
    }
}
