//! Connection layer: sessions, the connection manager, packet dispatch, the
//! event router, keep-alive and the default login flow.

pub mod dispatch;
pub mod error;
pub mod handlers;
pub mod keep_alive;
pub mod routing;
pub mod server;
pub mod session;
pub mod tcp_server;

pub use dispatch::{DispatchOutcome, DispatchQueue, DispatchSender, DispatchWorker, QueuedFrame, dispatch_queue};
pub use error::NetError;
pub use handlers::{
    EntityDirectory, PROTOCOL_VERSION, ProtocolHandlers, SequentialEntityIds, StatusInfo, login_play,
    status_json,
};
pub use keep_alive::{KeepAliveMonitor, KeepAliveTick, MIN_KEEP_ALIVE_INTERVAL};
pub use routing::{EventBus, HandlerContext, PacketReceived, PacketRouter};
pub use server::{NexusServer, SHUTDOWN_TIMEOUT, ServerBuilder, ServerConfig};
pub use session::{FLUSH_TIMEOUT, OUTBOUND_QUEUE_CAPACITY, Profile, Session};
pub use tcp_server::{ConnectionId, ConnectionLimitReached, ConnectionManager, IdGenerator};
