//! Server orchestration: wires the registry, connection manager, dispatch
//! workers, event router and keep-alive monitor together and owns the
//! process-wide shutdown signal.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use nexus_protocol::packets::default_registry;
use nexus_protocol::{FrameConfig, PacketRegistry, RegistryError};
use tokio::net::TcpListener;
use tokio::sync::watch;
use tokio::task::JoinSet;

use crate::dispatch::{DispatchWorker, dispatch_queue};
use crate::handlers::{EntityDirectory, ProtocolHandlers, SequentialEntityIds, StatusInfo};
use crate::keep_alive::KeepAliveMonitor;
use crate::routing::{EventBus, PacketRouter};
use crate::tcp_server::ConnectionManager;

/// How long shutdown waits for tasks and sessions before giving up.
pub const SHUTDOWN_TIMEOUT: Duration = Duration::from_secs(5);

/// Configuration for [`NexusServer`].
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Address to bind to. Default: `0.0.0.0:25565`.
    pub bind_addr: SocketAddr,
    /// Maximum concurrent connections. Default: 20.
    pub max_connections: usize,
    /// Keep-alive period. Default: 10 seconds. Raised to at least
    /// [`MIN_KEEP_ALIVE_INTERVAL`](crate::keep_alive::MIN_KEEP_ALIVE_INTERVAL).
    pub keep_alive_interval: Duration,
    /// Number of dispatch workers. Default: 2.
    pub dispatch_workers: usize,
    pub frame: FrameConfig,
    pub status: StatusInfo,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind_addr: SocketAddr::from(([0, 0, 0, 0], 25565)),
            max_connections: 20,
            keep_alive_interval: Duration::from_secs(10),
            dispatch_workers: 2,
            frame: FrameConfig::default(),
            status: StatusInfo::default(),
        }
    }
}

type RouteHook = Box<dyn FnOnce(&mut PacketRouter, &Arc<ConnectionManager>) + Send>;

/// Builds a [`NexusServer`] with optional custom collaborators.
pub struct ServerBuilder {
    config: ServerConfig,
    entities: Option<Arc<dyn EntityDirectory>>,
    routes: Vec<RouteHook>,
}

impl ServerBuilder {
    pub fn new(config: ServerConfig) -> Self {
        Self {
            config,
            entities: None,
            routes: Vec::new(),
        }
    }

    /// Use `entities` instead of sequential entity ids.
    pub fn entities(mut self, entities: Arc<dyn EntityDirectory>) -> Self {
        self.entities = Some(entities);
        self
    }

    /// Subscribe extra handlers after the default ones.
    pub fn routes<F>(mut self, hook: F) -> Self
    where
        F: FnOnce(&mut PacketRouter, &Arc<ConnectionManager>) + Send + 'static,
    {
        self.routes.push(Box::new(hook));
        self
    }

    /// Build the registry and every component.
    pub fn build(self) -> Result<NexusServer, RegistryError> {
        let registry = Arc::new(default_registry()?);
        tracing::debug!("Registered {} packet types", registry.len());

        let config = self.config;
        let connections = Arc::new(ConnectionManager::new(
            Arc::clone(&registry),
            config.max_connections,
            config.frame,
        ));
        let keep_alive = Arc::new(KeepAliveMonitor::new(
            Arc::clone(&connections),
            config.keep_alive_interval,
        ));

        let mut router = PacketRouter::new(Arc::clone(&connections));
        ProtocolHandlers {
            status: config.status.clone(),
            entities: self
                .entities
                .unwrap_or_else(|| Arc::new(SequentialEntityIds::new())),
            keep_alive: Arc::clone(&keep_alive),
        }
        .install(&mut router);
        for hook in self.routes {
            hook(&mut router, &connections);
        }

        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        Ok(NexusServer {
            config,
            registry,
            connections,
            bus: Arc::new(router),
            keep_alive,
            shutdown_tx,
            shutdown_rx,
        })
    }
}

/// The protocol server.
pub struct NexusServer {
    config: ServerConfig,
    registry: Arc<PacketRegistry>,
    connections: Arc<ConnectionManager>,
    bus: Arc<dyn EventBus>,
    keep_alive: Arc<KeepAliveMonitor>,
    shutdown_tx: watch::Sender<bool>,
    shutdown_rx: watch::Receiver<bool>,
}

impl NexusServer {
    /// Create a server with the default handlers.
    pub fn new(config: ServerConfig) -> Result<Self, RegistryError> {
        ServerBuilder::new(config).build()
    }

    pub fn builder(config: ServerConfig) -> ServerBuilder {
        ServerBuilder::new(config)
    }

    pub fn config(&self) -> &ServerConfig {
        &self.config
    }

    pub fn connections(&self) -> &Arc<ConnectionManager> {
        &self.connections
    }

    pub fn keep_alive(&self) -> &Arc<KeepAliveMonitor> {
        &self.keep_alive
    }

    /// Bind to the configured address and serve until shutdown.
    pub async fn run(&self) -> std::io::Result<()> {
        let listener = TcpListener::bind(self.config.bind_addr).await?;
        tracing::info!("Server listening on {}", self.config.bind_addr);
        self.run_with_listener(listener).await
    }

    /// Serve on a pre-bound listener (useful for tests).
    pub async fn run_with_listener(&self, listener: TcpListener) -> std::io::Result<()> {
        let (sender, queue) = dispatch_queue();
        let mut tasks = JoinSet::new();

        for index in 0..self.config.dispatch_workers.max(1) {
            let worker = DispatchWorker::new(
                index,
                queue.clone(),
                Arc::clone(&self.registry),
                Arc::clone(&self.bus),
            );
            tasks.spawn(worker.run(self.shutdown_rx.clone()));
        }
        tasks.spawn(Arc::clone(&self.keep_alive).run(self.shutdown_rx.clone()));

        self.connections
            .run_with_listener(listener, sender, self.shutdown_rx.clone())
            .await;

        tracing::info!("Server shutting down");
        self.connections.disconnect_all();
        let connections = Arc::clone(&self.connections);
        let drained = tokio::time::timeout(SHUTDOWN_TIMEOUT, async move {
            while tasks.join_next().await.is_some() {}
            while !connections.is_empty() {
                tokio::time::sleep(Duration::from_millis(10)).await;
            }
        })
        .await;
        if drained.is_err() {
            tracing::warn!(
                "Shutdown did not finish within {SHUTDOWN_TIMEOUT:?}, {} sessions left",
                self.connections.len()
            );
        }
        Ok(())
    }

    /// Signal every component to stop.
    pub fn shutdown(&self) {
        self.shutdown_tx.send_replace(true);
    }
}
