//! Default protocol handlers: status ping, login and configuration flow.
//!
//! [`ProtocolHandlers::install`] subscribes everything a vanilla client needs
//! to get from the handshake into Play:
//!
//! | Packet | Reaction |
//! |---|---|
//! | `Handshake` | state -> `next_state` (Status or Login only) |
//! | `StatusRequest` | `StatusResponse` with the status JSON |
//! | `PingRequest` | `PingResponse` with the same time |
//! | `LoginStart` | bind username, `LoginSuccess` |
//! | `LoginAcknowledged` | state -> Configuration, `ClientboundKnownPacks` |
//! | `ClientInformation` | `FinishConfiguration` |
//! | `AcknowledgeFinishConfiguration` | state -> Play, entity id, `LoginPlay` |
//! | `ServerboundKeepAlive` | keep-alive monitor |

use std::sync::Arc;
use std::sync::atomic::{AtomicI32, Ordering};

use nexus_protocol::packets::{
    AcknowledgeFinishConfiguration, ClientInformation, ClientboundKnownPacks, DimensionType,
    FinishConfiguration, GameMode, Handshake, LoginAcknowledged, LoginPlay, LoginStart,
    LoginSuccess, PingRequest, PingResponse, ServerboundKeepAlive, ServerboundKnownPacks,
    ServerboundPluginMessage, StatusRequest, StatusResponse,
};
use nexus_protocol::{ProtocolState, Uuid};
use serde::Serialize;

use crate::keep_alive::KeepAliveMonitor;
use crate::routing::PacketRouter;
use crate::tcp_server::{ConnectionId, ConnectionManager};

/// Protocol version spoken by this server (Minecraft 1.21.1).
pub const PROTOCOL_VERSION: i32 = 767;

/// What the server advertises in the server list.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StatusInfo {
    pub protocol_version: i32,
    pub server_version: String,
    pub motd: String,
    pub max_players: usize,
}

impl Default for StatusInfo {
    fn default() -> Self {
        Self {
            protocol_version: PROTOCOL_VERSION,
            server_version: "1.21.1".to_owned(),
            motd: "Nexus - A Minecraft server thought different".to_owned(),
            max_players: 20,
        }
    }
}

// ---------------------------------------------------------------------------
// Status document
// ---------------------------------------------------------------------------

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct StatusDocument<'a> {
    version: StatusVersion<'a>,
    players: StatusPlayers,
    description: StatusDescription<'a>,
    enforces_secure_chat: bool,
}

#[derive(Debug, Serialize)]
struct StatusVersion<'a> {
    name: &'a str,
    protocol: i32,
}

#[derive(Debug, Serialize)]
struct StatusPlayers {
    max: usize,
    online: usize,
    sample: Vec<StatusPlayerSample>,
}

#[derive(Debug, Serialize)]
struct StatusPlayerSample {
    name: String,
    id: Uuid,
}

#[derive(Debug, Serialize)]
struct StatusDescription<'a> {
    text: &'a str,
}

/// Render the status JSON for the current session table.
pub fn status_json(info: &StatusInfo, connections: &ConnectionManager) -> Result<String, serde_json::Error> {
    let sample = connections
        .list_sessions(ProtocolState::Play)
        .into_iter()
        .filter_map(|(id, _)| connections.session(id))
        .filter_map(|session| session.profile().cloned())
        .map(|profile| StatusPlayerSample {
            name: profile.username,
            id: profile.uuid,
        })
        .collect();

    serde_json::to_string(&StatusDocument {
        version: StatusVersion {
            name: &info.server_version,
            protocol: info.protocol_version,
        },
        players: StatusPlayers {
            max: info.max_players,
            online: connections.len(),
            sample,
        },
        description: StatusDescription { text: &info.motd },
        enforces_secure_chat: false,
    })
}

// ---------------------------------------------------------------------------
// Entity boundary
// ---------------------------------------------------------------------------

/// The world side of a login: hands out entity ids for joining players.
pub trait EntityDirectory: Send + Sync {
    /// Called once when `client` reaches Play. Returns its entity id.
    fn player_joined(&self, client: ConnectionId, username: Option<&str>) -> i32;
}

/// Allocates entity ids 1, 2, 3, ...
#[derive(Debug)]
pub struct SequentialEntityIds {
    next: AtomicI32,
}

impl SequentialEntityIds {
    pub fn new() -> Self {
        Self {
            next: AtomicI32::new(1),
        }
    }
}

impl Default for SequentialEntityIds {
    fn default() -> Self {
        Self::new()
    }
}

impl EntityDirectory for SequentialEntityIds {
    fn player_joined(&self, client: ConnectionId, username: Option<&str>) -> i32 {
        let id = self.next.fetch_add(1, Ordering::Relaxed);
        tracing::debug!("Entity {id} allocated for {client:?} ({})", username.unwrap_or("?"));
        id
    }
}

/// The `LoginPlay` sent to a freshly joined player.
pub fn login_play(entity_id: i32, info: &StatusInfo) -> LoginPlay {
    LoginPlay {
        entity_id,
        is_hardcore: false,
        dimensions: vec!["minecraft:overworld".to_owned()],
        max_players: i32::try_from(info.max_players).unwrap_or(i32::MAX),
        view_distance: 10,
        simulation_distance: 10,
        reduced_debug_info: false,
        enable_respawn_screen: true,
        do_limited_crafting: false,
        dimension_type: DimensionType::Overworld,
        dimension_name: "minecraft:overworld".to_owned(),
        hashed_seed: rand::random(),
        game_mode: GameMode::Survival,
        previous_game_mode: None,
        is_debug: false,
        is_flat: false,
        death_location: None,
        portal_cooldown: 0,
        enforces_secure_chat: false,
    }
}

// ---------------------------------------------------------------------------
// Installation
// ---------------------------------------------------------------------------

/// Shared collaborators of the default handlers.
pub struct ProtocolHandlers {
    pub status: StatusInfo,
    pub entities: Arc<dyn EntityDirectory>,
    pub keep_alive: Arc<KeepAliveMonitor>,
}

impl ProtocolHandlers {
    /// Subscribe every default handler on `router`.
    pub fn install(self, router: &mut PacketRouter) {
        let Self {
            status,
            entities,
            keep_alive,
        } = self;
        let status = Arc::new(status);

        router.subscribe(|handshake: &Handshake, ctx| {
            if !matches!(handshake.next_state, ProtocolState::Status | ProtocolState::Login) {
                return Err(ctx.violation(format!(
                    "handshake requested {:?}",
                    handshake.next_state
                )));
            }
            if handshake.protocol_version != PROTOCOL_VERSION {
                tracing::debug!(
                    "Connection {:?} speaks protocol {}",
                    ctx.client_id,
                    handshake.protocol_version
                );
            }
            ctx.set_state(handshake.next_state)
        });

        // -- Status --------------------------------------------------------

        let info = Arc::clone(&status);
        router.subscribe(move |_: &StatusRequest, ctx| {
            match status_json(&info, &ctx.connections) {
                Ok(json) => ctx.reply(&StatusResponse { json }),
                Err(e) => {
                    tracing::warn!("Could not render status document: {e}");
                    Ok(())
                }
            }
        });

        router.subscribe(|ping: &PingRequest, ctx| ctx.reply(&PingResponse { time: ping.time }));

        // -- Login ---------------------------------------------------------

        router.subscribe(|start: &LoginStart, ctx| {
            ctx.connections
                .assign_username(ctx.client_id, &start.name, start.player_uuid)?;
            ctx.reply(&LoginSuccess {
                uuid: start.player_uuid,
                username: start.name.clone(),
                properties: Vec::new(),
                strict_error_handling: true,
            })
        });

        router.subscribe(|_: &LoginAcknowledged, ctx| {
            ctx.set_state(ProtocolState::Configuration)?;
            ctx.reply(&ClientboundKnownPacks::default())
        });

        // -- Configuration -------------------------------------------------

        router.subscribe(|_: &ClientInformation, ctx| ctx.reply(&FinishConfiguration));

        router.subscribe(|packs: &ServerboundKnownPacks, ctx| {
            tracing::debug!("Connection {:?} knows {} packs", ctx.client_id, packs.packs.len());
            Ok(())
        });

        router.subscribe(|message: &ServerboundPluginMessage, ctx| {
            tracing::debug!(
                "Connection {:?} sent {} bytes on {}",
                ctx.client_id,
                message.data.len(),
                message.channel
            );
            Ok(())
        });

        let info = Arc::clone(&status);
        router.subscribe(move |_: &AcknowledgeFinishConfiguration, ctx| {
            ctx.set_state(ProtocolState::Play)?;
            let username = ctx
                .connections
                .session(ctx.client_id)
                .and_then(|session| session.username().map(str::to_owned));
            let entity_id = entities.player_joined(ctx.client_id, username.as_deref());
            tracing::info!(
                "Connection {:?} joined as {} (entity {entity_id})",
                ctx.client_id,
                username.as_deref().unwrap_or("?")
            );
            ctx.reply(&login_play(entity_id, &info))
        });

        // -- Play ----------------------------------------------------------

        router.subscribe(move |reply: &ServerboundKeepAlive, ctx| {
            keep_alive.handle_reply(ctx.client_id, reply.id)
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dispatch::dispatch_queue;
    use crate::routing::PacketReceived;
    use nexus_protocol::packets::default_registry;
    use nexus_protocol::{AnyPacket, FrameBuffer, FrameConfig, PacketDirection};
    use std::time::Duration;
    use tokio::io::{DuplexStream, duplex};
    use tokio::sync::watch;

    struct Harness {
        router: PacketRouter,
        connections: Arc<ConnectionManager>,
        client: DuplexStream,
        buffer: FrameBuffer,
        id: ConnectionId,
        _shutdown: watch::Sender<bool>,
    }

    impl Harness {
        fn new() -> Self {
            let connections = Arc::new(ConnectionManager::new(
                Arc::new(default_registry().unwrap()),
                8,
                FrameConfig::default(),
            ));
            let (sender, _queue) = dispatch_queue();
            let (shutdown, shutdown_rx) = watch::channel(false);
            let (client, server) = duplex(8192);
            let id = connections
                .spawn_session(server, "127.0.0.1:2".parse().unwrap(), sender, shutdown_rx)
                .unwrap();

            let mut router = PacketRouter::new(Arc::clone(&connections));
            ProtocolHandlers {
                status: StatusInfo::default(),
                entities: Arc::new(SequentialEntityIds::new()),
                keep_alive: Arc::new(KeepAliveMonitor::new(
                    Arc::clone(&connections),
                    Duration::from_secs(10),
                )),
            }
            .install(&mut router);

            Self {
                router,
                connections,
                client,
                buffer: FrameBuffer::new(FrameConfig::default()),
                id,
                _shutdown: shutdown,
            }
        }

        fn deliver(&self, packet: impl AnyPacket) {
            let state = self.connections.state_of(self.id).unwrap();
            self.router.route(&PacketReceived {
                packet: Arc::new(packet),
                client_id: self.id,
                state,
            });
        }

        async fn receive(&mut self, state: ProtocolState) -> Box<dyn AnyPacket> {
            loop {
                if let Some(frame) = self.buffer.next_frame().unwrap() {
                    return self
                        .connections
                        .registry()
                        .decode(&frame, state, PacketDirection::ClientBound)
                        .unwrap();
                }
                let n = tokio::time::timeout(Duration::from_secs(1), self.buffer.read_from(&mut self.client))
                    .await
                    .unwrap()
                    .unwrap();
                assert_ne!(n, 0, "server closed the connection");
            }
        }

        fn state(&self) -> Option<ProtocolState> {
            self.connections.state_of(self.id)
        }
    }

    fn handshake(next_state: ProtocolState) -> Handshake {
        Handshake {
            protocol_version: PROTOCOL_VERSION,
            server_address: "localhost".into(),
            server_port: 25565,
            next_state,
        }
    }

    #[tokio::test]
    async fn test_status_flow() {
        let mut h = Harness::new();
        h.deliver(handshake(ProtocolState::Status));
        assert_eq!(h.state(), Some(ProtocolState::Status));

        h.deliver(StatusRequest);
        let response = h.receive(ProtocolState::Status).await;
        let json = &response.downcast_ref::<StatusResponse>().unwrap().json;
        let doc: serde_json::Value = serde_json::from_str(json).unwrap();
        assert_eq!(doc["version"]["protocol"], 767);
        assert_eq!(doc["version"]["name"], "1.21.1");
        assert_eq!(doc["players"]["max"], 20);
        assert_eq!(doc["players"]["online"], 1);
        assert_eq!(doc["players"]["sample"], serde_json::json!([]));
        assert_eq!(doc["enforcesSecureChat"], false);

        h.deliver(PingRequest { time: 1234 });
        let pong = h.receive(ProtocolState::Status).await;
        assert_eq!(pong.downcast_ref::<PingResponse>(), Some(&PingResponse { time: 1234 }));
    }

    #[tokio::test]
    async fn test_handshake_to_play_is_a_violation() {
        let h = Harness::new();
        h.deliver(handshake(ProtocolState::Play));
        assert_eq!(h.state(), Some(ProtocolState::Handshake));
        assert!(h.connections.session(h.id).unwrap().is_closing());
    }

    #[tokio::test]
    async fn test_login_through_configuration_to_play() {
        let mut h = Harness::new();
        let uuid = Uuid::from_u64_pair(0xAB, 0xCD);

        h.deliver(handshake(ProtocolState::Login));
        h.deliver(LoginStart {
            name: "Alice".into(),
            player_uuid: uuid,
        });
        let success = h.receive(ProtocolState::Login).await;
        assert_eq!(
            success.downcast_ref::<LoginSuccess>(),
            Some(&LoginSuccess {
                uuid,
                username: "Alice".into(),
                properties: Vec::new(),
                strict_error_handling: true,
            })
        );

        h.deliver(LoginAcknowledged);
        assert_eq!(h.state(), Some(ProtocolState::Configuration));
        let packs = h.receive(ProtocolState::Configuration).await;
        assert!(packs.is::<ClientboundKnownPacks>());

        h.deliver(ClientInformation {
            locale: "en_us".into(),
            view_distance: 8,
            chat_mode: nexus_protocol::packets::ChatMode::Enabled,
            chat_colors: true,
            skin_parts: 0x7F,
            main_hand: nexus_protocol::packets::MainHand::Right,
            text_filtering: false,
            server_listings: true,
        });
        let finish = h.receive(ProtocolState::Configuration).await;
        assert!(finish.is::<FinishConfiguration>());

        h.deliver(AcknowledgeFinishConfiguration);
        assert_eq!(h.state(), Some(ProtocolState::Play));
        let login_play = h.receive(ProtocolState::Play).await;
        let login_play = login_play.downcast_ref::<LoginPlay>().unwrap();
        assert_eq!(login_play.entity_id, 1);
        assert_eq!(login_play.max_players, 20);

        let json = status_json(&StatusInfo::default(), &h.connections).unwrap();
        assert!(json.contains("\"name\":\"Alice\""));
        assert!(json.contains("00000000-0000-00ab-0000-0000000000cd"));
    }

    #[tokio::test]
    async fn test_second_login_start_rejected() {
        let h = Harness::new();
        h.deliver(handshake(ProtocolState::Login));
        h.deliver(LoginStart {
            name: "Alice".into(),
            player_uuid: Uuid::nil(),
        });
        h.deliver(LoginStart {
            name: "Mallory".into(),
            player_uuid: Uuid::nil(),
        });
        assert_eq!(
            h.connections.list_sessions(ProtocolState::Login),
            vec![(h.id, Some("Alice".to_owned()))]
        );
    }

    #[test]
    fn test_sequential_entity_ids() {
        let ids = SequentialEntityIds::new();
        assert_eq!(ids.player_joined(ConnectionId(1), Some("a")), 1);
        assert_eq!(ids.player_joined(ConnectionId(2), None), 2);
    }

    #[test]
    fn test_login_play_defaults() {
        let packet = login_play(7, &StatusInfo::default());
        assert_eq!(packet.entity_id, 7);
        assert_eq!(packet.dimension_type, DimensionType::Overworld);
        assert_eq!(packet.previous_game_mode, None);
    }
}
