//! A minimal protocol client for driving a real server over TCP.

#![allow(dead_code)]

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use nexus_net::{NexusServer, ServerBuilder, ServerConfig};
use nexus_protocol::packets::{
    AcknowledgeFinishConfiguration, ChatMode, ClientInformation, ClientboundKnownPacks,
    FinishConfiguration, Handshake, LoginAcknowledged, LoginPlay, LoginStart, LoginSuccess,
    MainHand, SkinParts, default_registry,
};
use nexus_protocol::{
    AnyPacket, FrameBuffer, FrameConfig, Packet, PacketDirection, PacketRegistry, ProtocolState,
    Uuid,
};
use tokio::io::AsyncWriteExt;
use tokio::net::{TcpListener, TcpStream};

pub const TIMEOUT: Duration = Duration::from_secs(2);

/// Config for tests: loopback, long keep-alive so ticks are driven by hand.
pub fn test_config(max_connections: usize) -> ServerConfig {
    ServerConfig {
        bind_addr: "127.0.0.1:0".parse().unwrap(),
        max_connections,
        keep_alive_interval: Duration::from_secs(3600),
        ..ServerConfig::default()
    }
}

/// Start `builder`'s server on an ephemeral port.
pub async fn start(builder: ServerBuilder) -> (SocketAddr, Arc<NexusServer>) {
    let server = Arc::new(builder.build().unwrap());
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let srv = Arc::clone(&server);
    tokio::spawn(async move {
        srv.run_with_listener(listener).await.unwrap();
    });
    tokio::time::sleep(Duration::from_millis(10)).await;
    (addr, server)
}

pub async fn start_server(max_connections: usize) -> (SocketAddr, Arc<NexusServer>) {
    start(NexusServer::builder(test_config(max_connections))).await
}

pub struct TestClient {
    stream: TcpStream,
    buffer: FrameBuffer,
    registry: PacketRegistry,
}

impl TestClient {
    pub async fn connect(addr: SocketAddr) -> Self {
        Self {
            stream: TcpStream::connect(addr).await.unwrap(),
            buffer: FrameBuffer::new(FrameConfig::default()),
            registry: default_registry().unwrap(),
        }
    }

    pub async fn send<P: Packet>(&mut self, packet: &P) {
        let bytes = self.registry.encode(packet).unwrap();
        self.stream.write_all(&bytes).await.unwrap();
    }

    pub async fn send_raw(&mut self, bytes: &[u8]) {
        self.stream.write_all(bytes).await.unwrap();
    }

    /// Next client-bound packet, decoded in `state`.
    pub async fn recv(&mut self, state: ProtocolState) -> Box<dyn AnyPacket> {
        loop {
            if let Some(frame) = self.buffer.next_frame().unwrap() {
                return self
                    .registry
                    .decode(&frame, state, PacketDirection::ClientBound)
                    .unwrap();
            }
            let n = tokio::time::timeout(TIMEOUT, self.buffer.read_from(&mut self.stream))
                .await
                .expect("timed out waiting for a packet")
                .unwrap();
            assert_ne!(n, 0, "server closed the connection");
        }
    }

    pub async fn recv_as<P: Packet + Clone>(&mut self) -> P {
        let packet = self.recv(P::STATE).await;
        match packet.downcast_ref::<P>() {
            Some(packet) => packet.clone(),
            None => panic!("expected {}, got {packet:?}", P::NAME),
        }
    }

    /// Whether the server closes the socket within the timeout.
    pub async fn is_closed(&mut self) -> bool {
        loop {
            match tokio::time::timeout(TIMEOUT, self.buffer.read_from(&mut self.stream)).await {
                Ok(Ok(0)) | Ok(Err(_)) => return true,
                Ok(Ok(_)) => continue,
                Err(_) => return false,
            }
        }
    }

    /// Drive the full login sequence into Play.
    pub async fn login(&mut self, name: &str) -> LoginPlay {
        let uuid = Uuid::new_v4();
        self.send(&Handshake {
            protocol_version: 767,
            server_address: "localhost".into(),
            server_port: 25565,
            next_state: ProtocolState::Login,
        })
        .await;
        self.send(&LoginStart {
            name: name.into(),
            player_uuid: uuid,
        })
        .await;
        let success: LoginSuccess = self.recv_as().await;
        assert_eq!(success.uuid, uuid);

        self.send(&LoginAcknowledged).await;
        let _: ClientboundKnownPacks = self.recv_as().await;

        self.send(&ClientInformation {
            locale: "en_us".into(),
            view_distance: 10,
            chat_mode: ChatMode::Enabled,
            chat_colors: true,
            skin_parts: SkinParts::ALL,
            main_hand: MainHand::Right,
            text_filtering: false,
            server_listings: true,
        })
        .await;
        let _: FinishConfiguration = self.recv_as().await;

        self.send(&AcknowledgeFinishConfiguration).await;
        self.recv_as().await
    }
}
