//! Nexus server entry point.
//!
//! Loads `config.ron` (creating it on first run), applies CLI overrides,
//! starts logging and serves protocol 767 clients until Ctrl-C.
//!
//! Run with: `cargo run -p nexus-server -- --port 25565`

use std::net::{IpAddr, SocketAddr};
use std::sync::Arc;
use std::time::Duration;

use clap::Parser;
use nexus_config::{CliArgs, Config, ConfigError};
use nexus_net::{NexusServer, ServerConfig, StatusInfo};
use nexus_protocol::FrameConfig;
use tracing::info;

fn main() {
    let args = CliArgs::parse();

    let (config_dir, config) = match load_config(&args) {
        Ok(loaded) => loaded,
        Err(e) => {
            eprintln!("nexus: {e}");
            std::process::exit(1);
        }
    };

    if let Err(e) = nexus_log::init_logging(Some(&config_dir), config.log.file_logging, Some(&config)) {
        eprintln!("nexus: failed to initialize logging: {e}");
    }

    let server_config = match server_config(&config) {
        Ok(server_config) => server_config,
        Err(e) => {
            eprintln!("nexus: {e}");
            std::process::exit(1);
        }
    };
    info!(
        "Nexus starting: {} (max {} connections, {} workers)",
        server_config.bind_addr, server_config.max_connections, server_config.dispatch_workers
    );

    let runtime = match tokio::runtime::Builder::new_multi_thread().enable_all().build() {
        Ok(runtime) => runtime,
        Err(e) => {
            eprintln!("nexus: failed to start runtime: {e}");
            std::process::exit(1);
        }
    };

    if let Err(e) = runtime.block_on(serve(server_config)) {
        eprintln!("nexus: {e}");
        std::process::exit(1);
    }
    info!("Nexus stopped");
}

fn load_config(args: &CliArgs) -> Result<(std::path::PathBuf, Config), ConfigError> {
    let config_dir = args.config_dir()?;
    let mut config = Config::load_or_create(&config_dir)?;
    config.apply_cli_overrides(args);
    config.validate()?;
    Ok((config_dir, config))
}

/// Translate the file/CLI settings into what the network layer runs with.
fn server_config(config: &Config) -> Result<ServerConfig, ConfigError> {
    let network = &config.network;
    let ip: IpAddr = network
        .bind_address
        .parse()
        .map_err(|_| ConfigError::InvalidValue {
            field: "network.bind_address",
            reason: "not an IP address".to_string(),
        })?;

    Ok(ServerConfig {
        bind_addr: SocketAddr::new(ip, network.port),
        max_connections: network.max_connections,
        keep_alive_interval: Duration::from_secs(network.keep_alive_interval_seconds),
        dispatch_workers: network.dispatch_workers,
        frame: FrameConfig {
            max_frame_length: network.max_frame_length,
            read_buffer_size: network.read_buffer_size,
        },
        status: StatusInfo {
            protocol_version: config.status.protocol_version,
            server_version: config.status.server_version.clone(),
            motd: config.status.motd.clone(),
            max_players: network.max_connections,
        },
    })
}

async fn serve(server_config: ServerConfig) -> Result<(), Box<dyn std::error::Error>> {
    let server = Arc::new(NexusServer::new(server_config)?);

    let signal_server = Arc::clone(&server);
    tokio::spawn(async move {
        match tokio::signal::ctrl_c().await {
            Ok(()) => info!("Ctrl-C received, shutting down"),
            Err(e) => tracing::warn!("Failed to listen for Ctrl-C: {e}"),
        }
        signal_server.shutdown();
    });

    server.run().await?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_server_config_from_defaults() {
        let server_config = server_config(&Config::default()).unwrap();
        assert_eq!(server_config.bind_addr, "0.0.0.0:25565".parse().unwrap());
        assert_eq!(server_config.max_connections, 20);
        assert_eq!(server_config.keep_alive_interval, Duration::from_secs(10));
        assert_eq!(server_config.frame, FrameConfig::default());
        assert_eq!(server_config.status.max_players, 20);
        assert_eq!(server_config.status.protocol_version, 767);
    }

    #[test]
    fn test_server_config_ipv6_and_overrides() {
        let mut config = Config::default();
        config.apply_cli_overrides(&CliArgs {
            bind: Some("::1".to_string()),
            port: Some(25570),
            max_connections: Some(3),
            ..CliArgs::default()
        });
        let server_config = server_config(&config).unwrap();
        assert_eq!(server_config.bind_addr, "[::1]:25570".parse().unwrap());
        assert_eq!(server_config.status.max_players, 3);
    }

    #[test]
    fn test_server_config_rejects_hostname() {
        let mut config = Config::default();
        config.network.bind_address = "example.com".to_string();
        assert!(server_config(&config).is_err());
    }
}
