//! Server settings with defaults and RON persistence.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::ConfigError;

/// File name inside the config directory.
pub const CONFIG_FILE: &str = "config.ron";

/// `<platform config dir>/nexus`, if the platform has one.
pub fn default_config_dir() -> Option<PathBuf> {
    dirs::config_dir().map(|dir| dir.join("nexus"))
}

/// Top-level server configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct Config {
    /// Listener, limits and framing.
    pub network: NetworkConfig,
    /// What the server list shows.
    pub status: StatusConfig,
    pub log: LogConfig,
}

/// Network configuration.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct NetworkConfig {
    /// Interface to listen on.
    pub bind_address: String,
    pub port: u16,
    /// Connections beyond this are closed on accept.
    pub max_connections: usize,
    /// Seconds between keep-alive ticks.
    pub keep_alive_interval_seconds: u64,
    /// Tasks draining the dispatch queue.
    pub dispatch_workers: usize,
    /// Largest frame body a client may declare, in bytes.
    pub max_frame_length: usize,
    /// Initial per-connection receive buffer, in bytes.
    pub read_buffer_size: usize,
}

/// Server list configuration.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct StatusConfig {
    pub protocol_version: i32,
    /// Version name shown next to the ping.
    pub server_version: String,
    /// Message of the day.
    pub motd: String,
}

/// Logging configuration.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct LogConfig {
    /// Default filter when `RUST_LOG` is unset (e.g., "debug", "info", "warn").
    pub log_level: String,
    /// Also write JSON logs to `nexus.log` in the config directory.
    pub file_logging: bool,
}

// --- Default implementations ---

impl Default for NetworkConfig {
    fn default() -> Self {
        Self {
            bind_address: "0.0.0.0".to_string(),
            port: 25565,
            max_connections: 20,
            keep_alive_interval_seconds: 10,
            dispatch_workers: 2,
            max_frame_length: 2_097_151,
            read_buffer_size: 4096,
        }
    }
}

impl Default for StatusConfig {
    fn default() -> Self {
        Self {
            protocol_version: 767,
            server_version: "1.21.1".to_string(),
            motd: "Nexus - A Minecraft server thought different".to_string(),
        }
    }
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
            file_logging: false,
        }
    }
}

// --- Load / Save ---

impl Config {
    /// Load config from the given directory, or create a default config file.
    pub fn load_or_create(config_dir: &Path) -> Result<Self, ConfigError> {
        let config_path = config_dir.join(CONFIG_FILE);

        if config_path.exists() {
            let config = Self::read(&config_path)?;
            tracing::info!("Loaded config from {}", config_path.display());
            Ok(config)
        } else {
            let config = Config::default();
            config.save(config_dir)?;
            tracing::info!("Created default config at {}", config_path.display());
            Ok(config)
        }
    }

    /// Save config to the given directory as `config.ron`.
    pub fn save(&self, config_dir: &Path) -> Result<(), ConfigError> {
        std::fs::create_dir_all(config_dir).map_err(ConfigError::WriteError)?;

        let pretty = ron::ser::PrettyConfig::new()
            .depth_limit(2)
            .enumerate_arrays(false);
        let serialized =
            ron::ser::to_string_pretty(self, pretty).map_err(ConfigError::SerializeError)?;

        std::fs::write(config_dir.join(CONFIG_FILE), serialized).map_err(ConfigError::WriteError)
    }

    fn read(path: &Path) -> Result<Self, ConfigError> {
        let contents = std::fs::read_to_string(path).map_err(ConfigError::ReadError)?;
        ron::from_str(&contents).map_err(ConfigError::ParseError)
    }

    /// Reject values the server cannot run with.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let network = &self.network;
        let invalid = |field, reason: &str| {
            Err(ConfigError::InvalidValue {
                field,
                reason: reason.to_string(),
            })
        };

        if network.bind_address.parse::<std::net::IpAddr>().is_err() {
            return invalid("network.bind_address", "not an IP address");
        }
        if network.max_connections == 0 {
            return invalid("network.max_connections", "must be at least 1");
        }
        if network.dispatch_workers == 0 {
            return invalid("network.dispatch_workers", "must be at least 1");
        }
        if network.keep_alive_interval_seconds == 0 {
            return invalid("network.keep_alive_interval_seconds", "must be at least 1");
        }
        if network.max_frame_length == 0 || network.max_frame_length > i32::MAX as usize {
            return invalid("network.max_frame_length", "must be between 1 and 2^31 - 1");
        }
        if network.read_buffer_size == 0 {
            return invalid("network.read_buffer_size", "must be at least 1");
        }
        Ok(())
    }
}
