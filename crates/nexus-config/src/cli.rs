//! Command-line arguments for the `nexus` server.

use std::path::PathBuf;

use clap::Parser;

use crate::Config;
use crate::config::default_config_dir;
use crate::error::ConfigError;

/// Nexus server command-line arguments.
///
/// CLI values override settings loaded from `config.ron`.
#[derive(Parser, Debug, Default)]
#[command(name = "nexus", about = "Nexus - a Minecraft protocol 767 server")]
pub struct CliArgs {
    /// Port to listen on.
    #[arg(long)]
    pub port: Option<u16>,

    /// Address to bind to.
    #[arg(long)]
    pub bind: Option<String>,

    /// Maximum concurrent connections.
    #[arg(long)]
    pub max_connections: Option<usize>,

    /// Seconds between keep-alive checks.
    #[arg(long)]
    pub keep_alive_interval: Option<u64>,

    /// Number of packet dispatch workers.
    #[arg(long)]
    pub workers: Option<usize>,

    /// Log level (error, warn, info, debug, trace).
    #[arg(long)]
    pub log_level: Option<String>,

    /// Path to config directory (overrides default location).
    #[arg(long)]
    pub config: Option<PathBuf>,
}

impl CliArgs {
    /// The config directory: `--config` if given, else the platform default.
    pub fn config_dir(&self) -> Result<PathBuf, ConfigError> {
        match &self.config {
            Some(dir) if dir.exists() && !dir.is_dir() => Err(ConfigError::NotADirectory(dir.clone())),
            Some(dir) => Ok(dir.clone()),
            None => default_config_dir().ok_or(ConfigError::NoConfigDir),
        }
    }
}

impl Config {
    /// Apply CLI overrides to a loaded config.
    pub fn apply_cli_overrides(&mut self, args: &CliArgs) {
        if let Some(port) = args.port {
            self.network.port = port;
        }
        if let Some(ref bind) = args.bind {
            self.network.bind_address = bind.clone();
        }
        if let Some(max) = args.max_connections {
            self.network.max_connections = max;
        }
        if let Some(seconds) = args.keep_alive_interval {
            self.network.keep_alive_interval_seconds = seconds;
        }
        if let Some(workers) = args.workers {
            self.network.dispatch_workers = workers;
        }
        if let Some(ref level) = args.log_level {
            self.log.log_level = level.clone();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cli_override() {
        let mut config = Config::default();
        let args = CliArgs {
            port: Some(30000),
            bind: Some("127.0.0.1".to_string()),
            workers: Some(8),
            ..CliArgs::default()
        };
        config.apply_cli_overrides(&args);
        assert_eq!(config.network.port, 30000);
        assert_eq!(config.network.bind_address, "127.0.0.1");
        assert_eq!(config.network.dispatch_workers, 8);
        // Non-overridden fields retain defaults
        assert_eq!(config.network.max_connections, 20);
        assert_eq!(config.log.log_level, "info");
    }

    #[test]
    fn test_cli_no_override() {
        let original = Config::default();
        let mut config = Config::default();
        config.apply_cli_overrides(&CliArgs::default());
        assert_eq!(config, original);
    }

    #[test]
    fn test_parse_flags() {
        let args = CliArgs::parse_from([
            "nexus",
            "--port",
            "25570",
            "--max-connections",
            "2",
            "--keep-alive-interval",
            "5",
            "--log-level",
            "debug",
        ]);
        assert_eq!(args.port, Some(25570));
        assert_eq!(args.max_connections, Some(2));
        assert_eq!(args.keep_alive_interval, Some(5));
        assert_eq!(args.log_level.as_deref(), Some("debug"));
        assert!(args.config.is_none());
    }

    #[test]
    fn test_config_dir_rejects_file() {
        let file = tempfile::NamedTempFile::new().unwrap();
        let args = CliArgs {
            config: Some(file.path().to_path_buf()),
            ..CliArgs::default()
        };
        assert!(matches!(args.config_dir(), Err(ConfigError::NotADirectory(_))));
    }
}
