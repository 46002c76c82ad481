//! Configuration for the Nexus server.
//!
//! Settings persist to disk as a RON file. CLI flags override file values,
//! and missing or unknown fields are tolerated so older and newer files keep
//! loading.

mod cli;
mod config;
mod error;

pub use cli::CliArgs;
pub use config::{CONFIG_FILE, Config, LogConfig, NetworkConfig, StatusConfig, default_config_dir};
pub use error::ConfigError;
