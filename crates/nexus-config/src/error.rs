//! Configuration error types.

use std::path::PathBuf;

/// Errors raised while loading, saving or validating `config.ron`.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// The config file exists but could not be read.
    #[error("failed to read config: {0}")]
    ReadError(#[source] std::io::Error),

    /// The config directory or file could not be written.
    #[error("failed to write config: {0}")]
    WriteError(#[source] std::io::Error),

    /// The file is not valid RON for [`Config`](crate::Config).
    #[error("failed to parse config: {0}")]
    ParseError(#[source] ron::error::SpannedError),

    #[error("failed to serialize config: {0}")]
    SerializeError(#[source] ron::Error),

    /// A value parsed fine but cannot be served with.
    #[error("invalid `{field}`: {reason}")]
    InvalidValue {
        field: &'static str,
        reason: String,
    },

    /// No platform config directory and none given on the command line.
    #[error("no config directory available, pass --config")]
    NoConfigDir,

    /// `--config` points at something that is not a directory.
    #[error("config path {} is not a directory", .0.display())]
    NotADirectory(PathBuf),
}
