//! Structured logging for the Nexus server.
//!
//! Installs a `tracing` subscriber with a human-readable console layer and,
//! when enabled, a JSON file layer for later inspection. `RUST_LOG` wins over
//! the configured level.

use std::path::{Path, PathBuf};

use nexus_config::Config;
use tracing_subscriber::util::TryInitError;
use tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt};

/// File written by the JSON layer.
pub const LOG_FILE: &str = "nexus.log";

/// Filter used when neither `RUST_LOG` nor the config sets one.
pub const DEFAULT_FILTER: &str = "info";

/// The filter directive for `config`, falling back to [`DEFAULT_FILTER`].
pub fn filter_directive(config: Option<&Config>) -> String {
    config
        .map(|config| config.log.log_level.trim())
        .filter(|level| !level.is_empty())
        .unwrap_or(DEFAULT_FILTER)
        .to_string()
}

/// Install the global tracing subscriber.
///
/// - console output with uptime timestamps, targets and levels
/// - JSON output to `log_dir/nexus.log` when `file_logging` is set
/// - `RUST_LOG` overrides the level from `config`
///
/// Returns where the JSON log is written, if anywhere. A log file that cannot
/// be created is reported on stderr and console logging continues.
///
/// # Examples
///
/// ```no_run
/// use nexus_config::Config;
/// use nexus_log::init_logging;
///
/// let config = Config::default();
/// init_logging(None, false, Some(&config)).unwrap();
/// ```
pub fn init_logging(
    log_dir: Option<&Path>,
    file_logging: bool,
    config: Option<&Config>,
) -> Result<Option<PathBuf>, TryInitError> {
    let env_filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(filter_directive(config)));

    let console_layer = fmt::layer()
        .with_target(true)
        .with_thread_names(true)
        .with_level(true)
        .with_timer(fmt::time::uptime());

    let subscriber = tracing_subscriber::registry()
        .with(env_filter)
        .with(console_layer);

    if file_logging && let Some(log_dir) = log_dir {
        match open_log_file(log_dir) {
            Ok((path, log_file)) => {
                let file_layer = fmt::layer()
                    .with_writer(log_file)
                    .with_ansi(false)
                    .with_target(true)
                    .with_timer(fmt::time::uptime())
                    .json();
                subscriber.with(file_layer).try_init()?;
                return Ok(Some(path));
            }
            Err(e) => eprintln!("nexus: file logging disabled, {}: {e}", log_dir.display()),
        }
    }

    subscriber.try_init()?;
    Ok(None)
}

fn open_log_file(log_dir: &Path) -> std::io::Result<(PathBuf, std::fs::File)> {
    std::fs::create_dir_all(log_dir)?;
    let path = log_dir.join(LOG_FILE);
    let file = std::fs::File::create(&path)?;
    Ok((path, file))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_filter_without_config() {
        assert_eq!(filter_directive(None), "info");
    }

    #[test]
    fn test_filter_from_config() {
        let mut config = Config::default();
        config.log.log_level = "debug,nexus_net=trace".to_string();
        assert_eq!(filter_directive(Some(&config)), "debug,nexus_net=trace");

        config.log.log_level = "  ".to_string();
        assert_eq!(filter_directive(Some(&config)), DEFAULT_FILTER);
    }

    #[test]
    fn test_env_filter_parsing() {
        for filter_str in ["info", "debug,nexus_net=trace", "warn,nexus_protocol=debug", "error"] {
            assert!(
                EnvFilter::try_new(filter_str).is_ok(),
                "Failed to parse filter: {filter_str}"
            );
        }
    }

    #[test]
    fn test_log_file_created_in_directory() {
        let temp_dir = tempfile::tempdir().unwrap();
        let log_dir = temp_dir.path().join("logs");
        let (path, _file) = open_log_file(&log_dir).unwrap();
        assert_eq!(path, log_dir.join(LOG_FILE));
        assert!(path.exists());
    }

    #[test]
    fn test_second_init_fails_cleanly() {
        // Only one global subscriber can be installed per process.
        let _ = init_logging(None, false, None);
        assert!(init_logging(None, false, None).is_err());
    }
}
