//! Logging setup with optional daily-rotated file output
//!
//! The library itself only emits `tracing` events. Binaries call
//! [`init_logging`] once at startup.

use crate::error::{ResilienceError, Result};
use std::ffi::OsStr;
use std::path::{Path, PathBuf};
use tracing::Level;
use tracing_subscriber::{fmt, layer::SubscriberExt, EnvFilter, Layer, Registry};

const DEFAULT_LOG_FILE: &str = "gate-resilience.log";

/// Logging configuration
#[derive(Debug, Clone, PartialEq)]
pub struct LogConfig {
    /// Default level when `RUST_LOG` has no directive for a target
    pub level: Level,

    /// Log to a daily-rotated file
    pub file_path: Option<PathBuf>,

    /// Log to stderr
    pub stderr: bool,

    /// Emit JSON lines instead of the human format
    pub json: bool,

    /// Include thread IDs
    pub thread_ids: bool,
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            level: Level::INFO,
            file_path: None,
            stderr: true,
            json: false,
            thread_ids: false,
        }
    }
}

impl LogConfig {
    /// Create config from environment
    pub fn from_env() -> Self {
        let mut config = Self::default();

        if let Ok(rust_log) = std::env::var("RUST_LOG") {
            let rust_log = rust_log.to_lowercase();
            if rust_log.contains("trace") {
                config.level = Level::TRACE;
            } else if rust_log.contains("debug") {
                config.level = Level::DEBUG;
            } else if rust_log.contains("info") {
                config.level = Level::INFO;
            } else if rust_log.contains("warn") {
                config.level = Level::WARN;
            } else if rust_log.contains("error") {
                config.level = Level::ERROR;
            }
        }

        if let Ok(log_file) = std::env::var("RESILIENCE_LOG_FILE") {
            if !log_file.is_empty() {
                config.file_path = Some(PathBuf::from(log_file));
            }
        }

        if let Ok(log_stderr) = std::env::var("RESILIENCE_LOG_STDERR") {
            config.stderr = log_stderr.to_lowercase() != "false";
        }

        if let Ok(json) = std::env::var("RESILIENCE_LOG_JSON") {
            config.json = matches!(json.to_lowercase().as_str(), "1" | "true" | "yes");
        }

        config
    }
}

type BoxedLayer = Box<dyn Layer<Registry> + Send + Sync>;

fn output_layer<W>(writer: W, ansi: bool, config: &LogConfig) -> BoxedLayer
where
    W: for<'w> fmt::MakeWriter<'w> + Send + Sync + 'static,
{
    if config.json {
        fmt::layer()
            .json()
            .with_writer(writer)
            .with_thread_ids(config.thread_ids)
            .boxed()
    } else {
        fmt::layer()
            .with_writer(writer)
            .with_ansi(ansi)
            .with_target(true)
            .with_thread_ids(config.thread_ids)
            .boxed()
    }
}

/// Initialize the global subscriber with the given configuration
pub fn init_logging(config: LogConfig) -> Result<()> {
    let env_filter = EnvFilter::builder()
        .with_default_directive(config.level.into())
        .from_env_lossy();

    let mut layers: Vec<BoxedLayer> = Vec::new();

    if config.stderr {
        layers.push(output_layer(std::io::stderr, true, &config));
    }

    if let Some(file_path) = &config.file_path {
        let dir = file_path
            .parent()
            .filter(|p| !p.as_os_str().is_empty())
            .unwrap_or_else(|| Path::new("."));
        std::fs::create_dir_all(dir)?;

        let file_appender = tracing_appender::rolling::daily(
            dir,
            file_path
                .file_name()
                .unwrap_or_else(|| OsStr::new(DEFAULT_LOG_FILE)),
        );
        layers.push(output_layer(file_appender, false, &config));
    }

    let subscriber = tracing_subscriber::registry().with(layers).with(env_filter);

    tracing::subscriber::set_global_default(subscriber)
        .map_err(|e| ResilienceError::config(format!("Failed to install logger: {}", e)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use serial_test::serial;

    #[test]
    #[serial]
    fn test_from_env_defaults() {
        temp_env::with_vars_unset(
            [
                "RUST_LOG",
                "RESILIENCE_LOG_FILE",
                "RESILIENCE_LOG_STDERR",
                "RESILIENCE_LOG_JSON",
            ],
            || {
                assert_eq!(LogConfig::from_env(), LogConfig::default());
            },
        );
    }

    #[test]
    #[serial]
    fn test_from_env_overrides() {
        temp_env::with_vars(
            [
                ("RUST_LOG", Some("gate_resilience=debug")),
                ("RESILIENCE_LOG_FILE", Some("/var/log/gate/resilience.log")),
                ("RESILIENCE_LOG_STDERR", Some("FALSE")),
                ("RESILIENCE_LOG_JSON", Some("true")),
            ],
            || {
                let config = LogConfig::from_env();
                assert_eq!(config.level, Level::DEBUG);
                assert_eq!(
                    config.file_path,
                    Some(PathBuf::from("/var/log/gate/resilience.log"))
                );
                assert!(!config.stderr);
                assert!(config.json);
            },
        );
    }
}
