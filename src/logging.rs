//! Process-wide tracing setup for binaries embedding the ring.

use anyhow::{anyhow, Context};
use std::env;
use std::path::PathBuf;
use tracing::level_filters::LevelFilter;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::layer::SubscriberExt;

#[derive(Debug, Clone, PartialEq)]
pub struct LogConfig {
    pub level: LevelFilter,
    /// When set, events are also written to a daily rolling file in this directory.
    pub directory: Option<PathBuf>,
    pub file_prefix: String,
}

impl Default for LogConfig {
    fn default() -> Self {
        LogConfig {
            level: LevelFilter::INFO,
            directory: None,
            file_prefix: "chordring".to_string(),
        }
    }
}

impl LogConfig {
    /// Reads `CHORD_LOG_LEVEL` and `CHORD_LOG_DIR`, keeping the defaults for unset variables.
    pub fn from_env() -> anyhow::Result<Self> {
        let mut config = LogConfig::default();
        if let Ok(level) = env::var("CHORD_LOG_LEVEL") {
            config.level = level
                .parse()
                .map_err(|e| anyhow!("invalid CHORD_LOG_LEVEL {level:?}: {e}"))?;
        }
        if let Ok(directory) = env::var("CHORD_LOG_DIR") {
            config.directory = Some(PathBuf::from(directory));
        }
        Ok(config)
    }
}

/// Installs the global subscriber: stdout always, plus the rolling file when configured, and
/// forwards `log` records into tracing. The returned guard flushes the file writer when dropped
/// and must be held for the lifetime of the process.
pub fn init(config: &LogConfig) -> anyhow::Result<Option<WorkerGuard>> {
    tracing_log::LogTracer::init().context("could not forward log records to tracing")?;

    let (file_layer, guard) = match &config.directory {
        Some(directory) => {
            let appender = tracing_appender::rolling::daily(directory, &config.file_prefix);
            let (writer, guard) = tracing_appender::non_blocking(appender);
            let layer = tracing_subscriber::fmt::layer()
                .with_ansi(false)
                .with_writer(writer);
            (Some(layer), Some(guard))
        }
        None => (None, None),
    };

    let subscriber = tracing_subscriber::registry()
        .with(config.level)
        .with(tracing_subscriber::fmt::layer())
        .with(file_layer);
    tracing::subscriber::set_global_default(subscriber)
        .context("a global tracing subscriber is already installed")?;
    Ok(guard)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_log_config_from_env() {
        env::remove_var("CHORD_LOG_DIR");
        env::set_var("CHORD_LOG_LEVEL", "debug");
        let config = LogConfig::from_env().unwrap();
        assert_eq!(config.level, LevelFilter::DEBUG);
        assert_eq!(config.directory, None);

        env::set_var("CHORD_LOG_LEVEL", "chatty");
        assert!(LogConfig::from_env().is_err());

        env::set_var("CHORD_LOG_LEVEL", "warn");
        env::set_var("CHORD_LOG_DIR", "/tmp/chordring-logs");
        let config = LogConfig::from_env().unwrap();
        assert_eq!(config.level, LevelFilter::WARN);
        assert_eq!(config.directory, Some(PathBuf::from("/tmp/chordring-logs")));

        env::remove_var("CHORD_LOG_LEVEL");
        env::remove_var("CHORD_LOG_DIR");
    }
}
