//! Console plus daily rolling file logging.

use crate::config::LoggingConfig;
use crate::errors::AutomationError;
use std::path::{Path, PathBuf};
use tracing_appender::non_blocking::WorkerGuard;
use tracing_appender::rolling;
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

/// Keeps the file writer flushing. Hold it for the life of the process.
pub struct LoggingGuard {
    _guard: WorkerGuard,
    directory: PathBuf,
}

impl LoggingGuard {
    pub fn directory(&self) -> &Path {
        &self.directory
    }
}

/// `RUST_LOG` wins, then `level_override`, then the configured level.
pub fn build_filter(config: &LoggingConfig, level_override: Option<&str>) -> EnvFilter {
    EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        let level = level_override.unwrap_or(&config.level);
        EnvFilter::try_new(level).unwrap_or_else(|_| EnvFilter::new("info"))
    })
}

pub fn init_logging(
    config: &LoggingConfig,
    level_override: Option<&str>,
) -> Result<LoggingGuard, AutomationError> {
    let directory = config.resolve_directory();
    std::fs::create_dir_all(&directory).map_err(|e| {
        AutomationError::Configuration(format!(
            "Cannot create log directory {}: {e}",
            directory.display()
        ))
    })?;

    let file_appender = rolling::daily(&directory, &config.file_name);
    let (file_writer, guard) = tracing_appender::non_blocking(file_appender);

    tracing_subscriber::registry()
        .with(build_filter(config, level_override))
        .with(fmt::layer().with_writer(std::io::stderr))
        .with(fmt::layer().with_writer(file_writer).with_ansi(false))
        .try_init()
        .map_err(|e| AutomationError::Configuration(format!("Logging already initialised: {e}")))?;

    Ok(LoggingGuard {
        _guard: guard,
        directory,
    })
}
