//! Structured logging.
//!
//! Terminal output goes to stderr so it does not interleave with stdout
//! results; the optional file output rotates daily in text or JSON format.

use std::path::Path;

use thiserror::Error;
use tracing::info;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_appender::rolling::{RollingFileAppender, Rotation};
use tracing_subscriber::{EnvFilter, Layer, Registry, fmt, prelude::*};

use crate::config::Logging;

/// Log file prefix inside the log directory
const LOG_FILE_NAME: &str = "vsco_downloader.log";

/// Error types for logging
#[derive(Error, Debug)]
pub enum LoggerError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Logging error: {0}")]
    Logging(String),
}

/// Result type for logging operations
pub type LoggerResult<T> = Result<T, LoggerError>;

/// Keeps the non-blocking file writer alive; drop it last.
pub struct Logger {
    _guard: Option<WorkerGuard>,
}

impl Logger {
    /// Install the global subscriber
    pub fn init(logging: &Logging, log_dir: &Path) -> LoggerResult<Self> {
        let filter = build_filter(&logging.log_level)?;
        let mut layers: Vec<Box<dyn Layer<Registry> + Send + Sync>> = Vec::new();
        let mut guard = None;

        if logging.log_to_terminal {
            layers.push(
                fmt::layer()
                    .with_writer(std::io::stderr)
                    .with_target(false)
                    .boxed(),
            );
        }

        if logging.log_to_file {
            std::fs::create_dir_all(log_dir)?;
            let file_appender = RollingFileAppender::new(Rotation::DAILY, log_dir, LOG_FILE_NAME);
            let (non_blocking, file_guard) = tracing_appender::non_blocking(file_appender);
            guard = Some(file_guard);

            let layer = match logging.log_format.as_str() {
                "json" => fmt::layer()
                    .json()
                    .with_writer(non_blocking)
                    .boxed(),
                _ => fmt::layer()
                    .with_ansi(false)
                    .with_writer(non_blocking)
                    .boxed(),
            };
            layers.push(layer);
        }

        tracing_subscriber::registry()
            .with(layers)
            .with(filter)
            .try_init()
            .map_err(|e| LoggerError::Logging(e.to_string()))?;

        info!(
            log_format = %logging.log_format,
            log_level = %logging.log_level,
            to_file = logging.log_to_file,
            "Logger initialized"
        );

        Ok(Self { _guard: guard })
    }
}

/// `RUST_LOG` wins over the configured level.
fn build_filter(level: &str) -> LoggerResult<EnvFilter> {
    EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(level))
        .map_err(|e| LoggerError::Logging(e.to_string()))
}
