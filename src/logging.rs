use std::fs;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use crate::config::LoggingConfig;

const DEFAULT_DIRECTIVE: &str = "nyc_permits=info";

/// Initializes the logging system with both console and file output.
pub fn init_logging(config: &LoggingConfig) {
    // Ensure logs directory exists
    let _ = fs::create_dir_all(&config.directory);

    // Daily-rotated JSON log file
    let file_appender = tracing_appender::rolling::daily(&config.directory, &config.file_name);
    let (non_blocking_writer, guard) = tracing_appender::non_blocking(file_appender);

    let file_layer = fmt::layer().json().with_writer(non_blocking_writer);
    let console_layer = fmt::layer().with_writer(std::io::stdout);

    // RUST_LOG wins over the crate default
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(DEFAULT_DIRECTIVE));

    let _ = tracing_subscriber::registry()
        .with(filter)
        .with(file_layer)
        .with(console_layer)
        .try_init();

    // Keep the guard alive so buffered lines are flushed on exit
    std::mem::forget(guard);
}
