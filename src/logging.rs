//! Logging initialization for guidepost.
//!
//! Logs go to stderr unless `logging.to_file` is set, in which case they are
//! written to `{logging.dir}/guidepost-{datetime}.log`.

use anyhow::Result;
use std::path::PathBuf;
use tracing_appender::non_blocking::{NonBlocking, WorkerGuard};
use tracing_subscriber::fmt::writer::BoxMakeWriter;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use crate::config::Config;

/// Result of logging initialization
pub struct LoggingHandle {
    /// Guard that must be kept alive for the duration of the program.
    /// When dropped, ensures all buffered logs are flushed.
    pub _guard: Option<WorkerGuard>,

    /// Path to the log file (only set with file logging enabled)
    pub log_file_path: Option<PathBuf>,
}

/// Pick the filter directive: `RUST_LOG` wins, then `--debug`, then config
pub fn filter_directive(config: &Config, debug_override: bool, rust_log: Option<String>) -> String {
    rust_log.unwrap_or_else(|| {
        if debug_override {
            "debug".to_string()
        } else {
            config.logging.level.clone()
        }
    })
}

/// Name of the log file for a given start time
pub fn log_file_name(now: chrono::DateTime<chrono::Utc>) -> String {
    format!("guidepost-{}.log", now.format("%Y%m%dT%H%M%SZ"))
}

/// Open the log file under `logging.dir` behind a non-blocking writer
fn file_writer(config: &Config) -> Result<(NonBlocking, WorkerGuard, PathBuf)> {
    let logs_dir = config.logs_path();
    std::fs::create_dir_all(&logs_dir)?;

    let log_filename = log_file_name(chrono::Utc::now());
    let log_file_path = logs_dir.join(&log_filename);

    let file_appender = tracing_appender::rolling::never(&logs_dir, &log_filename);
    let (non_blocking, guard) = tracing_appender::non_blocking(file_appender);
    Ok((non_blocking, guard, log_file_path))
}

/// Initialize logging from configuration.
///
/// Returns a `LoggingHandle` that must be kept alive for the duration of the program.
pub fn init_logging(config: &Config, debug_override: bool) -> Result<LoggingHandle> {
    let directive = filter_directive(config, debug_override, std::env::var("RUST_LOG").ok());
    let filter = tracing_subscriber::EnvFilter::new(directive);

    // stderr keeps stdout free for the console overlay
    let (writer, handle) = if config.logging.to_file {
        let (non_blocking, guard, log_file_path) = file_writer(config)?;
        let handle = LoggingHandle {
            _guard: Some(guard),
            log_file_path: Some(log_file_path),
        };
        (BoxMakeWriter::new(non_blocking), handle)
    } else {
        let handle = LoggingHandle {
            _guard: None,
            log_file_path: None,
        };
        (BoxMakeWriter::new(std::io::stderr), handle)
    };

    tracing_subscriber::registry()
        .with(filter)
        .with(
            tracing_subscriber::fmt::layer()
                .with_target(false)
                .with_ansi(!config.logging.to_file)
                .with_writer(writer),
        )
        .init();

    Ok(handle)
}
