use std::io;
use std::path::Path;
use std::time::Instant;

use tracing::info;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_appender::rolling::{self, Rotation};
use tracing_subscriber::EnvFilter;

use crate::config::{LogRotation, LoggerConfig};
use crate::protocol::chat::Usage;

const LOG_FILE_PREFIX: &str = "sparrow-cli";
const LOG_FILE_SUFFIX: &str = "log";

/// Map a configured level name onto an `EnvFilter` directive.
///
/// - "DISABLED" -> `None`
/// - "WARNING" -> WARN
/// - "CRITICAL" -> ERROR
/// - Others map directly (DEBUG, INFO, WARN, ERROR)
#[must_use]
pub fn filter_directive(log_level: &str) -> Option<String> {
    let level = log_level.to_uppercase();
    match level.as_str() {
        "DISABLED" => None,
        "WARNING" => Some("WARN".to_string()),
        "CRITICAL" => Some("ERROR".to_string()),
        _ => Some(level),
    }
}

fn rotation(config: &LoggerConfig) -> Rotation {
    match config.rotation {
        LogRotation::Hourly => Rotation::HOURLY,
        LogRotation::Daily => Rotation::DAILY,
        LogRotation::Never => Rotation::NEVER,
    }
}

/// Install a JSON subscriber writing to a rolling file under `log_dir`.
///
/// Stdout is left alone: it carries the streamed answer. The returned guard
/// flushes the background writer on drop and must live as long as logging is
/// needed.
///
/// # Errors
///
/// Returns an I/O error when the log directory or file cannot be created.
pub fn init_tracing(config: &LoggerConfig, log_dir: &Path) -> io::Result<Option<WorkerGuard>> {
    let Some(directive) = filter_directive(&config.level) else {
        return Ok(None);
    };

    std::fs::create_dir_all(log_dir)?;
    let mut builder = rolling::Builder::new()
        .rotation(rotation(config))
        .filename_prefix(LOG_FILE_PREFIX)
        .filename_suffix(LOG_FILE_SUFFIX);
    if config.max_backups > 0 {
        builder = builder.max_log_files(config.max_backups);
    }
    let appender = builder.build(log_dir).map_err(io::Error::other)?;
    let (writer, guard) = tracing_appender::non_blocking(appender);

    let filter = EnvFilter::try_new(&directive).unwrap_or_else(|_| EnvFilter::new("INFO"));
    let installed = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(writer)
        .with_ansi(false)
        .with_target(true)
        .with_thread_ids(false)
        .json()
        .try_init();
    if installed.is_err() {
        // A subscriber is already installed (tests, embedding); keep it.
        return Ok(None);
    }
    Ok(Some(guard))
}

/// Log token usage for a completed request, computing duration from start time.
pub fn log_request_complete(model: &str, usage: &Usage, start_time: Instant) {
    info!(
        model = model,
        prompt_tokens = usage.prompt_tokens,
        completion_tokens = usage.completion_tokens,
        total_tokens = usage.total_tokens,
        duration_seconds = start_time.elapsed().as_secs_f64(),
        "request completed"
    );
}
