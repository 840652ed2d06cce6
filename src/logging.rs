//! Logging setup using `tracing-subscriber` and `tracing-appender`.
//!
//! Every diagnostic and progress message goes to two places:
//! - the rolling log file, appended as plain text lines through a
//!   non-blocking writer (one worker thread drains a channel, so concurrent
//!   watch units never interleave partial lines)
//! - stderr, for the operator running the command
//!
//! Alert lines are not log messages; they go to the sink in
//! [`crate::watch::AlertSink`].

use std::fs::OpenOptions;
use std::path::Path;

use anyhow::Context;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::EnvFilter;

/// Holds the non-blocking writer guard for file logging.
///
/// The [`WorkerGuard`] must be kept alive for the duration of the process.
/// Dropping it flushes pending log entries and closes the file.
pub struct LoggingGuard {
    _guard: WorkerGuard,
}

/// Initialise logging to the rolling log file plus stderr.
///
/// The file is opened once, in read/write/append/create mode, and never
/// truncated. Filtering is controlled by `RUST_LOG` (default: `info`).
///
/// Returns a [`LoggingGuard`] that must be kept alive for log flushing.
///
/// # Errors
///
/// Returns an error if the log file or its parent directory cannot be
/// created, or if a global subscriber is already installed.
pub fn init(rolling_log: &Path) -> anyhow::Result<LoggingGuard> {
    if let Some(parent) = rolling_log.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent)
            .with_context(|| format!("failed to create log directory {}", parent.display()))?;
    }

    let file = OpenOptions::new()
        .read(true)
        .write(true)
        .append(true)
        .create(true)
        .open(rolling_log)
        .with_context(|| format!("failed to open log file {}", rolling_log.display()))?;
    let (non_blocking, guard) = tracing_appender::non_blocking(file);

    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    let file_layer = tracing_subscriber::fmt::layer()
        .with_ansi(false)
        .with_writer(non_blocking);

    let console_layer = tracing_subscriber::fmt::layer().with_writer(std::io::stderr);

    tracing_subscriber::registry()
        .with(env_filter)
        .with(file_layer)
        .with(console_layer)
        .try_init()
        .context("failed to install global tracing subscriber")?;

    Ok(LoggingGuard { _guard: guard })
}
