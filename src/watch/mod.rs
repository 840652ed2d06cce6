//! Live log tailing.
//!
//! [`WatchDispatcher`] selects the most recently modified files under the log
//! tree and runs one watch unit per file. Each unit owns a [`Tailer`] and its
//! own filesystem-notification subscription; units never share cursors, so
//! a broken file only ever affects its own unit.

pub mod selector;
pub mod tailer;

use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use notify::event::ModifyKind;
use notify::{EventKind, RecursiveMode, Watcher};
use tokio::sync::mpsc;
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::config::WatchConfig;

pub use selector::{select_latest, SelectedFile};
pub use tailer::{BackscanWindow, TailReport, Tailer, MAX_LINE_LEN};

/// Errors raised by the watch subsystem.
#[derive(Debug, thiserror::Error)]
pub enum WatchError {
    /// The log directory could not be listed. Fatal to watch setup.
    #[error("failed to list directory {path}: {source}")]
    DirectoryUnreadable {
        /// Directory that was listed.
        path: PathBuf,
        /// Underlying I/O error.
        #[source]
        source: std::io::Error,
    },

    /// A watched file could not be opened or read during one change event.
    #[error("failed to read {path}: {source}")]
    FileReadFailed {
        /// File being tailed.
        path: PathBuf,
        /// Underlying I/O error.
        #[source]
        source: std::io::Error,
    },

    /// The notification backend reported an error for a watched file.
    #[error("notification error for {path}: {source}")]
    NotificationChannel {
        /// File being watched.
        path: PathBuf,
        /// Error reported by the backend.
        #[source]
        source: notify::Error,
    },

    /// The notification subscription for a file could not be created.
    #[error("failed to watch {path}: {source}")]
    WatchSetup {
        /// File that was to be watched.
        path: PathBuf,
        /// Error reported by the backend.
        #[source]
        source: notify::Error,
    },
}

/// Destination for alert lines shared by all watch units.
///
/// Implementations must serialize concurrent writers so lines never interleave.
pub trait AlertSink: Send + Sync {
    /// Emit one alert line.
    fn emit(&self, line: &str);
}

/// Writes alert lines to stdout, holding the stdout lock per line.
#[derive(Debug, Default)]
pub struct StdoutAlerts;

impl AlertSink for StdoutAlerts {
    fn emit(&self, line: &str) {
        let mut out = std::io::stdout().lock();
        if let Err(e) = writeln!(out, "{line}") {
            warn!(error = %e, "failed to write alert to stdout");
        }
    }
}

/// Collects alert lines in memory.
#[derive(Debug, Default)]
pub struct MemoryAlerts {
    lines: Mutex<Vec<String>>,
}

impl MemoryAlerts {
    /// Snapshot of every line emitted so far.
    pub fn lines(&self) -> Vec<String> {
        match self.lines.lock() {
            Ok(lines) => lines.clone(),
            Err(poisoned) => poisoned.into_inner().clone(),
        }
    }
}

impl AlertSink for MemoryAlerts {
    fn emit(&self, line: &str) {
        match self.lines.lock() {
            Ok(mut lines) => lines.push(line.to_owned()),
            Err(poisoned) => poisoned.into_inner().push(line.to_owned()),
        }
    }
}

/// Fans out one watch unit per selected log file.
pub struct WatchDispatcher {
    config: WatchConfig,
    alerts: Arc<dyn AlertSink>,
}

impl std::fmt::Debug for WatchDispatcher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WatchDispatcher")
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

impl WatchDispatcher {
    /// Create a dispatcher emitting alerts to `alerts`.
    pub fn new(config: WatchConfig, alerts: Arc<dyn AlertSink>) -> Self {
        Self { config, alerts }
    }

    /// Watch the latest files under `logs_dir` until `cancel` fires.
    ///
    /// Returns immediately with `0` when no file was selected. Otherwise
    /// blocks until every watch unit has stopped and returns how many were
    /// started. Failures inside a unit are logged and never stop its siblings.
    ///
    /// # Errors
    ///
    /// Returns [`WatchError::DirectoryUnreadable`] if `logs_dir` cannot be
    /// listed; no unit is started in that case.
    pub async fn run(
        &self,
        logs_dir: &Path,
        cancel: CancellationToken,
    ) -> Result<usize, WatchError> {
        let files = select_latest(logs_dir, self.config.max_files)?;
        if files.is_empty() {
            info!(dir = %logs_dir.display(), "no log files to watch");
            return Ok(0);
        }

        let mut units = JoinSet::new();
        for file in files {
            let tailer = Tailer::new(
                file.path,
                self.config.backscan_lines,
                &self.config.keywords,
            );
            units.spawn(run_unit(tailer, Arc::clone(&self.alerts), cancel.clone()));
        }
        let started = units.len();
        info!(dir = %logs_dir.display(), count = started, "watching log files");

        while let Some(joined) = units.join_next().await {
            match joined {
                Ok(Ok(())) => {}
                Ok(Err(e)) => error!(error = %e, "error watching file"),
                Err(e) => error!(error = %e, "watch unit aborted"),
            }
        }

        info!(count = started, "all watch units stopped");
        Ok(started)
    }
}

/// Whether a notification reports new data written to the file.
///
/// Access, creation, removal and metadata-only changes are not writes.
pub fn is_write(kind: &EventKind) -> bool {
    matches!(
        kind,
        EventKind::Modify(ModifyKind::Data(_)) | EventKind::Modify(ModifyKind::Any)
    )
}

/// Drive one tailer from its file's notifications until cancelled.
///
/// Events are handled one at a time in delivery order. Cancellation is only
/// checked between events, so an in-flight read always completes.
async fn run_unit(
    mut tailer: Tailer,
    alerts: Arc<dyn AlertSink>,
    cancel: CancellationToken,
) -> Result<(), WatchError> {
    let path = tailer.path().to_path_buf();
    let (tx, mut rx) = mpsc::unbounded_channel();

    let mut watcher = notify::recommended_watcher(move |event: notify::Result<notify::Event>| {
        if let Err(e) = tx.send(event) {
            debug!(error = %e, "watch unit gone, dropping notification");
        }
    })
    .map_err(|source| WatchError::WatchSetup {
        path: path.clone(),
        source,
    })?;
    watcher
        .watch(&path, RecursiveMode::NonRecursive)
        .map_err(|source| WatchError::WatchSetup {
            path: path.clone(),
            source,
        })?;
    debug!(path = %path.display(), "watch unit started");

    loop {
        tokio::select! {
            biased;
            () = cancel.cancelled() => break,
            received = rx.recv() => match received {
                None => break,
                Some(Ok(event)) => {
                    if !is_write(&event.kind) {
                        continue;
                    }
                    if let Err(e) = tailer.on_change(alerts.as_ref()) {
                        warn!(error = %e, "skipping change event");
                    }
                }
                Some(Err(source)) => {
                    let e = WatchError::NotificationChannel { path: path.clone(), source };
                    warn!(error = %e, "notification channel error");
                }
            },
        }
    }

    debug!(path = %path.display(), "watch unit stopped");
    Ok(())
}
