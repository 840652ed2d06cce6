//! Correlation of log files with a crashed process.
//!
//! A log belongs to a pid when its path contains the pid as a substring. The
//! path is compared relative to the working directory (`logs/app_555.log`),
//! so the location of the working directory itself never produces a match.

use std::path::{Path, PathBuf};

use tracing::warn;
use walkdir::WalkDir;

/// Finds log files for a pid under one log tree.
#[derive(Debug, Clone)]
pub struct LogCorrelator {
    work_dir: PathBuf,
    logs_dir: PathBuf,
}

impl LogCorrelator {
    /// Create a correlator over `logs_dir`, reporting paths relative to
    /// `work_dir` where possible.
    pub fn new(work_dir: &Path, logs_dir: &Path) -> Self {
        Self {
            work_dir: work_dir.to_path_buf(),
            logs_dir: logs_dir.to_path_buf(),
        }
    }

    /// Every regular file under the log tree whose path contains `pid`.
    ///
    /// An empty pid matches nothing. A missing or unreadable tree yields an
    /// empty result after logging a warning.
    pub fn find_by_pid(&self, pid: &str) -> Vec<PathBuf> {
        if pid.is_empty() {
            return Vec::new();
        }

        let mut matches = Vec::new();
        for entry in WalkDir::new(&self.logs_dir).sort_by_file_name() {
            let entry = match entry {
                Ok(entry) => entry,
                Err(e) => {
                    warn!(
                        dir = %self.logs_dir.display(),
                        error = %e,
                        "skipping unreadable log entry"
                    );
                    continue;
                }
            };
            if !entry.file_type().is_file() {
                continue;
            }
            let path = self.relative(entry.path());
            if path.to_string_lossy().contains(pid) {
                matches.push(path);
            }
        }
        matches
    }

    fn relative(&self, path: &Path) -> PathBuf {
        path.strip_prefix(&self.work_dir)
            .map(Path::to_path_buf)
            .unwrap_or_else(|_| path.to_path_buf())
    }
}
