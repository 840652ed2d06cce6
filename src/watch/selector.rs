//! Selection of the most recently modified files under a log tree.

use std::path::{Path, PathBuf};
use std::time::SystemTime;

use tracing::{debug, warn};
use walkdir::WalkDir;

use super::WatchError;

/// A regular file picked for watching.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SelectedFile {
    /// Path as produced by walking the directory.
    pub path: PathBuf,
    /// Last modification time observed during the walk.
    pub modified: SystemTime,
}

/// Return the `limit` most recently modified regular files under `dir`.
///
/// The result is sorted ascending by modification time, so the newest file is
/// last. Nested entries that cannot be read are logged and skipped.
///
/// # Errors
///
/// Returns [`WatchError::DirectoryUnreadable`] if `dir` itself cannot be
/// listed.
pub fn select_latest(dir: &Path, limit: usize) -> Result<Vec<SelectedFile>, WatchError> {
    std::fs::read_dir(dir).map_err(|source| WatchError::DirectoryUnreadable {
        path: dir.to_path_buf(),
        source,
    })?;

    let mut files = Vec::new();
    for entry in WalkDir::new(dir) {
        let entry = match entry {
            Ok(entry) => entry,
            Err(e) => {
                warn!(dir = %dir.display(), error = %e, "skipping unreadable entry");
                continue;
            }
        };
        if !entry.file_type().is_file() {
            continue;
        }
        let modified = entry
            .metadata()
            .map_err(std::io::Error::from)
            .and_then(|m| m.modified());
        let modified = match modified {
            Ok(modified) => modified,
            Err(e) => {
                warn!(path = %entry.path().display(), error = %e, "skipping file without mtime");
                continue;
            }
        };
        files.push(SelectedFile {
            path: entry.into_path(),
            modified,
        });
    }

    files.sort_by_key(|f| f.modified);
    if files.len() > limit {
        files.drain(..files.len().saturating_sub(limit));
    }

    debug!(dir = %dir.display(), count = files.len(), "selected files to watch");
    Ok(files)
}
