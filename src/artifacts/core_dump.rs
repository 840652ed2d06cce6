//! Core dump discovery by naming convention.
//!
//! Dumps are named `core.<pid>[.<anything>]`; the pid is the second
//! dot-separated segment of the file name.

use std::path::{Path, PathBuf};

use tracing::{debug, warn};

use super::ArtifactError;

/// Glob matched against file names in the working directory.
pub const CORE_DUMP_PATTERN: &str = "core.*";

/// A discovered core dump and the pid encoded in its name.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CoreDump {
    /// Path to the dump.
    pub path: PathBuf,
    /// Pid from the file name; empty if the name carries none.
    pub pid: String,
}

impl CoreDump {
    /// Build a record from a dump path.
    pub fn from_path(path: PathBuf) -> Self {
        let pid = path
            .file_name()
            .map(|name| pid_from_file_name(&name.to_string_lossy()))
            .unwrap_or_default();
        Self { path, pid }
    }

    /// Whether the file name yielded a usable pid.
    pub fn has_pid(&self) -> bool {
        !self.pid.is_empty()
    }
}

/// Extract the pid from a dump file name.
///
/// Returns the second dot-separated segment when it is a non-empty run of
/// ASCII digits, otherwise an empty string (`core`, `core.`, `core.bad`).
pub fn pid_from_file_name(name: &str) -> String {
    match name.split('.').nth(1) {
        Some(segment) if !segment.is_empty() && segment.bytes().all(|b| b.is_ascii_digit()) => {
            segment.to_owned()
        }
        _ => String::new(),
    }
}

/// List core dumps in `work_dir`, sorted by path.
///
/// Only regular files are returned. Entries the glob cannot read are logged
/// and skipped.
///
/// # Errors
///
/// Returns [`ArtifactError::Pattern`] if the glob pattern cannot be built
/// from `work_dir`.
pub fn locate(work_dir: &Path) -> Result<Vec<CoreDump>, ArtifactError> {
    let pattern = super::glob_in(work_dir, CORE_DUMP_PATTERN);
    let entries = glob::glob(&pattern).map_err(|source| ArtifactError::Pattern {
        pattern: pattern.clone(),
        source,
    })?;

    let mut dumps = Vec::new();
    for entry in entries {
        match entry {
            Ok(path) if path.is_file() => dumps.push(CoreDump::from_path(path)),
            Ok(path) => debug!(path = %path.display(), "skipping non-file core match"),
            Err(e) => warn!(error = %e, "skipping unreadable core match"),
        }
    }
    dumps.sort_by(|a, b| a.path.cmp(&b.path));
    Ok(dumps)
}
