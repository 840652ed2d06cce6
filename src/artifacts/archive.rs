//! Packaging of stack traces and logs into zip archives.
//!
//! Each incident becomes `stack_and_log_<pid>.zip`. At the end of a run all
//! incident bundles are folded into `final_stack_and_log_<timestamp>.zip`.
//! Intermediates are only removed once the step that consumes them has
//! succeeded, so a failed archiver never loses data.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use async_trait::async_trait;
use tokio::process::Command;
use tracing::{debug, error, info, warn};

use super::{resolve_program, ArtifactError};

/// Glob matching every incident bundle in the working directory.
pub const BUNDLE_PATTERN: &str = "stack_and_log_*.zip";

/// Name of the temporary stack file for `pid`.
pub fn stack_file_name(pid: &str) -> String {
    format!("stack.{pid}")
}

/// Name of the incident bundle for `pid`.
pub fn bundle_name(pid: &str) -> String {
    format!("stack_and_log_{pid}.zip")
}

/// Name of the final archive for a run finalized at `now`.
pub fn final_archive_name(now: &chrono::DateTime<chrono::Local>) -> String {
    format!("final_stack_and_log_{}.zip", now.format("%Y%m%d_%H%M%S"))
}

/// Builds a zip archive from member files.
#[async_trait]
pub trait Archiver: Send + Sync {
    /// Create `archive` containing `members`.
    ///
    /// Paths are relative to the working directory the archiver runs in.
    /// Returns the tool's combined output for logging.
    ///
    /// # Errors
    ///
    /// Returns [`ArtifactError::ArchiveFailed`] on any failure.
    async fn archive(&self, archive: &Path, members: &[PathBuf]) -> Result<String, ArtifactError>;
}

/// Runs `<program> -r <archive> <members...>` in the working directory.
#[derive(Debug, Clone)]
pub struct ZipArchiver {
    program: PathBuf,
    work_dir: PathBuf,
}

impl ZipArchiver {
    /// Create an archiver running `program` from `work_dir`.
    pub fn new(program: &Path, work_dir: &Path) -> Self {
        Self {
            program: resolve_program(program, work_dir),
            work_dir: work_dir.to_path_buf(),
        }
    }
}

#[async_trait]
impl Archiver for ZipArchiver {
    async fn archive(&self, archive: &Path, members: &[PathBuf]) -> Result<String, ArtifactError> {
        let failed = |cause: String| ArtifactError::ArchiveFailed {
            archive: archive.to_path_buf(),
            cause,
        };

        info!(
            command = %format!(
                "{} -r {} {}",
                self.program.display(),
                archive.display(),
                members
                    .iter()
                    .map(|m| m.display().to_string())
                    .collect::<Vec<_>>()
                    .join(" ")
            ),
            "running archiver"
        );

        let output = Command::new(&self.program)
            .arg("-r")
            .arg(archive)
            .args(members)
            .current_dir(&self.work_dir)
            .kill_on_drop(true)
            .output()
            .await
            .map_err(|e| failed(format!("failed to run {}: {e}", self.program.display())))?;

        let mut combined = String::from_utf8_lossy(&output.stdout).into_owned();
        combined.push_str(&String::from_utf8_lossy(&output.stderr));

        if !output.status.success() {
            return Err(failed(format!(
                "{} exited with {}: {}",
                self.program.display(),
                output.status,
                combined.trim()
            )));
        }
        Ok(combined)
    }
}

/// Where an incident ended up after archiving.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ArchiveStatus {
    /// The bundle was created and the stack file cleaned up.
    Archived {
        /// Path of the incident bundle.
        bundle: PathBuf,
    },
    /// The archiver failed.
    Failed {
        /// Failure description.
        cause: String,
        /// Whether `stack.<pid>` was left on disk for inspection.
        stack_retained: bool,
    },
    /// Neither a stack trace nor any log was available.
    Empty,
}

/// Outcome of folding the incident bundles into one final archive.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FinalizeStatus {
    /// No incident bundle existed.
    NothingToPackage,
    /// The final archive was created and the bundles removed.
    Created {
        /// Path of the final archive.
        archive: PathBuf,
        /// Number of bundles folded in.
        bundles: usize,
    },
    /// Aggregation failed; bundles were kept.
    Failed {
        /// Failure description.
        cause: String,
    },
}

/// Writes stack files and drives the archiver for one working directory.
pub struct ArchiveBuilder {
    work_dir: PathBuf,
    archiver: Arc<dyn Archiver>,
}

impl std::fmt::Debug for ArchiveBuilder {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ArchiveBuilder")
            .field("work_dir", &self.work_dir)
            .finish_non_exhaustive()
    }
}

impl ArchiveBuilder {
    /// Create a builder writing into `work_dir`.
    pub fn new(work_dir: &Path, archiver: Arc<dyn Archiver>) -> Self {
        Self {
            work_dir: work_dir.to_path_buf(),
            archiver,
        }
    }

    /// Write `stack` to `stack.<pid>` in the working directory.
    ///
    /// Returns the file name relative to the working directory, or `None`
    /// when there is nothing to write (empty stack or empty pid).
    ///
    /// # Errors
    ///
    /// Returns [`ArtifactError::StackWrite`] if the file cannot be written.
    pub async fn write_stack(
        &self,
        pid: &str,
        stack: &[u8],
    ) -> Result<Option<PathBuf>, ArtifactError> {
        if pid.is_empty() {
            warn!("invalid pid, not writing stack file");
            return Ok(None);
        }
        if stack.is_empty() {
            warn!(pid, "no stack data to write");
            return Ok(None);
        }

        let name = PathBuf::from(stack_file_name(pid));
        let path = self.work_dir.join(&name);
        tokio::fs::write(&path, stack)
            .await
            .map_err(|source| ArtifactError::StackWrite {
                path: path.clone(),
                source,
            })?;
        info!(path = %path.display(), "wrote stack file");
        Ok(Some(name))
    }

    /// Bundle the stack trace (if any) and `logs` for one incident.
    ///
    /// On success `stack.<pid>` is removed; the log files never are. On
    /// failure the stack file stays on disk.
    pub async fn archive_incident(
        &self,
        pid: &str,
        stack: Option<&[u8]>,
        logs: &[PathBuf],
    ) -> ArchiveStatus {
        let stack_member = match stack {
            Some(bytes) => match self.write_stack(pid, bytes).await {
                Ok(member) => member,
                Err(e) => {
                    error!(pid, error = %e, "failed to write stack file");
                    None
                }
            },
            None => None,
        };

        let mut members: Vec<PathBuf> = stack_member.iter().cloned().collect();
        members.extend(logs.iter().cloned());
        if members.is_empty() {
            warn!(pid, "no stack trace and no logs, nothing to archive");
            return ArchiveStatus::Empty;
        }

        let bundle = PathBuf::from(bundle_name(pid));
        match self.archiver.archive(&bundle, &members).await {
            Ok(output) => {
                info!(pid, output = %output.trim(), "archiver output");
                if let Some(stack_file) = &stack_member {
                    let stack_path = self.work_dir.join(stack_file);
                    if let Err(e) = tokio::fs::remove_file(&stack_path).await {
                        warn!(
                            path = %stack_path.display(),
                            error = %e,
                            "failed to remove stack file"
                        );
                    }
                }
                ArchiveStatus::Archived {
                    bundle: self.work_dir.join(bundle),
                }
            }
            Err(e) => {
                error!(pid, error = %e, "failed to zip files");
                if let Some(stack_file) = &stack_member {
                    warn!(
                        path = %self.work_dir.join(stack_file).display(),
                        "keeping stack file for manual inspection"
                    );
                }
                ArchiveStatus::Failed {
                    cause: e.to_string(),
                    stack_retained: stack_member.is_some(),
                }
            }
        }
    }

    /// Fold every incident bundle into one timestamped final archive.
    ///
    /// Bundles are removed only after the final archive was created.
    pub async fn finalize(&self) -> FinalizeStatus {
        let bundles = match self.list_bundles() {
            Ok(bundles) => bundles,
            Err(e) => {
                error!(error = %e, "failed to find incident bundles");
                return FinalizeStatus::Failed { cause: e.to_string() };
            }
        };

        if bundles.is_empty() {
            info!("no files match the pattern {BUNDLE_PATTERN}");
            return FinalizeStatus::NothingToPackage;
        }
        info!(count = bundles.len(), "files match the pattern {BUNDLE_PATTERN}");

        let archive = PathBuf::from(final_archive_name(&chrono::Local::now()));
        match self.archiver.archive(&archive, &bundles).await {
            Ok(output) => {
                info!(archive = %archive.display(), "created final zip file");
                debug!(output = %output.trim(), "archiver output");
                for bundle in &bundles {
                    let path = self.work_dir.join(bundle);
                    if let Err(e) = tokio::fs::remove_file(&path).await {
                        warn!(path = %path.display(), error = %e, "failed to remove bundle");
                    }
                }
                FinalizeStatus::Created {
                    archive: self.work_dir.join(archive),
                    bundles: bundles.len(),
                }
            }
            Err(e) => {
                error!(error = %e, "failed to create final zip file, keeping bundles");
                FinalizeStatus::Failed { cause: e.to_string() }
            }
        }
    }

    /// Incident bundle file names in the working directory, sorted.
    fn list_bundles(&self) -> Result<Vec<PathBuf>, ArtifactError> {
        let pattern = super::glob_in(&self.work_dir, BUNDLE_PATTERN);
        let entries = glob::glob(&pattern).map_err(|source| ArtifactError::Pattern {
            pattern: pattern.clone(),
            source,
        })?;

        let mut bundles = Vec::new();
        for entry in entries {
            match entry {
                Ok(path) if path.is_file() => {
                    if let Some(name) = path.file_name() {
                        bundles.push(PathBuf::from(name));
                    }
                }
                Ok(_) => {}
                Err(e) => warn!(error = %e, "skipping unreadable bundle match"),
            }
        }
        bundles.sort();
        Ok(bundles)
    }
}
