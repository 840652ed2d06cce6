//! Crash artifact pipeline.
//!
//! For every core dump in the working directory, in order:
//! extract a stack trace → find the logs of that pid → zip both into an
//! incident bundle. Once all dumps are handled, the bundles are folded into one
//! timestamped final archive.
//!
//! Incidents are processed sequentially. A failure in one incident is logged
//! and recorded in its [`IncidentReport`]; it never stops the run.

pub mod archive;
pub mod core_dump;
pub mod correlate;
pub mod stack;

use std::path::{Path, PathBuf};
use std::sync::Arc;

use tracing::{error, info, warn};

use crate::config::Config;

pub use archive::{ArchiveBuilder, ArchiveStatus, Archiver, FinalizeStatus, ZipArchiver};
pub use core_dump::CoreDump;
pub use correlate::LogCorrelator;
pub use stack::{CommandSymbolizer, Symbolizer};

/// Errors raised by the artifact pipeline.
#[derive(Debug, thiserror::Error)]
pub enum ArtifactError {
    /// The working directory is missing or not a directory. Fatal to the run.
    #[error("working directory {path} is not readable: {source}")]
    WorkDirUnreadable {
        /// Configured working directory.
        path: PathBuf,
        /// Underlying I/O error.
        #[source]
        source: std::io::Error,
    },

    /// A file name pattern could not be compiled.
    #[error("invalid glob pattern {pattern}: {source}")]
    Pattern {
        /// Pattern that failed.
        pattern: String,
        /// Error from the glob parser.
        #[source]
        source: glob::PatternError,
    },

    /// The symbolizer could not produce a stack trace.
    #[error("failed to get stack for {core}: {cause}")]
    StackExtractionFailed {
        /// Core dump passed to the symbolizer.
        core: PathBuf,
        /// What went wrong.
        cause: String,
    },

    /// The stack trace could not be written to its temporary file.
    #[error("failed to write {path}: {source}")]
    StackWrite {
        /// Stack file path.
        path: PathBuf,
        /// Underlying I/O error.
        #[source]
        source: std::io::Error,
    },

    /// The archiver could not create an archive.
    #[error("failed to create {archive}: {cause}")]
    ArchiveFailed {
        /// Archive that was being created.
        archive: PathBuf,
        /// What went wrong, including the tool's output.
        cause: String,
    },
}

/// How stack extraction ended for one incident.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StackStatus {
    /// The symbolizer produced a stack trace of this many bytes.
    Extracted {
        /// Size of the trace.
        bytes: usize,
    },
    /// The symbolizer succeeded but printed nothing.
    Empty,
    /// The symbolizer failed.
    Failed {
        /// Failure description.
        cause: String,
    },
    /// The dump name carried no pid, so nothing was attempted.
    Skipped,
}

/// Result of processing one core dump.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IncidentReport {
    /// The dump that was processed.
    pub core: CoreDump,
    /// Stack extraction outcome.
    pub stack: StackStatus,
    /// Log files correlated with the pid.
    pub logs: Vec<PathBuf>,
    /// Archiving outcome.
    pub archive: ArchiveStatus,
}

/// Result of one pipeline run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PipelineReport {
    /// One entry per core dump found, in processing order.
    pub incidents: Vec<IncidentReport>,
    /// Final archive outcome.
    pub finalize: FinalizeStatus,
}

/// Orchestrates core dump discovery, stack extraction, log correlation and
/// archiving for one working directory.
pub struct ArtifactPipeline {
    work_dir: PathBuf,
    symbolizer: Arc<dyn Symbolizer>,
    correlator: LogCorrelator,
    builder: ArchiveBuilder,
}

impl std::fmt::Debug for ArtifactPipeline {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ArtifactPipeline")
            .field("work_dir", &self.work_dir)
            .field("correlator", &self.correlator)
            .field("builder", &self.builder)
            .finish_non_exhaustive()
    }
}

impl ArtifactPipeline {
    /// Assemble a pipeline from its parts.
    pub fn new(
        work_dir: &Path,
        symbolizer: Arc<dyn Symbolizer>,
        correlator: LogCorrelator,
        builder: ArchiveBuilder,
    ) -> Self {
        Self {
            work_dir: work_dir.to_path_buf(),
            symbolizer,
            correlator,
            builder,
        }
    }

    /// Pipeline using the configured symbolizer and archiver commands.
    pub fn from_config(config: &Config) -> Self {
        let work_dir = &config.paths.work_dir;
        Self::new(
            work_dir,
            Arc::new(CommandSymbolizer::new(&config.tools.symbolizer, work_dir)),
            LogCorrelator::new(work_dir, &config.paths.resolved_logs_dir()),
            ArchiveBuilder::new(
                work_dir,
                Arc::new(ZipArchiver::new(&config.tools.archiver, work_dir)),
            ),
        )
    }

    /// Process every core dump, then build the final archive.
    ///
    /// # Errors
    ///
    /// Returns [`ArtifactError::WorkDirUnreadable`] if the working directory
    /// cannot be read, or [`ArtifactError::Pattern`] if it cannot be globbed.
    /// Per-incident failures are reported in the returned [`PipelineReport`].
    pub async fn run(&self) -> Result<PipelineReport, ArtifactError> {
        std::fs::read_dir(&self.work_dir).map_err(|source| ArtifactError::WorkDirUnreadable {
            path: self.work_dir.clone(),
            source,
        })?;

        let dumps = core_dump::locate(&self.work_dir)?;
        if dumps.is_empty() {
            info!(dir = %self.work_dir.display(), "no core files found");
        }

        let mut incidents = Vec::with_capacity(dumps.len());
        for dump in dumps {
            incidents.push(self.process(dump).await);
        }

        let finalize = self.builder.finalize().await;
        Ok(PipelineReport { incidents, finalize })
    }

    /// Run one incident through its states:
    /// discovered → stack extracted/failed → archived/failed.
    async fn process(&self, core: CoreDump) -> IncidentReport {
        info!(core = %core.path.display(), "retrieving stack and packing log files for core file");

        if !core.has_pid() {
            warn!(core = %core.path.display(), "invalid pid in core file name, skipping");
            return IncidentReport {
                core,
                stack: StackStatus::Skipped,
                logs: Vec::new(),
                archive: ArchiveStatus::Empty,
            };
        }

        let core_arg = core.path.strip_prefix(&self.work_dir).unwrap_or(&core.path);
        let (stack, bytes) = match self.symbolizer.extract(core_arg).await {
            Ok(bytes) if bytes.is_empty() => {
                warn!(pid = %core.pid, "symbolizer returned no data");
                (StackStatus::Empty, None)
            }
            Ok(bytes) => (StackStatus::Extracted { bytes: bytes.len() }, Some(bytes)),
            Err(e) => {
                error!(pid = %core.pid, error = %e, "stack extraction failed, archiving logs only");
                (StackStatus::Failed { cause: e.to_string() }, None)
            }
        };

        let logs = self.correlator.find_by_pid(&core.pid);
        info!(
            pid = %core.pid,
            logs = %logs.iter().map(|p| p.display().to_string()).collect::<Vec<_>>().join(", "),
            "log files"
        );

        let archive = self
            .builder
            .archive_incident(&core.pid, bytes.as_deref(), &logs)
            .await;

        IncidentReport {
            core,
            stack,
            logs,
            archive,
        }
    }
}

/// Glob pattern for `name_pattern` inside `dir`, with `dir` escaped.
pub(crate) fn glob_in(dir: &Path, name_pattern: &str) -> String {
    let dir = glob::Pattern::escape(&dir.to_string_lossy());
    format!("{dir}/{name_pattern}")
}

/// Resolve a tool path for a command run from `work_dir`.
///
/// Relative paths with more than one component (`./pmx`, `bin/pmx`) are
/// joined onto `work_dir`; bare names are left for `PATH` lookup.
pub(crate) fn resolve_program(program: &Path, work_dir: &Path) -> PathBuf {
    if program.is_relative() && program.components().count() > 1 {
        work_dir.join(program)
    } else {
        program.to_path_buf()
    }
}
