//! Stack extraction through the external symbolizer.

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use tokio::process::Command;
use tracing::debug;

use super::{resolve_program, ArtifactError};

/// Produces a stack trace for a core dump.
#[async_trait]
pub trait Symbolizer: Send + Sync {
    /// Return the raw stack trace bytes for `core`.
    ///
    /// # Errors
    ///
    /// Returns [`ArtifactError::StackExtractionFailed`] on any failure.
    async fn extract(&self, core: &Path) -> Result<Vec<u8>, ArtifactError>;
}

/// Runs `<program> -e <core>` in the working directory and captures stdout.
#[derive(Debug, Clone)]
pub struct CommandSymbolizer {
    program: PathBuf,
    work_dir: PathBuf,
}

impl CommandSymbolizer {
    /// Create a symbolizer running `program` from `work_dir`.
    ///
    /// A relative `program` containing a path separator (such as `./pmx`) is
    /// resolved against `work_dir`; a bare name is looked up on `PATH`.
    pub fn new(program: &Path, work_dir: &Path) -> Self {
        Self {
            program: resolve_program(program, work_dir),
            work_dir: work_dir.to_path_buf(),
        }
    }
}

#[async_trait]
impl Symbolizer for CommandSymbolizer {
    async fn extract(&self, core: &Path) -> Result<Vec<u8>, ArtifactError> {
        debug!(program = %self.program.display(), core = %core.display(), "running symbolizer");
        let failed = |cause: String| ArtifactError::StackExtractionFailed {
            core: core.to_path_buf(),
            cause,
        };

        let output = Command::new(&self.program)
            .arg("-e")
            .arg(core)
            .current_dir(&self.work_dir)
            .kill_on_drop(true)
            .output()
            .await
            .map_err(|e| failed(format!("failed to run {}: {e}", self.program.display())))?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(failed(format!(
                "{} exited with {}: {}",
                self.program.display(),
                output.status,
                stderr.trim()
            )));
        }
        Ok(output.stdout)
    }
}
