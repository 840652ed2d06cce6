//! Processes running from a directory.
//!
//! Used during crash triage to see what else was started from the working
//! directory. Relies on `ps` for the process table and `pwdx` for each
//! process's working directory.

use std::path::{Path, PathBuf};

use anyhow::Context;
use tokio::process::Command;
use tracing::debug;

/// A process whose working directory is inside the searched directory.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProcessInfo {
    /// Process id.
    pub pid: u32,
    /// Working directory reported by `pwdx`.
    pub cwd: PathBuf,
    /// Command line reported by `ps`, empty if it could not be read.
    pub command: String,
}

/// List processes whose working directory is `dir` or below it.
///
/// Processes that exit or deny access while being inspected are skipped.
///
/// # Errors
///
/// Returns an error if the process table cannot be listed.
pub async fn in_directory(dir: &Path) -> anyhow::Result<Vec<ProcessInfo>> {
    let mut found = Vec::new();
    for pid in list_pids().await? {
        let Some(cwd) = working_dir(pid).await else {
            continue;
        };
        if !cwd.starts_with(dir) {
            continue;
        }
        let command = command_line(pid).await.unwrap_or_default();
        found.push(ProcessInfo { pid, cwd, command });
    }
    debug!(dir = %dir.display(), count = found.len(), "processes in directory");
    Ok(found)
}

async fn list_pids() -> anyhow::Result<Vec<u32>> {
    let output = Command::new("ps")
        .args(["-e", "-o", "pid="])
        .output()
        .await
        .context("failed to run ps")?;
    if !output.status.success() {
        anyhow::bail!("ps exited with {}", output.status);
    }

    Ok(String::from_utf8_lossy(&output.stdout)
        .lines()
        .filter_map(|line| line.trim().parse().ok())
        .collect())
}

/// Working directory of `pid`, parsed from `pwdx` output (`<pid>: <path>`).
async fn working_dir(pid: u32) -> Option<PathBuf> {
    let output = match Command::new("pwdx").arg(pid.to_string()).output().await {
        Ok(output) if output.status.success() => output,
        Ok(output) => {
            debug!(pid, status = %output.status, "pwdx failed");
            return None;
        }
        Err(e) => {
            debug!(pid, error = %e, "failed to run pwdx");
            return None;
        }
    };

    let stdout = String::from_utf8_lossy(&output.stdout);
    let (_, path) = stdout.trim_end().split_once(": ")?;
    Some(PathBuf::from(path))
}

async fn command_line(pid: u32) -> Option<String> {
    let output = Command::new("ps")
        .args(["-p", &pid.to_string(), "-o", "command="])
        .output()
        .await
        .ok()?;
    output
        .status
        .success()
        .then(|| String::from_utf8_lossy(&output.stdout).trim().to_owned())
}
