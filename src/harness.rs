//! Repeated, paced execution of a shell script with timing.
//!
//! Each run logs its start time, duration in seconds and end time to the
//! rolling log. A failing run stops the series.

use std::path::Path;
use std::time::{Duration, Instant};

use chrono::{DateTime, Local};
use tokio::process::Command;
use tracing::{error, info};

/// Timing of one successful run.
#[derive(Debug, Clone, PartialEq)]
pub struct RunTiming {
    /// 1-based run number.
    pub run: u32,
    /// Wall-clock start.
    pub started: DateTime<Local>,
    /// Elapsed time.
    pub duration: Duration,
}

/// Run `bash <script>` up to `times` times, sleeping `pacing` after each run.
///
/// Returns the timings of the runs that succeeded. A run that exits non-zero
/// or cannot be spawned is logged and ends the series early.
pub async fn run_timed(script: &Path, times: u32, pacing: Duration) -> Vec<RunTiming> {
    let mut timings = Vec::new();

    for run in 1..=times {
        let started = Local::now();
        info!(script = %script.display(), run, started = %started, "starting run");

        let clock = Instant::now();
        let status = Command::new("bash")
            .arg(script)
            .kill_on_drop(true)
            .status()
            .await;
        match status {
            Ok(status) if status.success() => {}
            Ok(status) => {
                error!(script = %script.display(), run, %status, "run failed");
                break;
            }
            Err(e) => {
                error!(script = %script.display(), run, error = %e, "failed to start run");
                break;
            }
        }
        let duration = clock.elapsed();

        info!(
            script = %script.display(),
            run,
            seconds = duration.as_secs_f64(),
            "execution time"
        );
        info!(script = %script.display(), run, ended = %Local::now(), "ended run");

        timings.push(RunTiming {
            run,
            started,
            duration,
        });

        if !pacing.is_zero() {
            tokio::time::sleep(pacing).await;
        }
    }

    timings
}
