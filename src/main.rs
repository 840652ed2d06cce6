//! Tailpack CLI entry point.
//!
//! Provides `monitor` for live error tailing, `pack` for turning core dumps
//! into a diagnostic archive, `stack`/`write-stack` for a single dump, `ps`
//! for processes running from the working directory, and `time` for
//! repeated timed script runs.

#![forbid(unsafe_code)]

use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use clap::{Parser, Subcommand};
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use tailpack::artifacts::{
    ArchiveBuilder, ArchiveStatus, ArtifactPipeline, CommandSymbolizer, CoreDump, FinalizeStatus,
    StackStatus, Symbolizer, ZipArchiver,
};
use tailpack::config::Config;
use tailpack::watch::{StdoutAlerts, WatchDispatcher};

/// Log error tailing and crash diagnostic bundles.
#[derive(Parser)]
#[command(name = "tailpack", version, about)]
struct Cli {
    /// Config file (default: `$TAILPACK_CONFIG` or `./tailpack.toml`).
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Subcommand to execute.
    #[command(subcommand)]
    command: Command,
}

/// Available CLI subcommands.
#[derive(Subcommand)]
enum Command {
    /// Watch the most recently modified log files and print error lines.
    Monitor,
    /// Bundle every core dump with its stack trace and logs.
    Pack,
    /// Print the stack trace of one core dump.
    Stack {
        /// Core dump file.
        core: PathBuf,
    },
    /// Write the stack trace of one core dump to `stack.<pid>`.
    WriteStack {
        /// Core dump file.
        core: PathBuf,
    },
    /// List processes whose working directory is the working directory.
    Ps,
    /// Run a script repeatedly and log how long each run takes.
    Time {
        /// Script run with `bash`.
        script: PathBuf,
        /// Number of runs.
        times: u32,
        /// Seconds to wait after each run.
        pacing_secs: u64,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let mut config = Config::load(cli.config.as_deref())?;
    config.paths.work_dir = std::fs::canonicalize(&config.paths.work_dir).with_context(|| {
        format!(
            "working directory {} is not accessible",
            config.paths.work_dir.display()
        )
    })?;

    let _logging_guard = tailpack::logging::init(&config.paths.resolved_rolling_log())?;

    match cli.command {
        Command::Monitor => handle_monitor(&config).await,
        Command::Pack => handle_pack(&config).await,
        Command::Stack { core } => handle_stack(&config, &core).await,
        Command::WriteStack { core } => handle_write_stack(&config, &core).await,
        Command::Ps => handle_ps(&config).await,
        Command::Time {
            script,
            times,
            pacing_secs,
        } => {
            tailpack::harness::run_timed(&script, times, Duration::from_secs(pacing_secs)).await;
            Ok(())
        }
    }
}

/// Tail the latest log files until Ctrl-C.
async fn handle_monitor(config: &Config) -> anyhow::Result<()> {
    let logs_dir = config.paths.resolved_logs_dir();
    let cancel = CancellationToken::new();

    let shutdown = cancel.clone();
    tokio::spawn(async move {
        match tokio::signal::ctrl_c().await {
            Ok(()) => {
                info!("received shutdown signal, stopping watch units");
                shutdown.cancel();
            }
            Err(e) => warn!(error = %e, "failed to listen for shutdown signal"),
        }
    });

    let dispatcher = WatchDispatcher::new(config.watch.clone(), Arc::new(StdoutAlerts));
    let started = dispatcher
        .run(&logs_dir, cancel)
        .await
        .with_context(|| format!("failed to watch {}", logs_dir.display()))?;
    if started == 0 {
        anyhow::bail!("no log files to watch under {}", logs_dir.display());
    }

    info!(units = started, "monitor stopped");
    Ok(())
}

/// Run the artifact pipeline over the working directory.
async fn handle_pack(config: &Config) -> anyhow::Result<()> {
    let pipeline = ArtifactPipeline::from_config(config);
    let report = pipeline.run().await.context("artifact pipeline failed")?;

    let failed = report
        .incidents
        .iter()
        .filter(|i| {
            matches!(i.stack, StackStatus::Failed { .. })
                || matches!(i.archive, ArchiveStatus::Failed { .. })
        })
        .count();

    match &report.finalize {
        FinalizeStatus::Created { archive, bundles } => info!(
            archive = %archive.display(),
            bundles,
            incidents = report.incidents.len(),
            failed,
            "pack complete"
        ),
        FinalizeStatus::NothingToPackage => {
            info!(incidents = report.incidents.len(), failed, "nothing to package");
        }
        FinalizeStatus::Failed { cause } => warn!(
            cause = %cause,
            incidents = report.incidents.len(),
            failed,
            "pack finished without a final archive, incident bundles kept"
        ),
    }
    Ok(())
}

/// Print the symbolizer output for one core dump.
async fn handle_stack(config: &Config, core: &Path) -> anyhow::Result<()> {
    let core = &resolve_core(core)?;
    let symbolizer = CommandSymbolizer::new(&config.tools.symbolizer, &config.paths.work_dir);
    let stack = symbolizer.extract(core).await?;

    let mut out = std::io::stdout().lock();
    writeln!(out, "Stack for {}:", core.display()).context("failed to write to stdout")?;
    out.write_all(&stack).context("failed to write to stdout")?;
    Ok(())
}

/// Extract one stack trace and leave it in `stack.<pid>`.
async fn handle_write_stack(config: &Config, core: &Path) -> anyhow::Result<()> {
    let core = &resolve_core(core)?;
    let record = CoreDump::from_path(core.to_path_buf());
    let symbolizer = CommandSymbolizer::new(&config.tools.symbolizer, &config.paths.work_dir);
    let stack = symbolizer.extract(core).await?;

    let builder = ArchiveBuilder::new(
        &config.paths.work_dir,
        Arc::new(ZipArchiver::new(&config.tools.archiver, &config.paths.work_dir)),
    );
    match builder.write_stack(&record.pid, &stack).await? {
        Some(path) => info!(path = %path.display(), "stack written"),
        None => warn!(core = %core.display(), "no stack file written"),
    }
    Ok(())
}

/// Print every process running from the working directory.
async fn handle_ps(config: &Config) -> anyhow::Result<()> {
    let processes = tailpack::procs::in_directory(&config.paths.work_dir)
        .await
        .context("failed to list processes")?;

    let mut out = std::io::stdout().lock();
    for p in &processes {
        writeln!(out, "Process ID: {}", p.pid).context("failed to write to stdout")?;
        writeln!(out, "Current working directory: {}", p.cwd.display())
            .context("failed to write to stdout")?;
        writeln!(out, "Command line: {}", p.command).context("failed to write to stdout")?;
    }
    Ok(())
}

/// Absolute path of a core dump named on the command line.
fn resolve_core(core: &Path) -> anyhow::Result<PathBuf> {
    std::fs::canonicalize(core).with_context(|| format!("core file {} not found", core.display()))
}
