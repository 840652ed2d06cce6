//! Configuration loading and validation.
//!
//! Loads `tailpack.toml` (or `$TAILPACK_CONFIG`) with per-section defaults.
//! All sections use `#[serde(default)]` so a missing, minimal or empty config
//! file is valid. Precedence: env vars > config file > defaults.

use std::path::{Path, PathBuf};

use anyhow::Context;
use serde::Deserialize;

/// Config file looked up in the working directory when none is given.
pub const DEFAULT_CONFIG_FILE: &str = "tailpack.toml";

/// Top-level configuration.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Filesystem locations.
    pub paths: PathsConfig,
    /// Log tailing behaviour.
    pub watch: WatchConfig,
    /// External tools invoked by the artifact pipeline.
    pub tools: ToolsConfig,
}

/// Filesystem locations used by both subsystems.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct PathsConfig {
    /// Directory holding core dumps; archives and stack files are written here.
    pub work_dir: PathBuf,
    /// Log tree, relative to `work_dir` unless absolute.
    pub logs_dir: PathBuf,
    /// Rolling append-only log file, relative to `work_dir` unless absolute.
    pub rolling_log: PathBuf,
}

impl Default for PathsConfig {
    fn default() -> Self {
        Self {
            work_dir: PathBuf::from("."),
            logs_dir: PathBuf::from("logs"),
            rolling_log: PathBuf::from("tailpack.log"),
        }
    }
}

impl PathsConfig {
    /// Log tree resolved against the working directory.
    pub fn resolved_logs_dir(&self) -> PathBuf {
        self.work_dir.join(&self.logs_dir)
    }

    /// Rolling log file resolved against the working directory.
    pub fn resolved_rolling_log(&self) -> PathBuf {
        self.work_dir.join(&self.rolling_log)
    }
}

/// Log tailing settings.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct WatchConfig {
    /// How many of the most recently modified log files to watch.
    pub max_files: usize,
    /// Size of the line-start window used to bound re-reads per change event.
    pub backscan_lines: usize,
    /// Case-insensitive substrings that flag a line as an alert.
    pub keywords: Vec<String>,
}

impl Default for WatchConfig {
    fn default() -> Self {
        Self {
            max_files: 10,
            backscan_lines: 100,
            keywords: vec![
                "error".to_owned(),
                "fail".to_owned(),
                "exception".to_owned(),
            ],
        }
    }
}

/// External tool locations.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ToolsConfig {
    /// Stack symbolizer, invoked as `<symbolizer> -e <core>`.
    pub symbolizer: PathBuf,
    /// Archiver, invoked as `<archiver> -r <archive> <members...>`.
    pub archiver: PathBuf,
}

impl Default for ToolsConfig {
    fn default() -> Self {
        Self {
            symbolizer: PathBuf::from("./pmx"),
            archiver: PathBuf::from("zip"),
        }
    }
}

impl Config {
    /// Load configuration with precedence: env vars > TOML file > defaults.
    ///
    /// An explicit `path` must exist. Without one, `$TAILPACK_CONFIG` or
    /// `./tailpack.toml` is used if present, defaults otherwise.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read or parsed, or if the
    /// resulting configuration fails validation.
    pub fn load(path: Option<&Path>) -> anyhow::Result<Self> {
        Self::load_with(path, |key| std::env::var(key).ok())
    }

    /// Load using a custom env resolver (avoids `set_var` in tests).
    ///
    /// # Errors
    ///
    /// Same as [`Config::load`].
    pub fn load_with(
        path: Option<&Path>,
        env: impl Fn(&str) -> Option<String>,
    ) -> anyhow::Result<Self> {
        let mut config = match path {
            Some(p) => load_config_file(p)?,
            None => {
                let candidate = env("TAILPACK_CONFIG")
                    .map(PathBuf::from)
                    .unwrap_or_else(|| PathBuf::from(DEFAULT_CONFIG_FILE));
                if candidate.exists() {
                    load_config_file(&candidate)?
                } else {
                    tracing::debug!("no config file found, using defaults");
                    Self::default()
                }
            }
        };
        config.apply_overrides(env);
        config.validate()?;
        Ok(config)
    }

    /// Apply environment variable overrides.
    fn apply_overrides(&mut self, env: impl Fn(&str) -> Option<String>) {
        if let Some(v) = env("TAILPACK_WORK_DIR") {
            self.paths.work_dir = PathBuf::from(v);
        }
        if let Some(v) = env("TAILPACK_LOGS_DIR") {
            self.paths.logs_dir = PathBuf::from(v);
        }
        if let Some(v) = env("TAILPACK_SYMBOLIZER") {
            self.tools.symbolizer = PathBuf::from(v);
        }
        if let Some(v) = env("TAILPACK_ARCHIVER") {
            self.tools.archiver = PathBuf::from(v);
        }
    }

    /// Validate that config values are within sane bounds.
    ///
    /// # Errors
    ///
    /// Returns an error describing the first invalid field.
    pub fn validate(&self) -> anyhow::Result<()> {
        anyhow::ensure!(self.watch.max_files >= 1, "watch.max_files must be >= 1");
        anyhow::ensure!(
            self.watch.backscan_lines >= 1,
            "watch.backscan_lines must be >= 1"
        );
        anyhow::ensure!(
            !self.watch.keywords.is_empty(),
            "watch.keywords must not be empty"
        );
        anyhow::ensure!(
            self.watch.keywords.iter().all(|k| !k.trim().is_empty()),
            "watch.keywords must not contain blank entries"
        );
        anyhow::ensure!(
            !self.tools.symbolizer.as_os_str().is_empty(),
            "tools.symbolizer must not be empty"
        );
        anyhow::ensure!(
            !self.tools.archiver.as_os_str().is_empty(),
            "tools.archiver must not be empty"
        );
        Ok(())
    }
}

fn load_config_file(path: &Path) -> anyhow::Result<Config> {
    let contents = std::fs::read_to_string(path)
        .with_context(|| format!("failed to read config at {}", path.display()))?;
    let config: Config = toml::from_str(&contents)
        .with_context(|| format!("failed to parse config at {}", path.display()))?;
    tracing::debug!(path = %path.display(), "loaded config file");
    Ok(config)
}
