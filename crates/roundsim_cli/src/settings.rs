use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use tracing::Level;

/// Optional TOML settings; command-line flags take precedence.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Settings {
    #[serde(default)]
    pub output: OutputSettings,
    #[serde(default)]
    pub logging: LoggingSettings,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OutputSettings {
    /// Where `run` writes statistics when `--stats-file` is absent
    #[serde(default)]
    pub stats_file: Option<PathBuf>,
    /// Where `run` writes the post-run graph when `--graph-copy-file` is absent
    #[serde(default)]
    pub graph_copy_file: Option<PathBuf>,
    /// Root directory for experiment results
    #[serde(default = "default_experiments_dir")]
    pub experiments_dir: PathBuf,
}

impl Default for OutputSettings {
    fn default() -> Self {
        Self {
            stats_file: None,
            graph_copy_file: None,
            experiments_dir: default_experiments_dir(),
        }
    }
}

fn default_experiments_dir() -> PathBuf {
    PathBuf::from("results")
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingSettings {
    /// One of `trace`, `debug`, `info`, `warn`, `error`
    #[serde(default = "default_level")]
    pub level: String,
    /// JSON lines instead of human-readable output
    #[serde(default = "default_json")]
    pub json: bool,
}

impl Default for LoggingSettings {
    fn default() -> Self {
        Self {
            level: default_level(),
            json: default_json(),
        }
    }
}

fn default_level() -> String {
    "info".to_string()
}

fn default_json() -> bool {
    true
}

impl Settings {
    /// Load settings from `path`, or the defaults when no path is given.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let Some(path) = path else {
            return Ok(Self::default());
        };
        let content = fs::read_to_string(path)
            .with_context(|| format!("reading settings file {}", path.display()))?;
        let settings: Settings = toml::from_str(&content)
            .with_context(|| format!("parsing settings file {}", path.display()))?;
        Ok(settings)
    }

    pub fn level(&self) -> Result<Level> {
        self.logging
            .level
            .parse()
            .with_context(|| format!("invalid log level '{}'", self.logging.level))
    }
}
