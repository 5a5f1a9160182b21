//! TOML configuration for the popreport daemon.
//!
//! Every section has compiled-in defaults, so an empty file (or no file at
//! all) yields a working configuration. The config file path can be given
//! explicitly, through the `POPREPORT_CONFIG` environment variable, or by
//! placing `popreport.toml` in the working directory.

use std::path::{Path, PathBuf};
use std::str::FromStr;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

/// Environment variable naming the config file.
pub const CONFIG_ENV: &str = "POPREPORT_CONFIG";

/// Config file looked up in the working directory.
pub const LOCAL_CONFIG: &str = "popreport.toml";

// ---------------------------------------------------------------------------
// Top-level config
// ---------------------------------------------------------------------------

/// Root configuration for the process.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AppConfig {
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub scheduler: SchedulerConfig,
    #[serde(default)]
    pub storage: StorageConfig,
    #[serde(default)]
    pub source: SourceConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
}

impl AppConfig {
    /// Load configuration from a TOML file at `path`.
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read config file: {}", path.display()))?;
        toml::from_str(&content)
            .with_context(|| format!("failed to parse config file: {}", path.display()))
    }

    /// Resolve configuration, in order:
    /// 1. `explicit`, when given. Failure to load it is an error.
    /// 2. The path in `POPREPORT_CONFIG`.
    /// 3. `./popreport.toml`.
    /// 4. Compiled-in defaults.
    ///
    /// Nothing is logged here since this runs before the subscriber exists;
    /// call [`LoadedConfig::log`] once tracing is up.
    pub fn load_or_default(explicit: Option<&Path>) -> Result<LoadedConfig> {
        if let Some(path) = explicit {
            return Ok(LoadedConfig::from_file(Self::load(path)?, path, Vec::new()));
        }

        let mut skipped = Vec::new();

        if let Ok(env_path) = std::env::var(CONFIG_ENV) {
            let path = Path::new(&env_path);
            match Self::load(path) {
                Ok(cfg) => return Ok(LoadedConfig::from_file(cfg, path, skipped)),
                Err(e) => skipped.push(SkippedConfig {
                    origin: CONFIG_ENV,
                    path: path.to_path_buf(),
                    error: format!("{e:#}"),
                }),
            }
        }

        let local = Path::new(LOCAL_CONFIG);
        if local.exists() {
            match Self::load(local) {
                Ok(cfg) => return Ok(LoadedConfig::from_file(cfg, local, skipped)),
                Err(e) => skipped.push(SkippedConfig {
                    origin: "working directory",
                    path: local.to_path_buf(),
                    error: format!("{e:#}"),
                }),
            }
        }

        Ok(LoadedConfig {
            config: Self::default(),
            source: None,
            skipped,
        })
    }

    /// Reject settings the scheduler cannot run with.
    pub fn validate(&self) -> Result<()> {
        cron::Schedule::from_str(&self.scheduler.cron)
            .map_err(|e| anyhow::anyhow!("invalid scheduler.cron '{}': {}", self.scheduler.cron, e))?;
        if self.scheduler.poll_interval_secs == 0 {
            anyhow::bail!("scheduler.poll_interval_secs must be greater than zero");
        }
        Ok(())
    }
}

/// A config file that was found or named but could not be loaded.
#[derive(Debug, Clone)]
pub struct SkippedConfig {
    pub origin: &'static str,
    pub path: PathBuf,
    pub error: String,
}

/// The resolved configuration and how it was reached.
#[derive(Debug)]
pub struct LoadedConfig {
    pub config: AppConfig,
    /// File the config came from; `None` means compiled-in defaults.
    pub source: Option<PathBuf>,
    /// Candidates passed over on the way, in lookup order.
    pub skipped: Vec<SkippedConfig>,
}

impl LoadedConfig {
    fn from_file(config: AppConfig, path: &Path, skipped: Vec<SkippedConfig>) -> Self {
        Self {
            config,
            source: Some(path.to_path_buf()),
            skipped,
        }
    }

    /// Report the resolution. Call after the tracing subscriber is installed.
    pub fn log(&self) {
        for skip in &self.skipped {
            warn!(
                origin = skip.origin,
                path = %skip.path.display(),
                error = %skip.error,
                "config file from {} could not be loaded, falling back",
                skip.origin
            );
        }
        match &self.source {
            Some(path) => info!(path = %path.display(), "loaded configuration"),
            None => debug!("no config file found, using compiled-in defaults"),
        }
    }
}

// ---------------------------------------------------------------------------
// Server
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    /// Address the HTTP API binds to.
    pub bind: String,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind: "0.0.0.0:8080".to_string(),
        }
    }
}

// ---------------------------------------------------------------------------
// Scheduler
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SchedulerConfig {
    /// Six-field cron expression (with seconds), evaluated in UTC.
    pub cron: String,
    /// How often the background loop wakes up to check the schedule.
    pub poll_interval_secs: u64,
    /// Whether the gate is open when the daemon starts.
    pub enabled_on_start: bool,
    /// How long shutdown waits for the loop to exit.
    pub stop_timeout_secs: u64,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            cron: "0 0 8 * * *".to_string(),
            poll_interval_secs: 60,
            enabled_on_start: false,
            stop_timeout_secs: 5,
        }
    }
}

// ---------------------------------------------------------------------------
// Storage
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    /// JSON document holding the execution history.
    pub history_path: PathBuf,
    /// Directory rendered reports are written to.
    pub output_dir: PathBuf,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            history_path: PathBuf::from("logs/execution_history.json"),
            output_dir: PathBuf::from("outputs"),
        }
    }
}

// ---------------------------------------------------------------------------
// Source
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SourceConfig {
    pub url: String,
    pub timeout_secs: u64,
    pub user_agent: String,
}

impl Default for SourceConfig {
    fn default() -> Self {
        Self {
            url: "https://en.wikipedia.org/wiki/List_of_countries_by_population_(United_Nations)"
                .to_string(),
            timeout_secs: 30,
            user_agent: concat!("popreport/", env!("CARGO_PKG_VERSION")).to_string(),
        }
    }
}

// ---------------------------------------------------------------------------
// Logging
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Minimum tracing level; `RUST_LOG` takes precedence.
    pub level: String,
    pub format: LogFormat,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            format: LogFormat::Text,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LogFormat {
    Text,
    Json,
}
