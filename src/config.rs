use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::Context;
use tracing::trace;

use crate::Target;
use crate::scheduler::ScheduleSettings;

/// Storage backend configuration
#[derive(Debug, Clone, serde::Deserialize)]
#[serde(tag = "backend", rename_all = "lowercase")]
pub enum StorageConfig {
    /// In-memory storage (no persistence)
    #[serde(rename = "none")]
    None,

    /// SQLite database (default)
    Sqlite {
        /// Path to the SQLite database file
        #[serde(default = "default_sqlite_path")]
        path: PathBuf,
    },
}

impl Default for StorageConfig {
    fn default() -> Self {
        StorageConfig::Sqlite {
            path: default_sqlite_path(),
        }
    }
}

fn default_sqlite_path() -> PathBuf {
    PathBuf::from("./speedtests.db")
}

#[derive(Debug, Clone, serde::Deserialize)]
pub struct Config {
    pub targets: Vec<Target>,

    #[serde(default)]
    pub schedule: ScheduleConfig,

    #[serde(default)]
    pub probe: ProbeConfig,

    /// Storage configuration (optional - defaults to SQLite)
    pub storage: Option<StorageConfig>,

    #[serde(default)]
    pub render: RenderConfig,
}

#[derive(Debug, Clone, serde::Deserialize)]
pub struct ScheduleConfig {
    #[serde(default = "default_period_minutes")]
    pub period_minutes: u64,

    /// How long a pause sentinel is honoured before it is removed
    #[serde(default = "default_pause_hysteresis_minutes")]
    pub pause_hysteresis_minutes: u64,

    #[serde(default = "default_sentinel")]
    pub sentinel: PathBuf,
}

impl Default for ScheduleConfig {
    fn default() -> Self {
        Self {
            period_minutes: default_period_minutes(),
            pause_hysteresis_minutes: default_pause_hysteresis_minutes(),
            sentinel: default_sentinel(),
        }
    }
}

impl ScheduleConfig {
    pub fn settings(&self) -> anyhow::Result<ScheduleSettings> {
        ScheduleSettings::new(
            minutes("period_minutes", self.period_minutes)?,
            minutes("pause_hysteresis_minutes", self.pause_hysteresis_minutes)?,
        )
    }
}

fn minutes(field: &str, value: u64) -> anyhow::Result<Duration> {
    value
        .checked_mul(60)
        .map(Duration::from_secs)
        .with_context(|| format!("{field} is too large: {value}"))
}

fn default_period_minutes() -> u64 {
    20
}

fn default_pause_hysteresis_minutes() -> u64 {
    180
}

fn default_sentinel() -> PathBuf {
    PathBuf::from("./halt")
}

#[derive(Debug, Clone, serde::Deserialize)]
pub struct ProbeConfig {
    #[serde(default = "default_probe_command")]
    pub command: String,

    /// Arguments; `{id}` is replaced by the target id
    #[serde(default = "default_probe_args")]
    pub args: Vec<String>,

    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,

    /// Probes in flight at once; bandwidth tests share the uplink
    #[serde(default = "default_concurrency")]
    pub concurrency: usize,
}

impl Default for ProbeConfig {
    fn default() -> Self {
        Self {
            command: default_probe_command(),
            args: default_probe_args(),
            timeout_secs: default_timeout_secs(),
            concurrency: default_concurrency(),
        }
    }
}

impl ProbeConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

fn default_probe_command() -> String {
    String::from("speedtest")
}

fn default_probe_args() -> Vec<String> {
    ["-f", "json", "-s", "{id}"]
        .into_iter()
        .map(String::from)
        .collect()
}

fn default_timeout_secs() -> u64 {
    60
}

fn default_concurrency() -> usize {
    1
}

#[derive(Debug, Clone, serde::Deserialize)]
pub struct RenderConfig {
    #[serde(default = "default_output_dir")]
    pub output_dir: PathBuf,

    /// Regenerate all plots after every successful measurement cycle
    #[serde(default = "default_after_collect")]
    pub after_collect: bool,
}

impl Default for RenderConfig {
    fn default() -> Self {
        Self {
            output_dir: default_output_dir(),
            after_collect: default_after_collect(),
        }
    }
}

fn default_output_dir() -> PathBuf {
    PathBuf::from("./plots")
}

fn default_after_collect() -> bool {
    true
}

impl Config {
    pub fn storage(&self) -> StorageConfig {
        self.storage.clone().unwrap_or_default()
    }

    /// Reject configurations the scheduler cannot run with
    pub fn validate(&self) -> anyhow::Result<()> {
        if self.targets.is_empty() {
            anyhow::bail!("at least one target must be configured");
        }

        if self.probe.timeout_secs == 0 {
            anyhow::bail!("probe timeout must be greater than zero");
        }

        if self.probe.concurrency == 0 {
            anyhow::bail!("probe concurrency must be at least one");
        }

        self.schedule.settings()?;
        Ok(())
    }
}

pub fn read_config_file(path: impl AsRef<Path>) -> anyhow::Result<Config> {
    let path = path.as_ref();
    let file_content = std::fs::read_to_string(path)
        .with_context(|| format!("failed to read config file {}", path.display()))?;
    parse_config(&file_content).inspect(|config| trace!("loaded config: {config:?}"))
}

pub fn parse_config(content: &str) -> anyhow::Result<Config> {
    let config: Config = serde_json::from_str(content).context("invalid configuration file")?;
    config.validate()?;
    Ok(config)
}
