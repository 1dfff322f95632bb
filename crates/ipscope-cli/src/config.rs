//! CLI configuration management.

use ipscope_cache::{InstallPolicy, WorkerConfig};
use ipscope_net::LookupConfig;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

/// CLI configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CliConfig {
    /// Upstream lookup API.
    #[serde(default)]
    pub lookup: LookupConfig,
    /// Caching layer.
    #[serde(default = "default_worker")]
    pub worker: WorkerConfig,
    /// Cache directory override.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cache_dir: Option<PathBuf>,
    /// Maximum number of addresses kept in the history.
    #[serde(default = "default_history_limit")]
    pub history_limit: usize,
    /// Seconds between background checks in `watch`.
    #[serde(default = "default_reconcile_interval_secs")]
    pub reconcile_interval_secs: u64,
    /// Output format.
    #[serde(default)]
    pub output_format: OutputFormat,
}

/// The CLI has no application origin to pre-cache from, so its worker
/// starts with an empty static manifest.
fn default_worker() -> WorkerConfig {
    WorkerConfig::default().with_static_files(Vec::<String>::new())
}

fn default_history_limit() -> usize {
    50
}

fn default_reconcile_interval_secs() -> u64 {
    300
}

impl Default for CliConfig {
    fn default() -> Self {
        Self {
            lookup: LookupConfig::default(),
            worker: default_worker(),
            cache_dir: None,
            history_limit: default_history_limit(),
            reconcile_interval_secs: default_reconcile_interval_secs(),
            output_format: OutputFormat::default(),
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OutputFormat {
    #[default]
    Table,
    Json,
    Yaml,
}

impl CliConfig {
    /// Load configuration from file.
    pub fn load() -> Result<Self, Box<dyn std::error::Error>> {
        let path = Self::config_path()?;
        if path.exists() {
            let content = std::fs::read_to_string(&path)?;
            Ok(serde_yaml::from_str(&content)?)
        } else {
            Ok(Self::default())
        }
    }

    /// Save configuration to file.
    pub fn save(&self) -> Result<(), Box<dyn std::error::Error>> {
        let path = Self::config_path()?;
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let content = serde_yaml::to_string(self)?;
        std::fs::write(&path, content)?;
        Ok(())
    }

    fn project_dirs() -> Result<directories::ProjectDirs, Box<dyn std::error::Error>> {
        Ok(directories::ProjectDirs::from("io", "ipscope", "ipscope")
            .ok_or("Could not determine config directory")?)
    }

    /// Get the configuration file path.
    pub fn config_path() -> Result<PathBuf, Box<dyn std::error::Error>> {
        Ok(Self::project_dirs()?.config_dir().join("config.yaml"))
    }

    /// Directory holding the cache partitions.
    pub fn cache_dir(&self) -> Result<PathBuf, Box<dyn std::error::Error>> {
        match &self.cache_dir {
            Some(dir) => Ok(dir.clone()),
            None => Ok(Self::project_dirs()?.cache_dir().join("partitions")),
        }
    }

    /// Path of the address history file.
    pub fn history_path() -> Result<PathBuf, Box<dyn std::error::Error>> {
        Ok(Self::project_dirs()?.data_dir().join("history.json"))
    }

    pub fn reconcile_interval(&self) -> Duration {
        Duration::from_secs(self.reconcile_interval_secs)
    }

    /// Set a configuration value.
    pub fn set(&mut self, key: &str, value: &str) -> Result<(), String> {
        match key {
            "lookup.base_url" => self.lookup.base_url = value.to_string(),
            "lookup.token" => {
                self.lookup.token = if value.is_empty() {
                    None
                } else {
                    Some(value.to_string())
                }
            }
            "lookup.timeout_ms" => self.lookup.timeout_ms = parse_number(key, value)?,
            "worker.origin" => self.worker.origin = value.to_string(),
            "worker.version" => self.worker.version = value.to_string(),
            "worker.fetch_timeout_ms" => self.worker.fetch_timeout_ms = parse_number(key, value)?,
            "worker.install_policy" => {
                self.worker.install_policy = match value {
                    "atomic" => InstallPolicy::Atomic,
                    "best-effort" => InstallPolicy::BestEffort,
                    _ => return Err(format!("Invalid install policy: {}", value)),
                };
            }
            "cache_dir" => {
                self.cache_dir = if value.is_empty() {
                    None
                } else {
                    Some(PathBuf::from(value))
                }
            }
            "history_limit" => self.history_limit = parse_number(key, value)?,
            "reconcile_interval_secs" => {
                let secs: u64 = parse_number(key, value)?;
                if secs == 0 {
                    return Err("reconcile_interval_secs must be positive".to_string());
                }
                self.reconcile_interval_secs = secs;
            }
            "output_format" => {
                self.output_format = match value {
                    "table" => OutputFormat::Table,
                    "json" => OutputFormat::Json,
                    "yaml" => OutputFormat::Yaml,
                    _ => return Err(format!("Invalid output format: {}", value)),
                };
            }
            _ => return Err(format!("Unknown config key: {}", key)),
        }
        Ok(())
    }
}

fn parse_number<T: std::str::FromStr>(key: &str, value: &str) -> Result<T, String> {
    value
        .parse()
        .map_err(|_| format!("Invalid number for {}: {}", key, value))
}
