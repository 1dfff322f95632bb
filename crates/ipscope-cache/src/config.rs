//! Cache worker configuration.

use crate::keys::PartitionNames;
use ipscope_core::{Error, Result};
use serde::{Deserialize, Serialize};
use std::time::Duration;
use url::Url;

/// How installation treats a static manifest entry that cannot be fetched.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum InstallPolicy {
    /// Any failed entry fails the whole install; nothing is written.
    #[default]
    Atomic,
    /// Failed entries are logged and skipped.
    BestEffort,
}

/// Cache worker configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkerConfig {
    /// Application prefix used in partition names.
    #[serde(default = "default_app_name")]
    pub app_name: String,
    /// Deployed version. Changing it starts a new cache generation.
    #[serde(default = "default_version")]
    pub version: String,
    /// Origin the root-relative manifest paths are resolved against.
    #[serde(default = "default_origin")]
    pub origin: String,
    /// Root-relative paths pre-cached at install time.
    #[serde(default = "default_static_files")]
    pub static_files: Vec<String>,
    /// Absolute URLs served stale-while-revalidate.
    #[serde(default = "default_dynamic_files")]
    pub dynamic_files: Vec<String>,
    /// URL prefixes that are always fetched network-first.
    #[serde(default = "default_network_only")]
    pub network_only: Vec<String>,
    /// Hosts of the upstream lookup API.
    #[serde(default = "default_api_hosts")]
    pub api_hosts: Vec<String>,
    /// Remote font hosts served stale-while-revalidate.
    #[serde(default = "default_font_hosts")]
    pub font_hosts: Vec<String>,
    /// Page served for failed navigations.
    #[serde(default = "default_offline_page")]
    pub offline_page: String,
    /// Upper bound for every network fetch, in milliseconds.
    #[serde(default = "default_fetch_timeout_ms")]
    pub fetch_timeout_ms: u64,
    #[serde(default)]
    pub install_policy: InstallPolicy,
    /// Activate as soon as installation completes.
    #[serde(default = "default_skip_waiting")]
    pub skip_waiting: bool,
}

fn default_app_name() -> String {
    "ipscope".to_string()
}

fn default_version() -> String {
    "v1.0.0".to_string()
}

fn default_origin() -> String {
    "http://localhost:8080".to_string()
}

fn default_static_files() -> Vec<String> {
    [
        "/",
        "/index.html",
        "/style.css",
        "/script.js",
        "/manifest.json",
        "/icon-192x192.png",
        "/icon-512x512.png",
    ]
    .into_iter()
    .map(String::from)
    .collect()
}

fn default_dynamic_files() -> Vec<String> {
    vec![
        "https://fonts.googleapis.com/css2?family=Inter:wght@300;400;500;600;700;800;900&display=swap"
            .to_string(),
        "https://fonts.googleapis.com/css2?family=JetBrains+Mono:wght@400;500;600&display=swap"
            .to_string(),
    ]
}

fn default_network_only() -> Vec<String> {
    vec!["https://ipinfo.io".to_string()]
}

fn default_api_hosts() -> Vec<String> {
    vec!["ipinfo.io".to_string()]
}

fn default_font_hosts() -> Vec<String> {
    vec![
        "fonts.googleapis.com".to_string(),
        "fonts.gstatic.com".to_string(),
    ]
}

fn default_offline_page() -> String {
    "/offline.html".to_string()
}

fn default_fetch_timeout_ms() -> u64 {
    10_000
}

fn default_skip_waiting() -> bool {
    true
}

impl Default for WorkerConfig {
    fn default() -> Self {
        Self {
            app_name: default_app_name(),
            version: default_version(),
            origin: default_origin(),
            static_files: default_static_files(),
            dynamic_files: default_dynamic_files(),
            network_only: default_network_only(),
            api_hosts: default_api_hosts(),
            font_hosts: default_font_hosts(),
            offline_page: default_offline_page(),
            fetch_timeout_ms: default_fetch_timeout_ms(),
            install_policy: InstallPolicy::default(),
            skip_waiting: default_skip_waiting(),
        }
    }
}

impl WorkerConfig {
    /// Default settings for `origin` at the given version.
    pub fn for_origin(origin: impl Into<String>, version: impl Into<String>) -> Self {
        Self {
            origin: origin.into(),
            version: version.into(),
            ..Default::default()
        }
    }

    pub fn with_static_files<I, S>(mut self, files: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.static_files = files.into_iter().map(Into::into).collect();
        self
    }

    pub fn with_app_name(mut self, app_name: impl Into<String>) -> Self {
        self.app_name = app_name.into();
        self
    }

    pub fn with_install_policy(mut self, policy: InstallPolicy) -> Self {
        self.install_policy = policy;
        self
    }

    pub fn with_fetch_timeout(mut self, timeout: Duration) -> Self {
        self.fetch_timeout_ms = timeout.as_millis() as u64;
        self
    }

    pub fn with_skip_waiting(mut self, skip_waiting: bool) -> Self {
        self.skip_waiting = skip_waiting;
        self
    }

    /// Check the config before a worker is built from it.
    pub fn validate(&self) -> Result<()> {
        if self.version.trim().is_empty() {
            return Err(Error::Config("version must not be empty".to_string()));
        }
        if self.fetch_timeout_ms == 0 {
            return Err(Error::Config("fetch_timeout_ms must be positive".to_string()));
        }
        self.origin_url()?;
        for path in &self.static_files {
            if !path.starts_with('/') {
                return Err(Error::Config(format!(
                    "static file must be root-relative: {}",
                    path
                )));
            }
        }
        Ok(())
    }

    pub fn origin_url(&self) -> Result<Url> {
        let url = Url::parse(&self.origin)
            .map_err(|e| Error::Config(format!("invalid origin {}: {}", self.origin, e)))?;
        if !matches!(url.scheme(), "http" | "https") {
            return Err(Error::Config(format!("origin must be http(s): {}", self.origin)));
        }
        Ok(url)
    }

    /// Resolve a root-relative path against the origin.
    pub fn resolve(&self, path: &str) -> Result<Url> {
        Ok(self.origin_url()?.join(path)?)
    }

    pub fn fetch_timeout(&self) -> Duration {
        Duration::from_millis(self.fetch_timeout_ms)
    }

    pub fn partition_names(&self) -> PartitionNames {
        PartitionNames::new(&self.app_name, &self.version)
    }
}
