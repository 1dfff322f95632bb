//! Upstream lookup configuration.

use ipscope_core::{Error, Result};
use serde::{Deserialize, Serialize};
use std::time::Duration;
use url::Url;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LookupConfig {
    /// Base URL of the lookup API.
    #[serde(default = "default_base_url")]
    pub base_url: String,
    /// API token, sent as the `token` query parameter.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub token: Option<String>,
    /// Request timeout in milliseconds.
    #[serde(default = "default_timeout_ms")]
    pub timeout_ms: u64,
}

fn default_base_url() -> String {
    "https://ipinfo.io".to_string()
}

fn default_timeout_ms() -> u64 {
    10_000
}

impl Default for LookupConfig {
    fn default() -> Self {
        Self {
            base_url: default_base_url(),
            token: None,
            timeout_ms: default_timeout_ms(),
        }
    }
}

impl LookupConfig {
    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into();
        self
    }

    pub fn with_token(mut self, token: impl Into<String>) -> Self {
        self.token = Some(token.into());
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout_ms = timeout.as_millis() as u64;
        self
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }

    /// `{base_url}/json`, the full snapshot endpoint.
    pub fn json_url(&self) -> Result<Url> {
        self.endpoint("json")
    }

    /// `{base_url}/ip`, the plain-text address endpoint.
    pub fn ip_url(&self) -> Result<Url> {
        self.endpoint("ip")
    }

    fn endpoint(&self, path: &str) -> Result<Url> {
        let raw = format!("{}/{}", self.base_url.trim_end_matches('/'), path);
        let mut url = Url::parse(&raw)
            .map_err(|e| Error::Config(format!("invalid lookup base URL {}: {}", self.base_url, e)))?;
        if let Some(token) = self.token.as_deref().filter(|t| !t.is_empty()) {
            url.query_pairs_mut().append_pair("token", token);
        }
        Ok(url)
    }
}
