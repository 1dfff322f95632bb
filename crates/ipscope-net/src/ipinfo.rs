//! Client for the upstream address lookup API.

use crate::config::LookupConfig;
use crate::fetcher::HttpFetcher;
use async_trait::async_trait;
use ipscope_core::ports::{Fetcher, IpLookup};
use ipscope_core::{Error, IpSnapshot, Request, ResponseSnapshot, Result};
use serde_json::Value;
use std::sync::Arc;
use tracing::{debug, info};

/// Address lookup client.
///
/// Requests go through a [`Fetcher`], so the client can run directly over
/// HTTP or be routed through the caching layer.
#[derive(Clone)]
pub struct IpInfoClient {
    config: LookupConfig,
    fetcher: Arc<dyn Fetcher>,
}

impl IpInfoClient {
    /// Client talking straight to the network.
    pub fn new(config: LookupConfig) -> Result<Self> {
        let fetcher = HttpFetcher::new(config.timeout())?;
        Ok(Self::with_fetcher(config, Arc::new(fetcher)))
    }

    pub fn with_fetcher(config: LookupConfig, fetcher: Arc<dyn Fetcher>) -> Self {
        Self { config, fetcher }
    }

    pub fn config(&self) -> &LookupConfig {
        &self.config
    }

    async fn get(&self, request: Request) -> Result<ResponseSnapshot> {
        let response = self.fetcher.fetch(&request).await?;
        if response.status != 200 {
            return Err(Error::UpstreamStatus {
                status: response.status,
                url: request.url.to_string(),
            });
        }
        Ok(response)
    }
}

/// Parse a lookup response. Only `200` JSON documents carrying an `ip`
/// are accepted.
pub fn snapshot_from_response(response: &ResponseSnapshot) -> Result<IpSnapshot> {
    if response.status != 200 {
        return Err(Error::UpstreamStatus {
            status: response.status,
            url: response.url.clone().unwrap_or_default(),
        });
    }
    let value: Value = response
        .json_body()
        .map_err(|e| Error::InvalidSnapshot(e.to_string()))?;
    IpSnapshot::from_value(value)
}

#[async_trait]
impl IpLookup for IpInfoClient {
    async fn lookup(&self) -> Result<IpSnapshot> {
        let request = Request::get(self.config.json_url()?);
        let response = self.get(request).await?;
        let snapshot = snapshot_from_response(&response)?;
        info!(ip = %snapshot.ip, "IP lookup complete");
        Ok(snapshot)
    }

    async fn current_ip(&self) -> Result<String> {
        let request = Request::get(self.config.ip_url()?);
        let response = self.get(request).await?;
        let ip = response.text()?.trim().to_string();
        if ip.is_empty() {
            return Err(Error::InvalidSnapshot("empty address".to_string()));
        }
        debug!(ip = %ip, "Current IP");
        Ok(ip)
    }
}
