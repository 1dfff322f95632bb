//! reqwest-backed network fetcher.

use async_trait::async_trait;
use ipscope_core::ports::Fetcher;
use ipscope_core::{Error, Request, ResponseSnapshot, Result};
use std::time::Duration;
use tracing::debug;

/// Performs requests over HTTP.
///
/// Every status is returned as a response; only transport failures are
/// errors.
#[derive(Clone)]
pub struct HttpFetcher {
    client: reqwest::Client,
    timeout: Duration,
}

impl HttpFetcher {
    pub fn new(timeout: Duration) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .user_agent(concat!("ipscope/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| Error::Network(format!("Failed to build HTTP client: {}", e)))?;
        Ok(Self { client, timeout })
    }

    pub fn with_client(client: reqwest::Client, timeout: Duration) -> Self {
        Self { client, timeout }
    }

    pub(crate) fn map_error(&self, url: &str, error: reqwest::Error) -> Error {
        map_reqwest_error(url, self.timeout, error)
    }
}

pub(crate) fn map_reqwest_error(url: &str, timeout: Duration, error: reqwest::Error) -> Error {
    if error.is_timeout() {
        Error::Timeout {
            url: url.to_string(),
            ms: timeout.as_millis() as u64,
        }
    } else {
        Error::Network(format!("Request to {} failed: {}", url, error))
    }
}

#[async_trait]
impl Fetcher for HttpFetcher {
    async fn fetch(&self, request: &Request) -> Result<ResponseSnapshot> {
        let url = request.url.as_str();
        let method = reqwest::Method::from_bytes(request.method.as_str().as_bytes())
            .map_err(|e| Error::InvalidMessage(format!("Invalid method: {}", e)))?;

        let mut builder = self.client.request(method, request.url.clone());
        for (name, value) in &request.headers {
            builder = builder.header(name, value);
        }

        let response = builder
            .send()
            .await
            .map_err(|e| self.map_error(url, e))?;

        let status = response.status();
        let final_url = response.url().to_string();
        let headers: Vec<(String, String)> = response
            .headers()
            .iter()
            .filter_map(|(name, value)| {
                value
                    .to_str()
                    .ok()
                    .map(|v| (name.as_str().to_string(), v.to_string()))
            })
            .collect();
        let body = response
            .bytes()
            .await
            .map_err(|e| self.map_error(url, e))?;

        debug!(url = %url, status = status.as_u16(), bytes = body.len(), "Fetched");

        let mut snapshot = ResponseSnapshot::new(status.as_u16(), body.to_vec()).with_url(final_url);
        if let Some(reason) = status.canonical_reason() {
            snapshot.status_text = reason.to_string();
        }
        for (name, value) in headers {
            snapshot = snapshot.with_header(name, value);
        }
        Ok(snapshot)
    }
}
