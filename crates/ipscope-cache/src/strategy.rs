//! Fetch strategies.
//!
//! Each strategy resolves a request from the cache partitions and the
//! network. Only `200` responses are written back; anything else passes
//! through uncached. Cache writes that fail are logged and swallowed, since
//! the response itself was already obtained.

use crate::keys::PartitionNames;
use ipscope_core::ports::{CacheStorage, Fetcher};
use ipscope_core::{Error, Request, RequestKey, ResponseSnapshot, Result};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, warn};
use url::Url;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Strategy {
    CacheFirst,
    NetworkFirst,
    StaleWhileRevalidate,
}

impl std::fmt::Display for Strategy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            Strategy::CacheFirst => "cache-first",
            Strategy::NetworkFirst => "network-first",
            Strategy::StaleWhileRevalidate => "stale-while-revalidate",
        };
        f.write_str(name)
    }
}

/// Resolves requests using the cache store and the network.
///
/// Cheap to clone; the revalidation leg of stale-while-revalidate runs on
/// its own clone.
#[derive(Clone)]
pub struct StrategyEngine {
    store: Arc<dyn CacheStorage>,
    fetcher: Arc<dyn Fetcher>,
    names: PartitionNames,
    fetch_timeout: Duration,
    offline_page: Option<RequestKey>,
}

impl StrategyEngine {
    pub fn new(
        store: Arc<dyn CacheStorage>,
        fetcher: Arc<dyn Fetcher>,
        names: PartitionNames,
        fetch_timeout: Duration,
    ) -> Self {
        Self {
            store,
            fetcher,
            names,
            fetch_timeout,
            offline_page: None,
        }
    }

    /// Page served when a navigation fails and nothing else is cached.
    pub fn with_offline_page(mut self, url: &Url) -> Self {
        self.offline_page = Some(RequestKey::get(url));
        self
    }

    pub fn names(&self) -> &PartitionNames {
        &self.names
    }

    pub async fn resolve(&self, strategy: Strategy, request: &Request) -> Result<ResponseSnapshot> {
        match strategy {
            Strategy::CacheFirst => self.cache_first(request).await,
            Strategy::NetworkFirst => self.network_first(request).await,
            Strategy::StaleWhileRevalidate => self.stale_while_revalidate(request).await,
        }
    }

    /// Fetch from the network, bounded by the fetch timeout.
    ///
    /// An elapsed timeout aborts the fetch and is reported as
    /// [`Error::Timeout`], a network failure like any other.
    pub async fn fetch(&self, request: &Request) -> Result<ResponseSnapshot> {
        match tokio::time::timeout(self.fetch_timeout, self.fetcher.fetch(request)).await {
            Ok(result) => result,
            Err(_) => Err(Error::Timeout {
                url: request.url.to_string(),
                ms: self.fetch_timeout.as_millis() as u64,
            }),
        }
    }

    /// Serve from the static partition; fetch and store on a miss.
    pub async fn cache_first(&self, request: &Request) -> Result<ResponseSnapshot> {
        let key = request.key();
        if let Some(cached) = self.read(&self.names.static_cache, &key).await {
            debug!(url = %request.url, "Cache hit");
            return Ok(cached);
        }

        match self.fetch(request).await {
            Ok(response) => {
                if response.is_cacheable() {
                    self.write_through(&self.names.static_cache, &key, &response)
                        .await;
                }
                Ok(response)
            }
            Err(e) => {
                warn!(url = %request.url, error = %e, "Cache-first fetch failed");
                if request.is_navigation() {
                    if let Some(page) = self.offline_fallback().await {
                        return Ok(page);
                    }
                }
                Err(e)
            }
        }
    }

    /// Fetch first; fall back to the dynamic partition when the network fails.
    pub async fn network_first(&self, request: &Request) -> Result<ResponseSnapshot> {
        let key = request.key();
        match self.fetch(request).await {
            Ok(response) => {
                if response.is_cacheable() {
                    self.write_through(&self.names.dynamic_cache, &key, &response)
                        .await;
                }
                Ok(response)
            }
            Err(e) => {
                warn!(url = %request.url, error = %e, "Network failed, trying cache");
                match self.read(&self.names.dynamic_cache, &key).await {
                    Some(cached) => Ok(cached),
                    None => Err(e),
                }
            }
        }
    }

    /// Return the cached entry immediately and refresh it in the background.
    ///
    /// The refresh always runs as a detached task. When a cached entry
    /// exists the caller never waits for it and its failure is only logged.
    /// Without a cached entry the caller awaits the refresh result.
    pub async fn stale_while_revalidate(&self, request: &Request) -> Result<ResponseSnapshot> {
        let key = request.key();
        let cached = self.read(&self.names.dynamic_cache, &key).await;

        let refresh = {
            let engine = self.clone();
            let request = request.clone();
            let serving_stale = cached.is_some();
            tokio::spawn(async move { engine.revalidate(&request, serving_stale).await })
        };

        match cached {
            Some(cached) => {
                debug!(url = %request.url, "Serving stale entry while revalidating");
                Ok(cached)
            }
            None => refresh
                .await
                .map_err(|e| Error::Internal(format!("Revalidation task failed: {}", e)))?,
        }
    }

    async fn revalidate(&self, request: &Request, serving_stale: bool) -> Result<ResponseSnapshot> {
        match self.fetch(request).await {
            Ok(response) => {
                if response.is_cacheable() {
                    self.write_through(&self.names.dynamic_cache, &request.key(), &response)
                        .await;
                }
                Ok(response)
            }
            Err(e) => {
                if serving_stale {
                    debug!(url = %request.url, error = %e, "Background revalidation failed");
                } else {
                    warn!(url = %request.url, error = %e, "Revalidation failed with nothing cached");
                }
                Err(e)
            }
        }
    }

    async fn offline_fallback(&self) -> Option<ResponseSnapshot> {
        let key = self.offline_page.as_ref()?;
        match self.store.lookup_any(key).await {
            Ok(page) => page,
            Err(e) => {
                warn!(error = %e, "Failed to read offline page");
                None
            }
        }
    }

    /// Cache read; store failures count as a miss.
    async fn read(&self, partition: &str, key: &RequestKey) -> Option<ResponseSnapshot> {
        match self.store.lookup(partition, key).await {
            Ok(hit) => hit,
            Err(e) => {
                warn!(partition = %partition, key = %key, error = %e, "Cache read failed");
                None
            }
        }
    }

    async fn write_through(&self, partition: &str, key: &RequestKey, response: &ResponseSnapshot) {
        let stamped = response.stamped(chrono::Utc::now());
        if let Err(e) = self.store.put(partition, key, &stamped).await {
            warn!(partition = %partition, key = %key, error = %e, "Cache write failed");
        }
    }
}
