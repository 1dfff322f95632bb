//! The cache worker: one deployed version of the caching layer.

use crate::bridge::ClientRegistry;
use crate::classify::{Classifier, RequestClass};
use crate::config::WorkerConfig;
use crate::keys::{PartitionNames, ip_data_path};
use crate::lifecycle::{ActivationReport, InstallReport, LifecycleController, WorkerState};
use crate::strategy::StrategyEngine;
use ipscope_core::ports::{CacheStorage, Fetcher};
use ipscope_core::{Error, InboundMessage, Reply, Request, RequestKey, ResponseSnapshot, Result};
use serde_json::Value;
use std::sync::Arc;
use tracing::{debug, info, warn};
use url::Url;

/// Freshness advertised on synthetic IP data responses, in seconds.
pub const IP_DATA_MAX_AGE_SECS: u64 = 300;

/// Routes requests and handles messages for one version.
pub struct CacheWorker {
    config: WorkerConfig,
    origin: Url,
    store: Arc<dyn CacheStorage>,
    classifier: Classifier,
    engine: StrategyEngine,
    lifecycle: LifecycleController,
    clients: Arc<ClientRegistry>,
}

impl CacheWorker {
    pub fn new(
        config: WorkerConfig,
        store: Arc<dyn CacheStorage>,
        fetcher: Arc<dyn Fetcher>,
        clients: Arc<ClientRegistry>,
    ) -> Result<Self> {
        config.validate()?;
        let origin = config.origin_url()?;

        let mut engine = StrategyEngine::new(
            store.clone(),
            fetcher,
            config.partition_names(),
            config.fetch_timeout(),
        );
        if !config.offline_page.is_empty() {
            engine = engine.with_offline_page(&config.resolve(&config.offline_page)?);
        }

        let static_urls = config
            .static_files
            .iter()
            .map(|path| config.resolve(path))
            .collect::<Result<Vec<_>>>()?;
        let lifecycle = LifecycleController::new(
            store.clone(),
            engine.clone(),
            static_urls,
            config.install_policy,
        );

        Ok(Self {
            classifier: Classifier::from_config(&config),
            config,
            origin,
            store,
            engine,
            lifecycle,
            clients,
        })
    }

    pub fn config(&self) -> &WorkerConfig {
        &self.config
    }

    /// Version identifier reported to clients.
    pub fn version(&self) -> &str {
        &self.names().version
    }

    pub fn names(&self) -> &PartitionNames {
        self.engine.names()
    }

    pub fn state(&self) -> WorkerState {
        self.lifecycle.state()
    }

    pub fn classify(&self, request: &Request) -> RequestClass {
        self.classifier.classify_url(&request.url)
    }

    /// Pre-cache the static manifest.
    pub async fn on_install(&self) -> Result<InstallReport> {
        let report = self.lifecycle.install().await?;
        if self.config.skip_waiting {
            self.lifecycle.skip_waiting();
        }
        Ok(report)
    }

    /// Evict other versions' partitions and take control of open clients.
    pub async fn on_activate(&self) -> Result<ActivationReport> {
        self.lifecycle.activate(&self.clients).await
    }

    /// Resolve a request through the caching layer.
    ///
    /// Requests without a cache identity go straight to the network.
    pub async fn resolve(&self, request: &Request) -> Result<ResponseSnapshot> {
        if !request.is_cacheable() {
            debug!(method = %request.method, url = %request.url, "Bypassing cache");
            return self.engine.fetch(request).await;
        }

        let class = self.classify(request);
        let strategy = class.strategy();
        debug!(url = %request.url, class = ?class, strategy = %strategy, "Resolving");
        self.engine.resolve(strategy, request).await
    }

    /// Handle a message from an application instance.
    pub async fn on_message(&self, message: InboundMessage) -> Option<Reply> {
        debug!(kind = message.kind(), "Message received");
        match message {
            InboundMessage::SkipWaiting => {
                self.lifecycle.skip_waiting();
                None
            }
            InboundMessage::GetVersion => Some(Reply::Version {
                version: self.version().to_string(),
            }),
            InboundMessage::ClearCache => Some(match self.clear_all().await {
                Ok(_) => Reply::CacheCleared {
                    success: true,
                    error: None,
                },
                Err(e) => Reply::CacheCleared {
                    success: false,
                    error: Some(e.to_string()),
                },
            }),
            InboundMessage::CacheIpData(payload) => {
                if let Err(e) = self.cache_ip_data(&payload).await {
                    warn!(error = %e, "Failed to cache IP data");
                }
                None
            }
        }
    }

    /// Delete every partition, whatever version created it.
    pub async fn clear_all(&self) -> Result<usize> {
        let names = self.store.keys().await?;
        let mut deleted = 0;
        for name in &names {
            if self.store.delete(name).await? {
                deleted += 1;
            }
        }
        info!(partitions = deleted, "Cleared all caches");
        Ok(deleted)
    }

    fn ip_data_key(&self, ip: &str) -> Result<RequestKey> {
        Ok(RequestKey::get(&self.origin.join(&ip_data_path(ip))?))
    }

    /// Store an IP payload as a fresh JSON response at `/ip-data/{ip}`.
    pub async fn cache_ip_data(&self, payload: &Value) -> Result<()> {
        let ip = payload
            .get("ip")
            .and_then(Value::as_str)
            .filter(|ip| !ip.is_empty())
            .ok_or_else(|| Error::InvalidSnapshot("missing ip".to_string()))?;

        let key = self.ip_data_key(ip)?;
        let response = ResponseSnapshot::json(payload)?
            .with_header(
                "cache-control",
                format!("max-age={}", IP_DATA_MAX_AGE_SECS),
            )
            .with_url(key.url.clone())
            .stamped(chrono::Utc::now());

        self.store
            .put(&self.names().dynamic_cache, &key, &response)
            .await?;
        debug!(ip = %ip, "Cached IP data");
        Ok(())
    }

    /// Payload previously stored for `ip`, if any.
    pub async fn cached_ip_data(&self, ip: &str) -> Result<Option<Value>> {
        let key = self.ip_data_key(ip)?;
        match self
            .store
            .lookup(&self.names().dynamic_cache, &key)
            .await?
        {
            Some(response) => Ok(Some(response.json_body()?)),
            None => Ok(None),
        }
    }

    pub fn skip_waiting(&self) {
        self.lifecycle.skip_waiting();
    }

    pub fn skip_waiting_requested(&self) -> bool {
        self.lifecycle.skip_waiting_requested()
    }

    pub fn mark_redundant(&self) {
        self.lifecycle.mark_redundant();
    }
}
