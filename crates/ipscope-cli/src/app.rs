//! Wiring of the caching layer for a CLI invocation.

use crate::config::CliConfig;
use ipscope_cache::{CacheWorker, ClientRegistry, FilesystemCacheStore, Registration};
use ipscope_core::{Error, InboundMessage, IpSnapshot, Reply, Request, Result};
use ipscope_net::{HttpFetcher, snapshot_from_response};
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{debug, warn};

/// A lookup answered by the caching layer.
pub struct Observed {
    pub snapshot: IpSnapshot,
    /// Set when the network failed and a stored copy was served.
    pub cached_at: Option<chrono::DateTime<chrono::Utc>>,
}

/// The caching layer as seen by one CLI process.
pub struct App {
    pub config: CliConfig,
    pub store: Arc<FilesystemCacheStore>,
    pub registration: Arc<Registration>,
}

impl App {
    /// Open the cache directory and register the configured worker.
    pub async fn start(config: CliConfig, cache_dir: PathBuf) -> Result<Self> {
        let store = Arc::new(FilesystemCacheStore::new(cache_dir));
        let fetcher = Arc::new(HttpFetcher::new(config.worker.fetch_timeout())?);
        let clients = Arc::new(ClientRegistry::new());
        let registration = Arc::new(Registration::new(clients.clone()));

        let worker = CacheWorker::new(config.worker.clone(), store.clone(), fetcher, clients)?;
        let state = registration.register(Arc::new(worker)).await?;
        debug!(state = %state, "Worker registered");

        Ok(Self {
            config,
            store,
            registration,
        })
    }

    pub fn clients(&self) -> &Arc<ClientRegistry> {
        self.registration.clients()
    }

    /// Look up the current address through the caching layer, so a stored
    /// copy answers when the network is down. Fails with [`Error::Offline`]
    /// when neither is available.
    pub async fn lookup(&self) -> Result<Observed> {
        let request = Request::get(self.config.lookup.json_url()?);
        let response = self
            .registration
            .resolve(&request)
            .await
            .map_err(|e| match e {
                e if e.is_network() => Error::Offline(request.url.to_string()),
                e => e,
            })?;
        let snapshot = snapshot_from_response(&response)?;
        Ok(Observed {
            snapshot,
            cached_at: response.stored_at,
        })
    }

    /// Hand a snapshot to the caching layer for offline use.
    pub async fn remember(&self, snapshot: &IpSnapshot) {
        let payload = match serde_json::to_value(snapshot) {
            Ok(payload) => payload,
            Err(e) => {
                warn!(error = %e, "Failed to encode snapshot");
                return;
            }
        };
        if let Err(e) = self
            .registration
            .post_message(InboundMessage::CacheIpData(payload))
            .await
        {
            warn!(error = %e, "Failed to cache IP data");
        }
    }

    pub async fn version(&self) -> Result<String> {
        match self
            .registration
            .post_message(InboundMessage::GetVersion)
            .await?
        {
            Some(Reply::Version { version }) => Ok(version),
            other => Err(Error::Internal(format!("Unexpected reply: {:?}", other))),
        }
    }

    /// Delete every partition, whatever its version.
    pub async fn clear(&self) -> Result<()> {
        match self
            .registration
            .post_message(InboundMessage::ClearCache)
            .await?
        {
            Some(Reply::CacheCleared { success: true, .. }) => Ok(()),
            Some(Reply::CacheCleared { error, .. }) => {
                Err(Error::CacheStore(error.unwrap_or_default()))
            }
            other => Err(Error::Internal(format!("Unexpected reply: {:?}", other))),
        }
    }
}
