//! Test context providing access to all test infrastructure.

use crate::helpers::SwitchableFetcher;
use ipscope_cache::{
    CacheWorker, ClientRegistry, FilesystemCacheStore, Registration, WorkerConfig,
};
use ipscope_core::Result;
use ipscope_net::{HttpFetcher, IpInfoClient, LookupConfig};
use std::sync::Arc;
use std::time::Duration;
use tempfile::TempDir;
use url::Url;
use wiremock::MockServer;

/// Test context: a mock origin, a mock lookup API and a caching layer
/// storing its partitions in a temporary directory.
///
/// Drop this to stop the servers and remove the directory.
pub struct TestContext {
    pub origin: MockServer,
    pub api: MockServer,
    pub cache_dir: TempDir,
    pub store: Arc<FilesystemCacheStore>,
    pub network: Arc<SwitchableFetcher>,
    pub clients: Arc<ClientRegistry>,
    pub registration: Arc<Registration>,
}

impl TestContext {
    pub async fn new() -> Self {
        crate::init_test_logging();

        let (origin, api) = tokio::join!(MockServer::start(), MockServer::start());
        let cache_dir = tempfile::tempdir().expect("Failed to create cache dir");
        let store = Arc::new(FilesystemCacheStore::new(cache_dir.path()));
        let http = HttpFetcher::new(Duration::from_secs(5)).expect("Failed to create fetcher");
        let network = Arc::new(SwitchableFetcher::new(Arc::new(http)));
        let clients = Arc::new(ClientRegistry::new());
        let registration = Arc::new(Registration::new(clients.clone()));

        Self {
            origin,
            api,
            cache_dir,
            store,
            network,
            clients,
            registration,
        }
    }

    /// Absolute URL on the mock origin.
    pub fn url(&self, path: &str) -> Url {
        Url::parse(&self.origin.uri())
            .and_then(|base| base.join(path))
            .expect("Invalid origin URL")
    }

    /// Worker settings for the mock origin at `version`.
    ///
    /// Partitions are named `static-{version}` and `dynamic-{version}`.
    pub fn worker_config(&self, version: &str) -> WorkerConfig {
        let mut config = WorkerConfig::for_origin(self.origin.uri(), version)
            .with_app_name("")
            .with_static_files(["/", "/style.css"])
            .with_fetch_timeout(Duration::from_secs(2));
        // Both servers share a host, so the API is told apart by its prefix.
        config.network_only = vec![format!("{}/", self.api.uri())];
        config.dynamic_files = vec![self.url("/css2?family=Inter").to_string()];
        config
    }

    pub fn worker(&self, config: WorkerConfig) -> Result<Arc<CacheWorker>> {
        Ok(Arc::new(CacheWorker::new(
            config,
            self.store.clone(),
            self.network.clone(),
            self.clients.clone(),
        )?))
    }

    pub fn lookup_config(&self) -> LookupConfig {
        LookupConfig::default()
            .with_base_url(self.api.uri())
            .with_token("test-token")
    }

    /// Lookup client routed through the caching layer.
    pub fn routed_lookup(&self) -> IpInfoClient {
        IpInfoClient::with_fetcher(self.lookup_config(), self.registration.clone())
    }

    pub fn set_offline(&self, offline: bool) {
        self.network.set_offline(offline);
    }

    /// A second store over the same directory, as after a restart.
    pub fn reopen_store(&self) -> FilesystemCacheStore {
        FilesystemCacheStore::new(self.cache_dir.path())
    }
}
