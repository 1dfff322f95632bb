//! Worker registration: at most one active and one waiting version.

use crate::bridge::ClientRegistry;
use crate::lifecycle::WorkerState;
use crate::worker::CacheWorker;
use async_trait::async_trait;
use ipscope_core::ports::Fetcher;
use ipscope_core::{ClientId, Error, InboundMessage, Reply, Request, ResponseSnapshot, Result};
use std::sync::Arc;
use tokio::sync::{Mutex, RwLock};
use tracing::{info, warn};

pub struct Registration {
    clients: Arc<ClientRegistry>,
    active: RwLock<Option<Arc<CacheWorker>>>,
    waiting: RwLock<Option<Arc<CacheWorker>>>,
    // Serializes install and promotion.
    transitions: Mutex<()>,
}

impl Registration {
    pub fn new(clients: Arc<ClientRegistry>) -> Self {
        Self {
            clients,
            active: RwLock::new(None),
            waiting: RwLock::new(None),
            transitions: Mutex::new(()),
        }
    }

    pub fn clients(&self) -> &Arc<ClientRegistry> {
        &self.clients
    }

    pub async fn active(&self) -> Option<Arc<CacheWorker>> {
        self.active.read().await.clone()
    }

    pub async fn waiting(&self) -> Option<Arc<CacheWorker>> {
        self.waiting.read().await.clone()
    }

    /// Install a worker and activate it when nothing else is active or it
    /// asked to skip waiting. Otherwise it waits, superseding any worker
    /// already waiting.
    ///
    /// A failed install leaves the active worker untouched.
    pub async fn register(&self, worker: Arc<CacheWorker>) -> Result<WorkerState> {
        let _guard = self.transitions.lock().await;

        if let Err(e) = worker.on_install().await {
            warn!(version = %worker.version(), error = %e, "Registration failed");
            return Err(e);
        }

        if self.active.read().await.is_none() || worker.skip_waiting_requested() {
            self.promote(worker.clone()).await?;
        } else {
            info!(version = %worker.version(), "Worker waiting");
            if let Some(previous) = self.waiting.write().await.replace(worker.clone()) {
                info!(version = %previous.version(), "Superseded waiting worker");
                previous.mark_redundant();
            }
        }
        Ok(worker.state())
    }

    /// Promote the waiting worker, if any.
    pub async fn skip_waiting(&self) -> Result<bool> {
        let _guard = self.transitions.lock().await;
        self.promote_waiting().await
    }

    /// Disconnect a client. The waiting worker takes over once no client
    /// is left.
    pub async fn client_closed(&self, id: ClientId) -> Result<bool> {
        let _guard = self.transitions.lock().await;
        self.clients.disconnect(id).await;
        if self.clients.is_empty().await {
            self.promote_waiting().await
        } else {
            Ok(false)
        }
    }

    async fn promote_waiting(&self) -> Result<bool> {
        let Some(worker) = self.waiting.write().await.take() else {
            return Ok(false);
        };
        worker.skip_waiting();
        self.promote(worker).await?;
        Ok(true)
    }

    /// Activate `worker`. A different worker still waiting is superseded.
    async fn promote(&self, worker: Arc<CacheWorker>) -> Result<()> {
        worker.on_activate().await?;
        if let Some(stale) = self.waiting.write().await.take() {
            if !Arc::ptr_eq(&stale, &worker) {
                info!(version = %stale.version(), "Superseded waiting worker");
                stale.mark_redundant();
            }
        }
        if let Some(previous) = self.active.write().await.replace(worker.clone()) {
            info!(
                from = %previous.version(),
                to = %worker.version(),
                "Replaced active worker"
            );
            previous.mark_redundant();
        }
        Ok(())
    }

    /// Resolve a request through the active worker.
    pub async fn resolve(&self, request: &Request) -> Result<ResponseSnapshot> {
        match self.active().await {
            Some(worker) => worker.resolve(request).await,
            None => Err(Error::Internal("No active worker".to_string())),
        }
    }

    /// Deliver a client message.
    ///
    /// `SKIP_WAITING` is addressed to the waiting worker; everything else
    /// goes to the active one.
    pub async fn post_message(&self, message: InboundMessage) -> Result<Option<Reply>> {
        if message == InboundMessage::SkipWaiting {
            self.skip_waiting().await?;
            return Ok(None);
        }
        match self.active().await {
            Some(worker) => Ok(worker.on_message(message).await),
            None => Err(Error::Internal("No active worker".to_string())),
        }
    }
}

/// Lets adapters that only know the network route through the active
/// worker instead.
#[async_trait]
impl Fetcher for Registration {
    async fn fetch(&self, request: &Request) -> Result<ResponseSnapshot> {
        self.resolve(request).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::WorkerConfig;
    use crate::store::MemoryCacheStore;
    use crate::testing::MockFetcher;
    use ipscope_core::ports::CacheStorage;

    struct Fixture {
        store: Arc<MemoryCacheStore>,
        fetcher: Arc<MockFetcher>,
        registration: Registration,
    }

    impl Fixture {
        fn new() -> Self {
            Self {
                store: Arc::new(MemoryCacheStore::new()),
                fetcher: Arc::new(MockFetcher::new()),
                registration: Registration::new(Arc::new(ClientRegistry::new())),
            }
        }

        fn worker(&self, version: &str, files: &[&str], skip_waiting: bool) -> Arc<CacheWorker> {
            let config = WorkerConfig::for_origin("http://localhost:8080", version)
                .with_app_name("")
                .with_static_files(files.iter().copied())
                .with_skip_waiting(skip_waiting);
            Arc::new(
                CacheWorker::new(
                    config,
                    self.store.clone(),
                    self.fetcher.clone(),
                    self.registration.clients().clone(),
                )
                .unwrap(),
            )
        }
    }

    #[tokio::test]
    async fn test_first_worker_activates() {
        let fx = Fixture::new();
        let state = fx
            .registration
            .register(fx.worker("v1", &[], false))
            .await
            .unwrap();

        assert_eq!(state, WorkerState::Activated);
        assert_eq!(fx.registration.active().await.unwrap().version(), "v1");
    }

    #[tokio::test]
    async fn test_new_version_waits_for_skip_waiting_message() {
        let fx = Fixture::new();
        let v1 = fx.worker("v1", &[], false);
        fx.registration.register(v1.clone()).await.unwrap();
        let _client = fx.registration.clients().connect().await;

        let v2 = fx.worker("v2", &[], false);
        let state = fx.registration.register(v2).await.unwrap();
        assert_eq!(state, WorkerState::Installed);
        assert_eq!(fx.registration.active().await.unwrap().version(), "v1");

        let reply = fx
            .registration
            .post_message(InboundMessage::SkipWaiting)
            .await
            .unwrap();
        assert!(reply.is_none());
        assert_eq!(fx.registration.active().await.unwrap().version(), "v2");
        assert!(fx.registration.waiting().await.is_none());
        assert_eq!(v1.state(), WorkerState::Redundant);
        assert_eq!(
            fx.store.keys().await.unwrap(),
            vec!["dynamic-v2".to_string(), "static-v2".to_string()]
        );
    }

    #[tokio::test]
    async fn test_skip_waiting_worker_activates_immediately() {
        let fx = Fixture::new();
        fx.registration
            .register(fx.worker("v1", &[], false))
            .await
            .unwrap();
        let client = fx.registration.clients().connect().await;

        let state = fx
            .registration
            .register(fx.worker("v2", &[], true))
            .await
            .unwrap();
        assert_eq!(state, WorkerState::Activated);
        assert_eq!(
            fx.registration
                .clients()
                .controller_of(client.id)
                .await
                .as_deref(),
            Some("v2")
        );
    }

    #[tokio::test]
    async fn test_waiting_worker_takes_over_when_clients_close() {
        let fx = Fixture::new();
        fx.registration
            .register(fx.worker("v1", &[], false))
            .await
            .unwrap();
        let client = fx.registration.clients().connect().await;
        fx.registration
            .register(fx.worker("v2", &[], false))
            .await
            .unwrap();

        assert!(fx.registration.client_closed(client.id).await.unwrap());
        assert_eq!(fx.registration.active().await.unwrap().version(), "v2");
    }

    #[tokio::test]
    async fn test_newer_waiting_worker_supersedes_older() {
        let fx = Fixture::new();
        fx.registration
            .register(fx.worker("v1", &[], false))
            .await
            .unwrap();
        let _client = fx.registration.clients().connect().await;

        let v2 = fx.worker("v2", &[], false);
        fx.registration.register(v2.clone()).await.unwrap();
        fx.registration
            .register(fx.worker("v3", &[], false))
            .await
            .unwrap();

        assert_eq!(v2.state(), WorkerState::Redundant);
        assert_eq!(fx.registration.waiting().await.unwrap().version(), "v3");
    }

    #[tokio::test]
    async fn test_skip_waiting_worker_supersedes_waiting_one() {
        let fx = Fixture::new();
        fx.registration
            .register(fx.worker("v1", &[], false))
            .await
            .unwrap();
        let _client = fx.registration.clients().connect().await;

        let v2 = fx.worker("v2", &[], false);
        fx.registration.register(v2.clone()).await.unwrap();
        let state = fx
            .registration
            .register(fx.worker("v3", &[], true))
            .await
            .unwrap();

        assert_eq!(state, WorkerState::Activated);
        assert_eq!(v2.state(), WorkerState::Redundant);
        assert!(fx.registration.waiting().await.is_none());

        // Nothing is left to promote over the newer version.
        fx.registration
            .post_message(InboundMessage::SkipWaiting)
            .await
            .unwrap();
        assert_eq!(fx.registration.active().await.unwrap().version(), "v3");
        assert_eq!(
            fx.store.keys().await.unwrap(),
            vec!["dynamic-v3".to_string(), "static-v3".to_string()]
        );
    }

    #[tokio::test]
    async fn test_failed_install_keeps_prior_version() {
        let fx = Fixture::new();
        fx.fetcher
            .respond("http://localhost:8080/", ResponseSnapshot::ok("<html>"));
        fx.registration
            .register(fx.worker("v1", &["/"], true))
            .await
            .unwrap();

        fx.fetcher.set_offline(true);
        let v2 = fx.worker("v2", &["/"], true);
        let err = fx.registration.register(v2.clone()).await.unwrap_err();

        assert!(matches!(err, Error::InstallFailed { .. }));
        assert_eq!(v2.state(), WorkerState::Redundant);
        assert_eq!(fx.registration.active().await.unwrap().version(), "v1");
        assert_eq!(
            fx.store.keys().await.unwrap(),
            vec!["dynamic-v1".to_string(), "static-v1".to_string()]
        );

        // The previous version still serves its pre-cached shell.
        let page = fx
            .registration
            .resolve(&Request::parse("http://localhost:8080/").unwrap())
            .await
            .unwrap();
        assert_eq!(page.text().unwrap(), "<html>");
    }

    #[tokio::test]
    async fn test_no_active_worker() {
        let fx = Fixture::new();
        let err = fx
            .registration
            .resolve(&Request::parse("http://localhost:8080/").unwrap())
            .await
            .unwrap_err();
        assert!(matches!(err, Error::Internal(_)));

        let err = fx
            .registration
            .post_message(InboundMessage::GetVersion)
            .await
            .unwrap_err();
        assert!(matches!(err, Error::Internal(_)));
    }
}
