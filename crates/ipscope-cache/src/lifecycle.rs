//! Worker lifecycle: install, activation and version bookkeeping.

use crate::bridge::ClientRegistry;
use crate::config::InstallPolicy;
use crate::keys::PartitionNames;
use crate::strategy::StrategyEngine;
use futures::future::join_all;
use ipscope_core::ports::CacheStorage;
use ipscope_core::{Error, Request, ResponseSnapshot, Result};
use serde::Serialize;
use std::fmt;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use tokio::sync::watch;
use tracing::{info, warn};
use url::Url;

/// Lifecycle state of a worker.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum WorkerState {
    Parsed,
    Installing,
    /// Installed and waiting for the previous version to let go.
    Installed,
    Activating,
    Activated,
    /// Failed to install, or superseded by a newer worker.
    Redundant,
}

impl fmt::Display for WorkerState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            WorkerState::Parsed => "parsed",
            WorkerState::Installing => "installing",
            WorkerState::Installed => "installed",
            WorkerState::Activating => "activating",
            WorkerState::Activated => "activated",
            WorkerState::Redundant => "redundant",
        };
        f.write_str(name)
    }
}

#[derive(Debug, Clone, Default)]
pub struct InstallReport {
    /// Manifest URLs written to the static partition.
    pub cached: Vec<String>,
    /// Manifest URLs skipped under [`InstallPolicy::BestEffort`].
    pub skipped: Vec<String>,
}

#[derive(Debug, Clone, Default)]
pub struct ActivationReport {
    /// Partitions from other versions that were deleted.
    pub deleted: Vec<String>,
    /// Clients now controlled by this version.
    pub claimed: usize,
}

/// Owns cache creation and eviction for one deployed version.
pub struct LifecycleController {
    store: Arc<dyn CacheStorage>,
    engine: StrategyEngine,
    names: PartitionNames,
    static_urls: Vec<Url>,
    policy: InstallPolicy,
    skip_waiting: AtomicBool,
    state: watch::Sender<WorkerState>,
}

impl LifecycleController {
    pub fn new(
        store: Arc<dyn CacheStorage>,
        engine: StrategyEngine,
        static_urls: Vec<Url>,
        policy: InstallPolicy,
    ) -> Self {
        let (state, _) = watch::channel(WorkerState::Parsed);
        Self {
            names: engine.names().clone(),
            store,
            engine,
            static_urls,
            policy,
            skip_waiting: AtomicBool::new(false),
            state,
        }
    }

    pub fn names(&self) -> &PartitionNames {
        &self.names
    }

    pub fn state(&self) -> WorkerState {
        *self.state.borrow()
    }

    /// Watch state transitions.
    pub fn subscribe(&self) -> watch::Receiver<WorkerState> {
        self.state.subscribe()
    }

    /// Ask to activate without waiting for older versions' clients.
    pub fn skip_waiting(&self) {
        self.skip_waiting.store(true, Ordering::SeqCst);
    }

    pub fn skip_waiting_requested(&self) -> bool {
        self.skip_waiting.load(Ordering::SeqCst)
    }

    /// Discard this worker. Terminal.
    pub fn mark_redundant(&self) {
        self.state.send_replace(WorkerState::Redundant);
    }

    fn transition(&self, allowed: &[WorkerState], to: WorkerState) -> Result<()> {
        let mut from = WorkerState::Parsed;
        let moved = self.state.send_if_modified(|state| {
            from = *state;
            if allowed.contains(state) {
                *state = to;
                true
            } else {
                false
            }
        });
        if moved {
            Ok(())
        } else {
            Err(Error::InvalidState {
                from: from.to_string(),
                to: to.to_string(),
            })
        }
    }

    /// Pre-populate the static partition with the static manifest.
    ///
    /// Under [`InstallPolicy::Atomic`] every entry is fetched before any is
    /// written; a failed fetch leaves the store untouched and the worker
    /// redundant. A failed write removes the static partition again if this
    /// install created it.
    pub async fn install(&self) -> Result<InstallReport> {
        self.transition(&[WorkerState::Parsed], WorkerState::Installing)?;
        info!(version = %self.names.version, files = self.static_urls.len(), "Installing");

        let fetches = self.static_urls.iter().map(|url| async move {
            let request = Request::get(url.clone());
            let outcome = match self.engine.fetch(&request).await {
                Ok(response) if response.is_cacheable() => Ok(response),
                Ok(response) => Err(format!("HTTP {}", response.status)),
                Err(e) => Err(e.to_string()),
            };
            (request, outcome)
        });
        let results = join_all(fetches).await;

        let mut report = InstallReport::default();
        let mut fetched: Vec<(Request, ResponseSnapshot)> = Vec::with_capacity(results.len());
        for (request, outcome) in results {
            match outcome {
                Ok(response) => fetched.push((request, response)),
                Err(reason) => match self.policy {
                    InstallPolicy::Atomic => {
                        warn!(url = %request.url, reason = %reason, "Install failed");
                        self.mark_redundant();
                        return Err(Error::InstallFailed {
                            url: request.url.to_string(),
                            reason,
                        });
                    }
                    InstallPolicy::BestEffort => {
                        warn!(url = %request.url, reason = %reason, "Skipping static file");
                        report.skipped.push(request.url.to_string());
                    }
                },
            }
        }

        let existed = self
            .store
            .has(&self.names.static_cache)
            .await
            .unwrap_or(true);
        if let Err(e) = self.write_static(&fetched).await {
            warn!(partition = %self.names.static_cache, error = %e, "Failed to write static cache");
            if !existed && self.policy == InstallPolicy::Atomic {
                if let Err(e) = self.store.delete(&self.names.static_cache).await {
                    warn!(partition = %self.names.static_cache, error = %e, "Failed to roll back static cache");
                }
            }
            self.mark_redundant();
            return Err(e);
        }
        report.cached = fetched.iter().map(|(r, _)| r.url.to_string()).collect();

        self.transition(&[WorkerState::Installing], WorkerState::Installed)?;
        info!(
            version = %self.names.version,
            cached = report.cached.len(),
            skipped = report.skipped.len(),
            "Installed"
        );
        Ok(report)
    }

    async fn write_static(&self, fetched: &[(Request, ResponseSnapshot)]) -> Result<()> {
        self.store.open(&self.names.static_cache).await?;
        let now = chrono::Utc::now();
        for (request, response) in fetched {
            self.store
                .put(&self.names.static_cache, &request.key(), &response.stamped(now))
                .await?;
        }
        Ok(())
    }

    /// Delete other versions' partitions and claim every open client.
    pub async fn activate(&self, clients: &ClientRegistry) -> Result<ActivationReport> {
        self.transition(&[WorkerState::Installed], WorkerState::Activating)?;
        info!(version = %self.names.version, "Activating");

        let mut report = ActivationReport::default();
        for name in self.store.keys().await? {
            if self.names.is_current(&name) {
                continue;
            }
            match self.store.delete(&name).await {
                Ok(_) => {
                    info!(partition = %name, "Removed stale cache");
                    report.deleted.push(name);
                }
                Err(e) => warn!(partition = %name, error = %e, "Failed to remove stale cache"),
            }
        }

        self.store.open(&self.names.static_cache).await?;
        self.store.open(&self.names.dynamic_cache).await?;

        report.claimed = clients.claim(&self.names.version).await;
        self.transition(&[WorkerState::Activating], WorkerState::Activated)?;
        info!(
            version = %self.names.version,
            deleted = report.deleted.len(),
            claimed = report.claimed,
            "Activated"
        );
        Ok(report)
    }
}
