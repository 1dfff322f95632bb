//! Periodic IP reconciliation.

use crate::bridge::ClientRegistry;
use ipscope_core::ports::IpLookup;
use ipscope_core::{IpSnapshot, OutboundMessage, Result};
use std::sync::Arc;
use tokio::sync::{RwLock, watch};
use tokio::time::{Duration, interval};
use tracing::{debug, info, warn};

/// Default interval between lookups.
pub const DEFAULT_RECONCILE_INTERVAL: Duration = Duration::from_secs(300);

/// Looks up the current address on a fixed interval and broadcasts it to
/// every open client. Each client decides whether the address changed.
pub struct ReconcileService {
    lookup: Arc<dyn IpLookup>,
    clients: Arc<ClientRegistry>,
    interval: Duration,
    last: RwLock<Option<IpSnapshot>>,
}

impl ReconcileService {
    pub fn new(lookup: Arc<dyn IpLookup>, clients: Arc<ClientRegistry>, interval: Duration) -> Self {
        Self {
            lookup,
            clients,
            interval,
            last: RwLock::new(None),
        }
    }

    /// Run the reconciliation loop until shutdown.
    pub async fn run(&self, mut shutdown: watch::Receiver<bool>) {
        let mut ticker = interval(self.interval);

        info!(
            interval_secs = self.interval.as_secs(),
            "Starting reconcile service"
        );

        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    if let Err(e) = self.reconcile_once().await {
                        warn!(error = %e, "IP check failed");
                    }
                }
                changed = shutdown.changed() => {
                    if changed.is_err() || *shutdown.borrow() {
                        info!("Reconcile service shutting down");
                        break;
                    }
                }
            }
        }
    }

    /// Perform one lookup and broadcast the result. Returns the number of
    /// clients reached.
    pub async fn reconcile_once(&self) -> Result<usize> {
        let snapshot = self.lookup.lookup().await?;
        *self.last.write().await = Some(snapshot.clone());

        let ip = snapshot.ip.clone();
        let delivered = self
            .clients
            .broadcast(OutboundMessage::IpUpdate(snapshot))
            .await;
        debug!(ip = %ip, clients = delivered, "IP update broadcast");
        Ok(delivered)
    }

    /// Most recent successful lookup.
    pub async fn last_snapshot(&self) -> Option<IpSnapshot> {
        self.last.read().await.clone()
    }
}
