//! Test helper functions and utilities.

use async_trait::async_trait;
use ipscope_core::ports::Fetcher;
use ipscope_core::{Error, Request, ResponseSnapshot, Result};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

/// Network with an on/off switch in front of a real fetcher.
pub struct SwitchableFetcher {
    inner: Arc<dyn Fetcher>,
    offline: AtomicBool,
}

impl SwitchableFetcher {
    pub fn new(inner: Arc<dyn Fetcher>) -> Self {
        Self {
            inner,
            offline: AtomicBool::new(false),
        }
    }

    pub fn set_offline(&self, offline: bool) {
        self.offline.store(offline, Ordering::SeqCst);
    }
}

#[async_trait]
impl Fetcher for SwitchableFetcher {
    async fn fetch(&self, request: &Request) -> Result<ResponseSnapshot> {
        if self.offline.load(Ordering::SeqCst) {
            return Err(Error::Network(format!("offline: {}", request.url)));
        }
        self.inner.fetch(request).await
    }
}

/// Wait for a condition with timeout.
pub async fn wait_for<F, Fut>(
    timeout: std::time::Duration,
    interval: std::time::Duration,
    mut condition: F,
) -> bool
where
    F: FnMut() -> Fut,
    Fut: std::future::Future<Output = bool>,
{
    let start = std::time::Instant::now();
    while start.elapsed() < timeout {
        if condition().await {
            return true;
        }
        tokio::time::sleep(interval).await;
    }
    false
}
