//! Port traits (hexagonal architecture).
//!
//! These traits define the interfaces between the caching core and its
//! adapters: the durable store, the network and the upstream lookup API.

use crate::cache::{CacheEntry, ResponseSnapshot};
use crate::request::{Request, RequestKey};
use crate::snapshot::IpSnapshot;
use crate::Result;
use async_trait::async_trait;

/// Durable storage partitioned into named caches.
///
/// Implementations must be safe for concurrent reads and writes from
/// multiple in-flight tasks.
#[async_trait]
pub trait CacheStorage: Send + Sync {
    /// Open a partition, creating it if it does not exist.
    async fn open(&self, name: &str) -> Result<()>;

    /// Whether a partition exists.
    async fn has(&self, name: &str) -> Result<bool>;

    /// Names of all existing partitions.
    async fn keys(&self) -> Result<Vec<String>>;

    /// Delete a partition. Returns whether it existed.
    async fn delete(&self, name: &str) -> Result<bool>;

    /// Look up a request in one partition.
    async fn lookup(&self, name: &str, key: &RequestKey) -> Result<Option<ResponseSnapshot>>;

    /// Store a response, creating the partition if needed.
    async fn put(&self, name: &str, key: &RequestKey, response: &ResponseSnapshot) -> Result<()>;

    /// List the entries held by a partition.
    async fn entries(&self, name: &str) -> Result<Vec<CacheEntry>>;

    /// Look up a request across every partition, in `keys()` order.
    async fn lookup_any(&self, key: &RequestKey) -> Result<Option<ResponseSnapshot>> {
        for name in self.keys().await? {
            if let Some(hit) = self.lookup(&name, key).await? {
                return Ok(Some(hit));
            }
        }
        Ok(None)
    }
}

/// The network: performs a request and returns whatever the server sent.
///
/// Non-2xx statuses are successful fetches; only transport failures and
/// timeouts are errors.
#[async_trait]
pub trait Fetcher: Send + Sync {
    async fn fetch(&self, request: &Request) -> Result<ResponseSnapshot>;
}

/// Upstream public-address lookup.
#[async_trait]
pub trait IpLookup: Send + Sync {
    /// Full JSON snapshot.
    async fn lookup(&self) -> Result<IpSnapshot>;

    /// Plain-text address only.
    async fn current_ip(&self) -> Result<String>;
}
