//! Cache storage backends.

use crate::keys::entry_file_name;
use async_trait::async_trait;
use ipscope_core::ports::CacheStorage;
use ipscope_core::{CacheEntry, Error, RequestKey, ResponseSnapshot, Result};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use std::path::{Path, PathBuf};
use tokio::sync::RwLock;
use tracing::{debug, warn};
use uuid::Uuid;

type Partition = HashMap<RequestKey, ResponseSnapshot>;

/// In-memory cache store.
///
/// An optional per-partition entry limit makes writes fail with
/// [`Error::QuotaExceeded`] once a partition is full.
#[derive(Default)]
pub struct MemoryCacheStore {
    partitions: RwLock<BTreeMap<String, Partition>>,
    max_entries: Option<usize>,
}

impl MemoryCacheStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_max_entries(max_entries: usize) -> Self {
        Self {
            partitions: RwLock::new(BTreeMap::new()),
            max_entries: Some(max_entries),
        }
    }
}

#[async_trait]
impl CacheStorage for MemoryCacheStore {
    async fn open(&self, name: &str) -> Result<()> {
        self.partitions
            .write()
            .await
            .entry(name.to_string())
            .or_default();
        Ok(())
    }

    async fn has(&self, name: &str) -> Result<bool> {
        Ok(self.partitions.read().await.contains_key(name))
    }

    async fn keys(&self) -> Result<Vec<String>> {
        Ok(self.partitions.read().await.keys().cloned().collect())
    }

    async fn delete(&self, name: &str) -> Result<bool> {
        Ok(self.partitions.write().await.remove(name).is_some())
    }

    async fn lookup(&self, name: &str, key: &RequestKey) -> Result<Option<ResponseSnapshot>> {
        Ok(self
            .partitions
            .read()
            .await
            .get(name)
            .and_then(|partition| partition.get(key))
            .cloned())
    }

    async fn put(&self, name: &str, key: &RequestKey, response: &ResponseSnapshot) -> Result<()> {
        let mut partitions = self.partitions.write().await;
        let partition = partitions.entry(name.to_string()).or_default();

        if let Some(limit) = self.max_entries {
            if partition.len() >= limit && !partition.contains_key(key) {
                return Err(Error::QuotaExceeded {
                    partition: name.to_string(),
                    limit,
                });
            }
        }

        partition.insert(key.clone(), response.clone());
        Ok(())
    }

    async fn entries(&self, name: &str) -> Result<Vec<CacheEntry>> {
        let partitions = self.partitions.read().await;
        let partition = partitions
            .get(name)
            .ok_or_else(|| Error::PartitionNotFound(name.to_string()))?;

        let mut entries: Vec<CacheEntry> = partition
            .iter()
            .map(|(key, snapshot)| CacheEntry::from_snapshot(key.clone(), snapshot))
            .collect();
        entries.sort_by(|a, b| a.key.cmp(&b.key));
        Ok(entries)
    }
}

/// Partition names become directory names: ASCII letters, digits, `-`,
/// `_` and `.`, not starting with a dot.
fn is_valid_partition_name(name: &str) -> bool {
    !name.is_empty()
        && !name.starts_with('.')
        && name
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.'))
}

/// On-disk layout of one entry.
#[derive(Serialize, Deserialize)]
struct StoredEntry {
    key: RequestKey,
    response: ResponseSnapshot,
}

/// Filesystem-backed cache store.
///
/// Each partition is a directory under the root; each entry is a JSON file
/// named after a digest of its request identity.
pub struct FilesystemCacheStore {
    root_dir: PathBuf,
}

impl FilesystemCacheStore {
    pub fn new(root_dir: impl Into<PathBuf>) -> Self {
        Self {
            root_dir: root_dir.into(),
        }
    }

    pub fn root_dir(&self) -> &Path {
        &self.root_dir
    }

    fn partition_dir(&self, name: &str) -> Result<PathBuf> {
        if !is_valid_partition_name(name) {
            return Err(Error::CacheStore(format!("Invalid partition name: {}", name)));
        }
        Ok(self.root_dir.join(name))
    }

    fn entry_path(&self, name: &str, key: &RequestKey) -> Result<PathBuf> {
        Ok(self.partition_dir(name)?.join(entry_file_name(key)))
    }

    async fn read_entry(path: &Path) -> Result<StoredEntry> {
        let raw = tokio::fs::read(path)
            .await
            .map_err(|e| Error::CacheStore(format!("Failed to read cache entry: {}", e)))?;
        Ok(serde_json::from_slice(&raw)?)
    }
}

#[async_trait]
impl CacheStorage for FilesystemCacheStore {
    async fn open(&self, name: &str) -> Result<()> {
        let dir = self.partition_dir(name)?;
        tokio::fs::create_dir_all(&dir)
            .await
            .map_err(|e| Error::CacheStore(format!("Failed to create cache dir: {}", e)))
    }

    async fn has(&self, name: &str) -> Result<bool> {
        Ok(self.partition_dir(name)?.is_dir())
    }

    async fn keys(&self) -> Result<Vec<String>> {
        if !self.root_dir.exists() {
            return Ok(vec![]);
        }

        let mut read_dir = tokio::fs::read_dir(&self.root_dir)
            .await
            .map_err(|e| Error::CacheStore(format!("Failed to read cache dir: {}", e)))?;

        let mut names = vec![];
        while let Some(entry) = read_dir
            .next_entry()
            .await
            .map_err(|e| Error::CacheStore(format!("Failed to read entry: {}", e)))?
        {
            let is_dir = entry
                .file_type()
                .await
                .map(|t| t.is_dir())
                .unwrap_or(false);
            let name = entry.file_name().to_string_lossy().to_string();
            if is_dir && !name.starts_with('.') {
                names.push(name);
            }
        }

        names.sort();
        Ok(names)
    }

    async fn delete(&self, name: &str) -> Result<bool> {
        let dir = self.partition_dir(name)?;
        if !dir.exists() {
            return Ok(false);
        }
        tokio::fs::remove_dir_all(&dir)
            .await
            .map_err(|e| Error::CacheStore(format!("Failed to delete cache: {}", e)))?;
        Ok(true)
    }

    async fn lookup(&self, name: &str, key: &RequestKey) -> Result<Option<ResponseSnapshot>> {
        let path = self.entry_path(name, key)?;
        if !path.exists() {
            return Ok(None);
        }

        let stored = Self::read_entry(&path).await?;
        if &stored.key != key {
            debug!(path = %path.display(), "Cache entry digest collision, treating as miss");
            return Ok(None);
        }
        Ok(Some(stored.response))
    }

    async fn put(&self, name: &str, key: &RequestKey, response: &ResponseSnapshot) -> Result<()> {
        self.open(name).await?;
        let path = self.entry_path(name, key)?;

        let stored = StoredEntry {
            key: key.clone(),
            response: response.clone(),
        };
        let contents = serde_json::to_vec(&stored)?;

        // Each writer renames its own temp file into place, so readers
        // and concurrent writers never observe a partial entry.
        let tmp_path = path.with_extension(format!("{}.tmp", Uuid::new_v4().simple()));
        let written = match tokio::fs::write(&tmp_path, contents).await {
            Ok(()) => tokio::fs::rename(&tmp_path, &path).await,
            Err(e) => Err(e),
        };
        if let Err(e) = written {
            if let Err(cleanup) = tokio::fs::remove_file(&tmp_path).await {
                if cleanup.kind() != std::io::ErrorKind::NotFound {
                    warn!(path = %tmp_path.display(), error = %cleanup, "Failed to remove temp file");
                }
            }
            return Err(Error::CacheStore(format!("Failed to write cache: {}", e)));
        }

        Ok(())
    }

    async fn entries(&self, name: &str) -> Result<Vec<CacheEntry>> {
        let dir = self.partition_dir(name)?;
        if !dir.is_dir() {
            return Err(Error::PartitionNotFound(name.to_string()));
        }

        let mut read_dir = tokio::fs::read_dir(&dir)
            .await
            .map_err(|e| Error::CacheStore(format!("Failed to read cache dir: {}", e)))?;

        let mut entries = vec![];
        while let Some(entry) = read_dir
            .next_entry()
            .await
            .map_err(|e| Error::CacheStore(format!("Failed to read entry: {}", e)))?
        {
            let path = entry.path();
            if path.extension().and_then(|ext| ext.to_str()) != Some("json") {
                continue;
            }
            let stored = Self::read_entry(&path).await?;
            entries.push(CacheEntry::from_snapshot(stored.key, &stored.response));
        }

        entries.sort_by(|a, b| a.key.cmp(&b.key));
        Ok(entries)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use url::Url;

    fn key(url: &str) -> RequestKey {
        RequestKey::get(&Url::parse(url).unwrap())
    }

    #[tokio::test]
    async fn test_memory_put_and_lookup() {
        let store = MemoryCacheStore::new();
        let k = key("https://example.com/a.css");

        store.put("static-v1", &k, &ResponseSnapshot::ok("body")).await.unwrap();

        let hit = store.lookup("static-v1", &k).await.unwrap().unwrap();
        assert_eq!(hit.body, b"body");
        assert!(store.lookup("dynamic-v1", &k).await.unwrap().is_none());
        assert_eq!(store.keys().await.unwrap(), vec!["static-v1".to_string()]);
    }

    #[tokio::test]
    async fn test_memory_quota() {
        let store = MemoryCacheStore::with_max_entries(1);
        store
            .put("dynamic-v1", &key("https://a.test/1"), &ResponseSnapshot::ok("1"))
            .await
            .unwrap();

        // Overwriting an existing key stays within quota.
        store
            .put("dynamic-v1", &key("https://a.test/1"), &ResponseSnapshot::ok("2"))
            .await
            .unwrap();

        let err = store
            .put("dynamic-v1", &key("https://a.test/2"), &ResponseSnapshot::ok("3"))
            .await
            .unwrap_err();
        assert!(matches!(err, Error::QuotaExceeded { limit: 1, .. }));
    }

    #[tokio::test]
    async fn test_memory_lookup_any() {
        let store = MemoryCacheStore::new();
        let k = key("http://localhost/offline.html");
        store.open("a-v1").await.unwrap();
        store.put("b-v1", &k, &ResponseSnapshot::ok("offline")).await.unwrap();

        let hit = store.lookup_any(&k).await.unwrap().unwrap();
        assert_eq!(hit.body, b"offline");
    }

    #[tokio::test]
    async fn test_memory_delete() {
        let store = MemoryCacheStore::new();
        store.open("old-cache-v0").await.unwrap();
        assert!(store.delete("old-cache-v0").await.unwrap());
        assert!(!store.delete("old-cache-v0").await.unwrap());
        assert!(store.keys().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_filesystem_roundtrip() {
        let dir = tempfile::tempdir().unwrap();
        let store = FilesystemCacheStore::new(dir.path());
        let k = key("https://fonts.googleapis.com/css2?family=Inter");
        let response = ResponseSnapshot::ok("@font-face {}").with_header("content-type", "text/css");

        store.put("ipscope-dynamic-v1", &k, &response).await.unwrap();

        let hit = store.lookup("ipscope-dynamic-v1", &k).await.unwrap().unwrap();
        assert_eq!(hit, response);
        assert!(store.has("ipscope-dynamic-v1").await.unwrap());

        let entries = store.entries("ipscope-dynamic-v1").await.unwrap();
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].key, k);
        assert_eq!(entries[0].size_bytes, 13);
    }

    #[tokio::test]
    async fn test_filesystem_survives_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let k = key("http://localhost:8080/");
        {
            let store = FilesystemCacheStore::new(dir.path());
            store.put("static-v1", &k, &ResponseSnapshot::ok("<html>")).await.unwrap();
        }

        let store = FilesystemCacheStore::new(dir.path());
        assert_eq!(store.keys().await.unwrap(), vec!["static-v1".to_string()]);
        assert!(store.lookup("static-v1", &k).await.unwrap().is_some());
    }

    #[tokio::test]
    async fn test_filesystem_delete_and_missing_root() {
        let dir = tempfile::tempdir().unwrap();
        let store = FilesystemCacheStore::new(dir.path().join("not-yet-created"));
        assert!(store.keys().await.unwrap().is_empty());

        store.open("old-cache-v0").await.unwrap();
        assert!(store.delete("old-cache-v0").await.unwrap());
        assert!(!store.has("old-cache-v0").await.unwrap());
    }

    #[tokio::test]
    async fn test_filesystem_rejects_unsafe_names() {
        let dir = tempfile::tempdir().unwrap();
        let store = FilesystemCacheStore::new(dir.path());
        for name in ["../escape", "a/b", "c:d", ".hidden", ""] {
            let err = store.open(name).await.unwrap_err();
            assert!(matches!(err, Error::CacheStore(_)), "accepted {:?}", name);
        }
        store.open("ipscope-static-v1.0.0").await.unwrap();
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_filesystem_concurrent_puts_of_one_key() {
        let dir = tempfile::tempdir().unwrap();
        let store = std::sync::Arc::new(FilesystemCacheStore::new(dir.path()));
        let k = key("https://fonts.googleapis.com/css2?family=Inter");
        let large = "x".repeat(20 * 1024);

        for _ in 0..20 {
            let writes = (0..8).map(|i| {
                let store = store.clone();
                let k = k.clone();
                let body = if i % 2 == 0 { large.clone() } else { "small body".to_string() };
                tokio::spawn(async move {
                    store.put("dynamic-v1", &k, &ResponseSnapshot::ok(body)).await
                })
            });
            for result in futures::future::join_all(writes).await {
                result.unwrap().unwrap();
            }

            let hit = store.lookup("dynamic-v1", &k).await.unwrap().unwrap();
            assert!(hit.body.len() == large.len() || hit.body == b"small body");
        }

        assert_eq!(store.entries("dynamic-v1").await.unwrap().len(), 1);
        let files = std::fs::read_dir(dir.path().join("dynamic-v1")).unwrap().count();
        assert_eq!(files, 1);
    }
}
