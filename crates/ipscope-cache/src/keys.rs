//! Partition naming and storage key utilities.

use ipscope_core::RequestKey;
use sha2::{Digest, Sha256};

/// Path prefix of the synthetic responses written for IP snapshots.
pub const IP_DATA_PREFIX: &str = "/ip-data/";

/// Names of the partitions owned by one deployed version.
///
/// Every name embeds the version identifier so two deployments never share
/// a partition.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PartitionNames {
    /// Version identifier, e.g. `ipscope-v1.0.0`.
    pub version: String,
    pub static_cache: String,
    pub dynamic_cache: String,
}

impl PartitionNames {
    /// Build names from an application prefix and a version.
    ///
    /// Empty parts are skipped, so `("", "v1")` yields `v1`, `static-v1`
    /// and `dynamic-v1`.
    pub fn new(app: &str, version: &str) -> Self {
        let join = |kind: &str| {
            [app, kind, version]
                .into_iter()
                .filter(|part| !part.is_empty())
                .collect::<Vec<_>>()
                .join("-")
        };

        Self {
            version: join(""),
            static_cache: join("static"),
            dynamic_cache: join("dynamic"),
        }
    }

    /// Whether `name` belongs to this version.
    pub fn is_current(&self, name: &str) -> bool {
        name == self.static_cache || name == self.dynamic_cache
    }
}

/// Root-relative path of the synthetic response for an address.
pub fn ip_data_path(ip: &str) -> String {
    format!("{}{}", IP_DATA_PREFIX, ip)
}

/// File name an entry is stored under: a digest of its request identity.
pub fn entry_file_name(key: &RequestKey) -> String {
    let mut hasher = Sha256::new();
    hasher.update(key.method.as_str().as_bytes());
    hasher.update(b" ");
    hasher.update(key.url.as_bytes());
    let hash = hasher.finalize();
    format!("{}.json", hex::encode(&hash[..16]))
}
