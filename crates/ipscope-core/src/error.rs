//! Error types for ipscope.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
    // Network errors
    #[error("Network error: {0}")]
    Network(String),

    #[error("Request timed out after {ms} ms: {url}")]
    Timeout { url: String, ms: u64 },

    #[error("Upstream returned HTTP {status}: {url}")]
    UpstreamStatus { status: u16, url: String },

    #[error("Offline and no cached response for {0}")]
    Offline(String),

    // Cache store errors
    #[error("Cache store error: {0}")]
    CacheStore(String),

    #[error("Cache quota exceeded for partition {partition} ({limit} entries)")]
    QuotaExceeded { partition: String, limit: usize },

    #[error("Cache partition not found: {0}")]
    PartitionNotFound(String),

    // Lifecycle errors
    #[error("Install failed for {url}: {reason}")]
    InstallFailed { url: String, reason: String },

    #[error("Invalid lifecycle transition from {from} to {to}")]
    InvalidState { from: String, to: String },

    // Protocol errors
    #[error("Invalid message: {0}")]
    InvalidMessage(String),

    #[error("Invalid IP snapshot: {0}")]
    InvalidSnapshot(String),

    #[error("Invalid URL: {0}")]
    InvalidUrl(String),

    // Infrastructure errors
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl Error {
    /// Whether this error is a network failure a strategy may recover from
    /// by falling back to the cache.
    pub fn is_network(&self) -> bool {
        matches!(
            self,
            Error::Network(_) | Error::Timeout { .. } | Error::UpstreamStatus { .. } | Error::Offline(_)
        )
    }

    /// Whether this error originated in the cache store.
    pub fn is_cache_store(&self) -> bool {
        matches!(
            self,
            Error::CacheStore(_)
                | Error::QuotaExceeded { .. }
                | Error::PartitionNotFound(_)
                | Error::Serialization(_)
                | Error::Io(_)
        )
    }
}

pub type Result<T> = std::result::Result<T, Error>;

impl From<serde_json::Error> for Error {
    fn from(err: serde_json::Error) -> Self {
        Error::Serialization(err.to_string())
    }
}

impl From<url::ParseError> for Error {
    fn from(err: url::ParseError) -> Self {
        Error::InvalidUrl(err.to_string())
    }
}
