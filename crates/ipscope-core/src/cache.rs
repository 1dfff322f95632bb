//! Cached response snapshots.

use crate::request::RequestKey;
use crate::{Error, Result};
use chrono::{DateTime, Duration, Utc};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// A stored copy of a response: status, headers and body.
///
/// Header names are kept lower-cased.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResponseSnapshot {
    pub status: u16,
    #[serde(default)]
    pub status_text: String,
    #[serde(default)]
    pub headers: BTreeMap<String, String>,
    #[serde(with = "body_base64")]
    pub body: Vec<u8>,
    /// Final URL the response was served from, if known.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
    /// When the snapshot was written to a cache partition.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub stored_at: Option<DateTime<Utc>>,
}

impl ResponseSnapshot {
    pub fn new(status: u16, body: impl Into<Vec<u8>>) -> Self {
        Self {
            status,
            status_text: default_status_text(status).to_string(),
            headers: BTreeMap::new(),
            body: body.into(),
            url: None,
            stored_at: None,
        }
    }

    /// A `200 OK` response.
    pub fn ok(body: impl Into<Vec<u8>>) -> Self {
        Self::new(200, body)
    }

    /// A `200 OK` JSON response.
    pub fn json<T: Serialize>(value: &T) -> Result<Self> {
        let body = serde_json::to_vec(value)?;
        Ok(Self::ok(body).with_header("content-type", "application/json"))
    }

    pub fn with_header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers
            .insert(name.into().to_ascii_lowercase(), value.into());
        self
    }

    pub fn with_url(mut self, url: impl Into<String>) -> Self {
        self.url = Some(url.into());
        self
    }

    /// Copy of this snapshot stamped with its storage time.
    pub fn stamped(&self, now: DateTime<Utc>) -> Self {
        let mut copy = self.clone();
        copy.stored_at = Some(now);
        copy
    }

    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .get(&name.to_ascii_lowercase())
            .map(String::as_str)
    }

    pub fn content_type(&self) -> Option<&str> {
        self.header("content-type")
    }

    /// Only `200` responses are ever written to a cache partition.
    pub fn is_cacheable(&self) -> bool {
        self.status == 200
    }

    pub fn text(&self) -> Result<String> {
        String::from_utf8(self.body.clone())
            .map_err(|e| Error::Serialization(format!("Response body is not UTF-8: {}", e)))
    }

    pub fn json_body<T: DeserializeOwned>(&self) -> Result<T> {
        Ok(serde_json::from_slice(&self.body)?)
    }

    /// Freshness lifetime from `Cache-Control: max-age`.
    pub fn max_age(&self) -> Option<Duration> {
        self.header("cache-control")?
            .split(',')
            .map(str::trim)
            .find_map(|directive| directive.strip_prefix("max-age="))
            .and_then(|secs| secs.trim().parse::<i64>().ok())
            .map(Duration::seconds)
    }

    /// Whether the snapshot is still within its freshness lifetime.
    ///
    /// Snapshots without a storage time or `max-age` are never fresh.
    pub fn is_fresh(&self, now: DateTime<Utc>) -> bool {
        match (self.stored_at, self.max_age()) {
            (Some(stored_at), Some(max_age)) => now < stored_at + max_age,
            _ => false,
        }
    }
}

fn default_status_text(status: u16) -> &'static str {
    match status {
        200 => "OK",
        204 => "No Content",
        301 => "Moved Permanently",
        302 => "Found",
        304 => "Not Modified",
        400 => "Bad Request",
        401 => "Unauthorized",
        403 => "Forbidden",
        404 => "Not Found",
        429 => "Too Many Requests",
        500 => "Internal Server Error",
        502 => "Bad Gateway",
        503 => "Service Unavailable",
        _ => "",
    }
}

/// Summary of a stored entry, used for listings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CacheEntry {
    pub key: RequestKey,
    pub status: u16,
    pub size_bytes: u64,
    pub stored_at: Option<DateTime<Utc>>,
}

impl CacheEntry {
    pub fn from_snapshot(key: RequestKey, snapshot: &ResponseSnapshot) -> Self {
        Self {
            key,
            status: snapshot.status,
            size_bytes: snapshot.body.len() as u64,
            stored_at: snapshot.stored_at,
        }
    }
}

mod body_base64 {
    use base64::{Engine, engine::general_purpose::STANDARD};
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(body: &[u8], serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&STANDARD.encode(body))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Vec<u8>, D::Error> {
        let encoded = String::deserialize(deserializer)?;
        STANDARD
            .decode(encoded.as_bytes())
            .map_err(serde::de::Error::custom)
    }
}
