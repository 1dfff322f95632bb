//! IP lookup snapshots.

use crate::{Error, Result};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Result of a public address lookup.
///
/// Only `ip` is interpreted. Any field the upstream adds is preserved in
/// `extra` so a snapshot survives a store/load cycle unchanged.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IpSnapshot {
    pub ip: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub hostname: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub org: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub city: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub region: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub country: Option<String>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl IpSnapshot {
    pub fn new(ip: impl Into<String>) -> Self {
        Self {
            ip: ip.into(),
            hostname: None,
            org: None,
            city: None,
            region: None,
            country: None,
            extra: Map::new(),
        }
    }

    /// Parse an upstream JSON document, rejecting it when `ip` is missing.
    pub fn from_value(value: Value) -> Result<Self> {
        let snapshot: Self = serde_json::from_value(value)
            .map_err(|e| Error::InvalidSnapshot(e.to_string()))?;
        snapshot.validate()?;
        Ok(snapshot)
    }

    pub fn validate(&self) -> Result<()> {
        if self.ip.trim().is_empty() {
            return Err(Error::InvalidSnapshot("missing ip".to_string()));
        }
        Ok(())
    }

    /// `city, region, country`, skipping empty parts.
    pub fn location(&self) -> Option<String> {
        let parts: Vec<&str> = [&self.city, &self.region, &self.country]
            .into_iter()
            .filter_map(|p| p.as_deref())
            .filter(|p| !p.is_empty())
            .collect();
        if parts.is_empty() {
            None
        } else {
            Some(parts.join(", "))
        }
    }
}
