//! Messages exchanged between the caching layer and application instances.
//!
//! Every message is a JSON object with a `type` tag and an optional `data`
//! payload, e.g. `{"type": "CACHE_IP_DATA", "data": {"ip": "203.0.113.7"}}`.

use crate::snapshot::IpSnapshot;
use crate::{Error, Result};
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Messages sent by an application instance to the caching layer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "data", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum InboundMessage {
    /// Promote a waiting worker to active immediately.
    SkipWaiting,
    /// Ask for the installed version identifier.
    GetVersion,
    /// Delete every cache partition, whatever its version.
    ClearCache,
    /// Store an opaque IP payload as a synthetic response.
    CacheIpData(Value),
}

impl InboundMessage {
    pub fn from_json(raw: &str) -> Result<Self> {
        serde_json::from_str(raw).map_err(|e| Error::InvalidMessage(e.to_string()))
    }

    pub fn kind(&self) -> &'static str {
        match self {
            InboundMessage::SkipWaiting => "SKIP_WAITING",
            InboundMessage::GetVersion => "GET_VERSION",
            InboundMessage::ClearCache => "CLEAR_CACHE",
            InboundMessage::CacheIpData(_) => "CACHE_IP_DATA",
        }
    }
}

/// Replies delivered on the requester's reply port.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Reply {
    Version {
        version: String,
    },
    CacheCleared {
        success: bool,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        error: Option<String>,
    },
}

/// Messages broadcast by the caching layer to every open instance.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "data", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum OutboundMessage {
    /// A freshly observed lookup result from the background check.
    IpUpdate(IpSnapshot),
}
