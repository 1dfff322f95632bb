//! Request classification.
//!
//! Rules are evaluated in a fixed order and the first match wins:
//!
//! 1. **api**: the URL contains a network-only prefix, its host is a
//!    configured API host, or its path has an `api` segment.
//! 2. **static**: the path is a static-manifest entry on the origin, or ends
//!    in a static-asset extension (any host).
//! 3. **dynamic**: the URL is a dynamic-manifest entry or its host serves
//!    web fonts.
//! 4. anything else is **other**, which is routed like static.
//!
//! The api-before-static order is a policy choice: a stylesheet served from
//! the lookup API host is still fetched network-first.

use crate::config::WorkerConfig;
use crate::strategy::Strategy;
use serde::Serialize;
use std::collections::HashSet;
use tracing::warn;
use url::Url;

/// Extensions treated as static assets regardless of host.
pub const STATIC_EXTENSIONS: &[&str] = &[
    "css", "js", "png", "jpg", "jpeg", "gif", "webp", "svg", "ico", "woff", "woff2", "ttf", "otf",
    "eot",
];

/// Path segment conventionally used for API calls.
const API_SEGMENT: &str = "api";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum RequestClass {
    Api,
    Static,
    Dynamic,
    Other,
}

impl RequestClass {
    /// Strategy used to resolve requests of this class.
    pub fn strategy(&self) -> Strategy {
        match self {
            RequestClass::Api => Strategy::NetworkFirst,
            RequestClass::Dynamic => Strategy::StaleWhileRevalidate,
            RequestClass::Static | RequestClass::Other => Strategy::CacheFirst,
        }
    }
}

/// Classifies request URLs. Pure and deterministic once built.
#[derive(Debug, Clone)]
pub struct Classifier {
    origin: Option<Url>,
    static_paths: HashSet<String>,
    dynamic_urls: HashSet<String>,
    network_only: Vec<String>,
    api_hosts: Vec<String>,
    font_hosts: Vec<String>,
}

impl Classifier {
    pub fn from_config(config: &WorkerConfig) -> Self {
        let dynamic_urls = config
            .dynamic_files
            .iter()
            .filter_map(|raw| match Url::parse(raw) {
                Ok(url) => Some(normalize(&url)),
                Err(e) => {
                    warn!(url = %raw, error = %e, "Ignoring unparseable dynamic manifest entry");
                    None
                }
            })
            .collect();

        Self {
            origin: config.origin_url().ok(),
            static_paths: config.static_files.iter().cloned().collect(),
            dynamic_urls,
            network_only: config.network_only.clone(),
            api_hosts: lowercase_all(&config.api_hosts),
            font_hosts: lowercase_all(&config.font_hosts),
        }
    }

    /// Classify a raw URL. Unparseable input is [`RequestClass::Other`].
    pub fn classify(&self, raw: &str) -> RequestClass {
        match Url::parse(raw) {
            Ok(url) => self.classify_url(&url),
            Err(_) => RequestClass::Other,
        }
    }

    pub fn classify_url(&self, url: &Url) -> RequestClass {
        if self.is_api(url) {
            RequestClass::Api
        } else if self.is_static(url) {
            RequestClass::Static
        } else if self.is_dynamic(url) {
            RequestClass::Dynamic
        } else {
            RequestClass::Other
        }
    }

    fn is_api(&self, url: &Url) -> bool {
        let raw = url.as_str();
        if self
            .network_only
            .iter()
            .any(|prefix| !prefix.is_empty() && raw.contains(prefix.as_str()))
        {
            return true;
        }
        if host_matches(url, &self.api_hosts) {
            return true;
        }
        url.path_segments()
            .is_some_and(|mut segments| segments.any(|s| s.eq_ignore_ascii_case(API_SEGMENT)))
    }

    fn is_static(&self, url: &Url) -> bool {
        let same_origin = self
            .origin
            .as_ref()
            .is_some_and(|origin| origin.origin() == url.origin());
        if same_origin && self.static_paths.contains(url.path()) {
            return true;
        }

        let last_segment = url
            .path_segments()
            .and_then(|mut segments| segments.next_back())
            .unwrap_or_default();
        match last_segment.rsplit_once('.') {
            Some((_, ext)) => STATIC_EXTENSIONS
                .iter()
                .any(|known| known.eq_ignore_ascii_case(ext)),
            None => false,
        }
    }

    fn is_dynamic(&self, url: &Url) -> bool {
        self.dynamic_urls.contains(&normalize(url)) || host_matches(url, &self.font_hosts)
    }
}

fn normalize(url: &Url) -> String {
    let mut url = url.clone();
    url.set_fragment(None);
    url.into()
}

fn lowercase_all(hosts: &[String]) -> Vec<String> {
    hosts.iter().map(|h| h.to_ascii_lowercase()).collect()
}

/// Exact host match or a subdomain of a listed host.
fn host_matches(url: &Url, hosts: &[String]) -> bool {
    let Some(host) = url.host_str() else {
        return false;
    };
    let host = host.to_ascii_lowercase();
    hosts
        .iter()
        .any(|known| host == *known || host.ends_with(&format!(".{}", known)))
}
