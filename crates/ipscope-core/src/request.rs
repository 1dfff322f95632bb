//! Outgoing requests and their cache identity.

use crate::{Error, Result};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use url::Url;

/// HTTP method of an intercepted request.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Method {
    #[default]
    Get,
    Head,
    Post,
    Put,
    Patch,
    Delete,
    Options,
}

impl Method {
    pub fn as_str(&self) -> &'static str {
        match self {
            Method::Get => "GET",
            Method::Head => "HEAD",
            Method::Post => "POST",
            Method::Put => "PUT",
            Method::Patch => "PATCH",
            Method::Delete => "DELETE",
            Method::Options => "OPTIONS",
        }
    }
}

impl fmt::Display for Method {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for Method {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_uppercase().as_str() {
            "GET" => Ok(Method::Get),
            "HEAD" => Ok(Method::Head),
            "POST" => Ok(Method::Post),
            "PUT" => Ok(Method::Put),
            "PATCH" => Ok(Method::Patch),
            "DELETE" => Ok(Method::Delete),
            "OPTIONS" => Ok(Method::Options),
            other => Err(Error::InvalidMessage(format!("Unknown method: {}", other))),
        }
    }
}

/// What the caller intends to do with the response.
///
/// Only [`Destination::Document`] changes strategy behaviour: a failed
/// full-page navigation may be answered with the offline page.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Destination {
    #[default]
    Empty,
    Document,
    Script,
    Style,
    Image,
    Font,
    Manifest,
}

/// A request issued by the application and routed through the cache layer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Request {
    pub method: Method,
    pub url: Url,
    pub destination: Destination,
    pub headers: BTreeMap<String, String>,
}

impl Request {
    /// A plain `GET` for the given URL.
    pub fn get(url: Url) -> Self {
        Self {
            method: Method::Get,
            url,
            destination: Destination::Empty,
            headers: BTreeMap::new(),
        }
    }

    /// Parse an absolute URL into a `GET` request.
    pub fn parse(url: &str) -> Result<Self> {
        Ok(Self::get(Url::parse(url)?))
    }

    /// A full-document navigation to the given URL.
    pub fn navigate(url: Url) -> Self {
        Self::get(url).with_destination(Destination::Document)
    }

    pub fn with_method(mut self, method: Method) -> Self {
        self.method = method;
        self
    }

    pub fn with_destination(mut self, destination: Destination) -> Self {
        self.destination = destination;
        self
    }

    pub fn with_header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers
            .insert(name.into().to_ascii_lowercase(), value.into());
        self
    }

    /// Whether the URL uses an http(s) scheme.
    pub fn is_http(&self) -> bool {
        matches!(self.url.scheme(), "http" | "https")
    }

    /// Whether the request has a cache identity at all.
    pub fn is_cacheable(&self) -> bool {
        self.method == Method::Get && self.is_http()
    }

    pub fn is_navigation(&self) -> bool {
        self.destination == Destination::Document
    }

    /// The identity this request is stored under.
    pub fn key(&self) -> RequestKey {
        RequestKey::new(self.method, &self.url)
    }
}

/// Cache identity of a request: method plus URL without fragment.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct RequestKey {
    pub method: Method,
    pub url: String,
}

impl RequestKey {
    pub fn new(method: Method, url: &Url) -> Self {
        let mut url = url.clone();
        url.set_fragment(None);
        Self {
            method,
            url: url.into(),
        }
    }

    /// Identity of a `GET` for the given URL.
    pub fn get(url: &Url) -> Self {
        Self::new(Method::Get, url)
    }
}

impl fmt::Display for RequestKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}", self.method, self.url)
    }
}
