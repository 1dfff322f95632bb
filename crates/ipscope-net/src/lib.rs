//! HTTP adapters for ipscope.
//!
//! [`HttpFetcher`] is the network behind the caching layer and
//! [`IpInfoClient`] talks to the upstream address lookup API.

pub mod config;
pub mod fetcher;
pub mod ipinfo;

pub use config::LookupConfig;
pub use fetcher::HttpFetcher;
pub use ipinfo::{IpInfoClient, snapshot_from_response};
