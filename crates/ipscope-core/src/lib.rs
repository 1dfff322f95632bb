//! ipscope core
//!
//! Domain types, port traits and error handling for the ipscope offline
//! caching layer. This crate has minimal dependencies and defines the
//! shared vocabulary used by the cache engine, the network adapters and
//! the command-line client.

pub mod cache;
pub mod error;
pub mod ids;
pub mod messages;
pub mod ports;
pub mod request;
pub mod snapshot;

pub use cache::{CacheEntry, ResponseSnapshot};
pub use error::{Error, Result};
pub use ids::ClientId;
pub use messages::{InboundMessage, OutboundMessage, Reply};
pub use request::{Destination, Method, Request, RequestKey};
pub use snapshot::IpSnapshot;
