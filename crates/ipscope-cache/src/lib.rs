//! Offline caching layer for ipscope.
//!
//! Requests are classified by URL shape and resolved with one of three
//! strategies against versioned cache partitions. A [`Registration`] hosts
//! the active and waiting [`CacheWorker`]s and moves versions through
//! install and activation; the [`ReconcileService`] pushes periodic IP
//! updates to connected clients.

pub mod bridge;
pub mod classify;
pub mod config;
pub mod keys;
pub mod lifecycle;
pub mod reconcile;
pub mod registration;
pub mod store;
pub mod strategy;
pub mod worker;

#[cfg(test)]
mod testing;

pub use bridge::{ClientConnection, ClientRegistry, ClientSession};
pub use classify::{Classifier, RequestClass};
pub use config::{InstallPolicy, WorkerConfig};
pub use keys::{PartitionNames, ip_data_path};
pub use lifecycle::{ActivationReport, InstallReport, LifecycleController, WorkerState};
pub use reconcile::{DEFAULT_RECONCILE_INTERVAL, ReconcileService};
pub use registration::Registration;
pub use store::{FilesystemCacheStore, MemoryCacheStore};
pub use strategy::{Strategy, StrategyEngine};
pub use worker::CacheWorker;
