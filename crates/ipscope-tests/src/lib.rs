//! End-to-end test infrastructure for ipscope.
//!
//! Runs the caching layer against mock HTTP servers standing in for the
//! application origin and the lookup API, with partitions on disk.
//!
//! # Usage
//!
//! ```ignore
//! use ipscope_tests::TestContext;
//!
//! #[tokio::test]
//! async fn test_something() {
//!     let ctx = TestContext::new().await;
//!     // Use ctx.origin, ctx.registration, ctx.store, etc.
//! }
//! ```

pub mod context;
pub mod fixtures;
pub mod helpers;

pub use context::TestContext;
pub use fixtures::*;
pub use helpers::*;

/// Initialize test logging (call once per test binary).
pub fn init_test_logging() {
    use tracing_subscriber::{EnvFilter, fmt};

    let _ = fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("warn,ipscope_cache=debug")),
        )
        .with_test_writer()
        .try_init();
}
