//! Logging initialization for driftmesh.
//!
//! Thin wrapper around `tracing-subscriber` so every binary and test
//! harness configures output the same way. The level is taken from
//! `RUST_LOG`, defaulting to `info`.

use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

/// Initialize human-readable logging.
///
/// # Example
/// ```no_run
/// driftmesh_core::logging::init();
/// tracing::info!("node starting");
/// ```
pub fn init() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().with_target(true))
        .init();
}

/// Initialize JSON logging for log-aggregation deployments.
pub fn init_json() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().json().with_target(true).with_thread_ids(true))
        .init();
}
