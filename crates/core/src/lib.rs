//! Driftmesh Core - Shared Infrastructure
//!
//! Configuration loading and logging initialization shared by every
//! driftmesh crate and by the node binary.

pub mod config;
pub mod logging;

pub use config::{Config, LinkSettings, NodeSettings, PoolSettings};
