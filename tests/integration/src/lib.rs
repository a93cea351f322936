//! Integration tests for the driftmesh orchestration core.
//!
//! These tests exercise whole-node behavior over the loopback
//! transport:
//! - discovery races collapsing to a single outgoing connection
//! - pool admission under contention and the rejection path
//! - full node lifecycle: start, connect both ways, stop, restart

pub mod test_utils;

#[cfg(test)]
mod discovery_race_tests;

#[cfg(test)]
mod pool_admission_tests;

#[cfg(test)]
mod node_lifecycle_tests;
