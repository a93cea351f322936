//! Driftmesh Net - Connection Orchestration Core
//!
//! Coordinates neighbour discovery events from the link layers and
//! hands live connections to the application protocols:
//!
//! - **NetworkCoordinator**: registry of adapters and protocols, typed
//!   event dispatch, worker admission mediation
//! - **WorkerPool**: bounded, priority-aware execution of workers
//! - **Worker**: one unit of connection handling (a listener or a
//!   single live connection) supervised by the pool
//!
//! Every public entry point is safe under concurrent invocation; the
//! link-layer scanners, accept loops, and connection workers all call
//! in from their own tasks.

pub mod coordinator;
pub mod event;
pub mod pool;
pub mod worker;

pub use coordinator::NetworkCoordinator;
pub use event::{NetworkEvent, Protocol, ProtocolNeighbour};
pub use pool::{PoolConfig, WorkerPool};
pub use worker::{Priority, Worker, WorkerFilter, WorkerRole};
