//! Driftmesh Protocols - Application Overlays
//!
//! The two overlay protocols a driftmesh node runs, plus the pieces
//! they are built from:
//!
//! - **Courier**: the native store-and-forward overlay. Listens for
//!   inbound point-to-point connections, dials discovered neighbours,
//!   and joins the shared multicast group.
//! - **Lantern**: the interop overlay. Dials out on the point-to-point
//!   link and joins the multicast group, but never listens.
//! - **ConnectionTracker / ConnectionState**: the per-neighbour guard
//!   that keeps concurrent discovery events from opening duplicate
//!   outgoing connections.
//! - Worker implementations: accept-loop server, outgoing dialer,
//!   accepted inbound connection, shared multicast group worker.

pub mod courier;
pub mod lantern;
pub mod state;
pub mod workers;

pub use courier::{CourierProtocol, COURIER_PROTOCOL_ID, COURIER_SERVICE};
pub use lantern::{LanternProtocol, LANTERN_PROTOCOL_ID, LANTERN_SERVICE};
pub use state::{ConnectionState, ConnectionTracker, StateError};
pub use workers::{
    ClientWorkerFactory, InboundWorker, MulticastWorker, OutgoingWorker, ServerWorker,
};
