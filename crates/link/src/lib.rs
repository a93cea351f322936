//! Driftmesh Link Layer - Transport Abstractions
//!
//! Models the media a driftmesh node can reach neighbours over. Each
//! link layer is an independent transport (short-range point-to-point
//! pairing, local-network multicast) exposing the same small surface:
//! lifecycle control, neighbour discovery signals, and connect /
//! listen / group primitives.
//!
//! The physical radio stacks themselves live below this crate; the
//! [`transport::LinkTransport`] trait is the boundary, and
//! [`transport::TcpLinkTransport`] provides a TCP/UDP loopback
//! implementation used for local operation and tests.

pub mod adapter;
pub mod error;
pub mod neighbour;
pub mod transport;

pub use adapter::{
    BluetoothAdapter, DiscoverySink, LinkLayerAdapter, WifiDirectAdapter, WifiManagedAdapter,
};
pub use error::{LinkError, LinkResult};
pub use neighbour::{
    LinkLayerNeighbour, BLUETOOTH_LINK_ID, WIFI_DIRECT_LINK_ID, WIFI_MANAGED_LINK_ID,
};
pub use transport::{
    GroupChannel, LinkConnection, LinkListener, LinkTransport, ServiceId, TcpLinkTransport,
};
