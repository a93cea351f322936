//! Discovered remote endpoints, tagged by the link layer that found them.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Identifier of the point-to-point (RFCOMM-style) link layer.
pub const BLUETOOTH_LINK_ID: &str = "bluetooth";
/// Identifier of the broadcast-style (managed WiFi multicast) link layer.
pub const WIFI_MANAGED_LINK_ID: &str = "wifi-managed";
/// Identifier of the WiFi-Direct link layer (adapter is a stub).
pub const WIFI_DIRECT_LINK_ID: &str = "wifi-direct";

/// A neighbour discovered on some link layer.
///
/// Identity is the (link layer, address) pair; a device reachable over
/// two media shows up as two distinct neighbours. Immutable once
/// discovered, discarded when no protocol references it any more.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum LinkLayerNeighbour {
    /// Point-to-point neighbour, keyed by its hardware address.
    Bluetooth {
        /// Device hardware address.
        mac: String,
    },
    /// Broadcast-style neighbour seen as a datagram source on the
    /// multicast group.
    Multicast {
        /// Source socket address of the datagram.
        addr: String,
    },
}

impl LinkLayerNeighbour {
    /// Link layer this neighbour was discovered on.
    pub fn link_layer_id(&self) -> &'static str {
        match self {
            LinkLayerNeighbour::Bluetooth { .. } => BLUETOOTH_LINK_ID,
            LinkLayerNeighbour::Multicast { .. } => WIFI_MANAGED_LINK_ID,
        }
    }

    /// Transport-specific address string.
    pub fn address(&self) -> &str {
        match self {
            LinkLayerNeighbour::Bluetooth { mac } => mac,
            LinkLayerNeighbour::Multicast { addr } => addr,
        }
    }

    /// Whether this neighbour needs a dedicated outgoing connection.
    ///
    /// Broadcast-style neighbours are all served by one shared group
    /// worker, so only point-to-point neighbours answer true.
    pub fn is_point_to_point(&self) -> bool {
        matches!(self, LinkLayerNeighbour::Bluetooth { .. })
    }
}

impl fmt::Display for LinkLayerNeighbour {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.link_layer_id(), self.address())
    }
}
