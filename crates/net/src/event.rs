//! Typed network events and the protocol observer interface.
//!
//! Protocols subscribe to the coordinator on start and unsubscribe on
//! stop; dispatch is a plain method call per event kind rather than a
//! reflective bus, so the compiler checks every handler exists.

use async_trait::async_trait;
use driftmesh_link::LinkLayerNeighbour;
use std::sync::Arc;

/// Events published by the coordinator to subscribed protocols.
#[derive(Debug, Clone)]
pub enum NetworkEvent {
    /// A link layer finished starting.
    LinkLayerStarted {
        /// Identifier of the link layer.
        link_layer_id: String,
    },
    /// A link layer stopped.
    LinkLayerStopped {
        /// Identifier of the link layer.
        link_layer_id: String,
    },
    /// A neighbour is reachable. Fired on every discovery signal,
    /// including re-discoveries of known neighbours.
    NeighbourReachable {
        /// The discovered neighbour.
        neighbour: LinkLayerNeighbour,
    },
    /// Discovery lost sight of a neighbour. Advisory only: discovery is
    /// noisy and an established connection may well outlive it.
    NeighbourUnreachable {
        /// The lost neighbour.
        neighbour: LinkLayerNeighbour,
    },
}

/// A neighbour as seen by one protocol, for consumption above this core.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProtocolNeighbour {
    /// Protocol that can talk to this neighbour.
    pub protocol_id: String,
    /// The underlying link-layer neighbour.
    pub neighbour: LinkLayerNeighbour,
}

/// An application-level overlay reacting to link and neighbour events
/// by creating workers.
///
/// Lifecycle: `protocol_start` subscribes to the coordinator,
/// `protocol_stop` unsubscribes, stops the protocol's workers, and
/// clears its connection state. Both are idempotent. Event handlers are
/// no-ops unless the protocol is started, and none of them may let a
/// failure escape: an uncaught error would kill event delivery for the
/// whole protocol.
#[async_trait]
pub trait Protocol: Send + Sync {
    /// Stable identifier of this protocol.
    fn protocol_id(&self) -> &'static str;

    /// Enter the started state and subscribe to events.
    async fn protocol_start(self: Arc<Self>);

    /// Leave the started state: unsubscribe, stop workers, clear state.
    async fn protocol_stop(&self);

    /// A link layer this protocol may use became available.
    async fn on_link_started(&self, link_layer_id: &str);

    /// A link layer went away.
    async fn on_link_stopped(&self, link_layer_id: &str);

    /// A neighbour was discovered (possibly again).
    async fn on_neighbour_reachable(&self, neighbour: &LinkLayerNeighbour);

    /// Discovery lost a neighbour.
    async fn on_neighbour_unreachable(&self, neighbour: &LinkLayerNeighbour);

    /// Neighbours currently serviced by this protocol's workers.
    async fn neighbour_list(&self) -> Vec<ProtocolNeighbour>;
}
