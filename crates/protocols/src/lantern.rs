//! Lantern, the interoperability overlay.
//!
//! Lantern talks to third-party nodes that rendezvous on the generic
//! serial-port service identifier. Those nodes run their own listener,
//! so lantern only ever dials: it opens outgoing connections to
//! discovered point-to-point neighbours and joins the multicast group.
//! It deliberately runs no accept loop of its own.

use crate::state::ConnectionTracker;
use crate::workers::{MulticastWorker, OutgoingWorker};
use async_trait::async_trait;
use driftmesh_link::{
    LinkLayerNeighbour, LinkTransport, ServiceId, BLUETOOTH_LINK_ID, WIFI_MANAGED_LINK_ID,
};
use driftmesh_net::{NetworkCoordinator, Protocol, ProtocolNeighbour, Worker};
use std::collections::HashSet;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tracing::{debug, info, trace};

pub const LANTERN_PROTOCOL_ID: &str = "lantern";

/// The generic serial-port profile identifier third-party nodes listen
/// under.
pub const LANTERN_SERVICE: ServiceId = ServiceId {
    uuid: "00001101-0000-1000-8000-00805f9b34fb",
    name: "lantern",
};

pub struct LanternProtocol {
    coordinator: Arc<NetworkCoordinator>,
    bluetooth: Arc<dyn LinkTransport>,
    wifi: Arc<dyn LinkTransport>,
    tracker: ConnectionTracker,
    started: AtomicBool,
}

impl LanternProtocol {
    pub fn new(
        coordinator: Arc<NetworkCoordinator>,
        bluetooth: Arc<dyn LinkTransport>,
        wifi: Arc<dyn LinkTransport>,
    ) -> Arc<Self> {
        Arc::new(Self {
            coordinator,
            bluetooth,
            wifi,
            tracker: ConnectionTracker::new(),
            started: AtomicBool::new(false),
        })
    }

    async fn dial(&self, neighbour: &LinkLayerNeighbour) {
        let address = neighbour.address().to_string();
        let state = self.tracker.state_for(&address);
        let worker = OutgoingWorker::new(
            LANTERN_PROTOCOL_ID,
            neighbour.clone(),
            LANTERN_SERVICE,
            false,
            self.bluetooth.clone(),
            state.clone(),
        );
        if let Err(e) = state.begin_outgoing(&address, &worker.worker_id()) {
            trace!(%neighbour, "redundant discovery dropped: {e}");
            return;
        }
        if !self.coordinator.add_worker(worker).await {
            self.tracker.end(&address);
        }
    }
}

#[async_trait]
impl Protocol for LanternProtocol {
    fn protocol_id(&self) -> &'static str {
        LANTERN_PROTOCOL_ID
    }

    async fn protocol_start(self: Arc<Self>) {
        if self.started.swap(true, Ordering::SeqCst) {
            return;
        }
        self.coordinator.subscribe(self.clone());
        info!(protocol = LANTERN_PROTOCOL_ID, "protocol started");
    }

    async fn protocol_stop(&self) {
        if !self.started.swap(false, Ordering::SeqCst) {
            return;
        }
        self.coordinator.unsubscribe(LANTERN_PROTOCOL_ID);
        self.coordinator
            .stop_workers(BLUETOOTH_LINK_ID, LANTERN_PROTOCOL_ID)
            .await;
        self.coordinator
            .stop_workers(WIFI_MANAGED_LINK_ID, LANTERN_PROTOCOL_ID)
            .await;
        self.tracker.clear_all();
        info!(protocol = LANTERN_PROTOCOL_ID, "protocol stopped");
    }

    async fn on_link_started(&self, link_layer_id: &str) {
        if !self.started.load(Ordering::SeqCst) {
            return;
        }
        match link_layer_id {
            // No accept loop: peers listen, lantern dials.
            BLUETOOTH_LINK_ID => {}
            WIFI_MANAGED_LINK_ID => {
                let group = MulticastWorker::new(
                    LANTERN_PROTOCOL_ID,
                    self.wifi.clone(),
                    LANTERN_SERVICE,
                );
                self.coordinator.add_worker(group).await;
            }
            other => debug!(link = other, "link not used by lantern"),
        }
    }

    async fn on_link_stopped(&self, link_layer_id: &str) {
        if !self.started.load(Ordering::SeqCst) {
            return;
        }
        self.coordinator
            .stop_workers(link_layer_id, LANTERN_PROTOCOL_ID)
            .await;
    }

    async fn on_neighbour_reachable(&self, neighbour: &LinkLayerNeighbour) {
        if !self.started.load(Ordering::SeqCst) {
            return;
        }
        if !neighbour.is_point_to_point() {
            return;
        }
        self.dial(neighbour).await;
    }

    async fn on_neighbour_unreachable(&self, neighbour: &LinkLayerNeighbour) {
        trace!(%neighbour, "unreachable signal ignored");
    }

    async fn neighbour_list(&self) -> Vec<ProtocolNeighbour> {
        let mut seen = HashSet::new();
        let mut list = Vec::new();
        for link in [BLUETOOTH_LINK_ID, WIFI_MANAGED_LINK_ID] {
            for worker in self
                .coordinator
                .get_workers(link, LANTERN_PROTOCOL_ID, true)
            {
                for neighbour in worker.remote_neighbours() {
                    if seen.insert(neighbour.clone()) {
                        list.push(ProtocolNeighbour {
                            protocol_id: LANTERN_PROTOCOL_ID.to_string(),
                            neighbour,
                        });
                    }
                }
            }
        }
        list
    }
}
