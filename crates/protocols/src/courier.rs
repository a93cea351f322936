//! Courier, the native store-and-forward overlay.
//!
//! Courier runs on both link layers: on the point-to-point link it
//! listens for inbound connections under [`COURIER_SERVICE`] and dials
//! every discovered neighbour; on the multicast link it joins the
//! shared group through a single worker.

use crate::state::ConnectionTracker;
use crate::workers::{ClientWorkerFactory, InboundWorker, MulticastWorker, OutgoingWorker, ServerWorker};
use async_trait::async_trait;
use driftmesh_link::{
    LinkLayerNeighbour, LinkTransport, ServiceId, BLUETOOTH_LINK_ID, WIFI_MANAGED_LINK_ID,
};
use driftmesh_net::{NetworkCoordinator, Protocol, ProtocolNeighbour, Worker};
use std::collections::HashSet;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tracing::{debug, info, trace};

pub const COURIER_PROTOCOL_ID: &str = "courier";

/// Well-known service identifier peers rendezvous on.
pub const COURIER_SERVICE: ServiceId = ServiceId {
    uuid: "0ce95e02-60a9-4a3e-8a5c-1b6fd25ba4f0",
    name: "driftmesh-courier",
};

pub struct CourierProtocol {
    coordinator: Arc<NetworkCoordinator>,
    bluetooth: Arc<dyn LinkTransport>,
    wifi: Arc<dyn LinkTransport>,
    tracker: ConnectionTracker,
    started: AtomicBool,
}

impl CourierProtocol {
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

    fn client_factory() -> ClientWorkerFactory {
        Arc::new(|conn| InboundWorker::from_connection(COURIER_PROTOCOL_ID, conn) as Arc<dyn Worker>)
    }

    async fn dial(&self, neighbour: &LinkLayerNeighbour) {
        let address = neighbour.address().to_string();
        let state = self.tracker.state_for(&address);
        let worker = OutgoingWorker::new(
            COURIER_PROTOCOL_ID,
            neighbour.clone(),
            COURIER_SERVICE,
            true,
            self.bluetooth.clone(),
            state.clone(),
        );
        if let Err(e) = state.begin_outgoing(&address, &worker.worker_id()) {
            trace!(%neighbour, "redundant discovery dropped: {e}");
            return;
        }
        if !self.coordinator.add_worker(worker).await {
            // Admission failed, so the run loop will never reset it.
            self.tracker.end(&address);
        }
    }
}

#[async_trait]
impl Protocol for CourierProtocol {
    fn protocol_id(&self) -> &'static str {
        COURIER_PROTOCOL_ID
    }

    async fn protocol_start(self: Arc<Self>) {
        if self.started.swap(true, Ordering::SeqCst) {
            return;
        }
        self.coordinator.subscribe(self.clone());
        info!(protocol = COURIER_PROTOCOL_ID, "protocol started");
    }

    async fn protocol_stop(&self) {
        if !self.started.swap(false, Ordering::SeqCst) {
            return;
        }
        self.coordinator.unsubscribe(COURIER_PROTOCOL_ID);
        self.coordinator
            .stop_workers(BLUETOOTH_LINK_ID, COURIER_PROTOCOL_ID)
            .await;
        self.coordinator
            .stop_workers(WIFI_MANAGED_LINK_ID, COURIER_PROTOCOL_ID)
            .await;
        self.tracker.clear_all();
        info!(protocol = COURIER_PROTOCOL_ID, "protocol stopped");
    }

    async fn on_link_started(&self, link_layer_id: &str) {
        if !self.started.load(Ordering::SeqCst) {
            return;
        }
        match link_layer_id {
            BLUETOOTH_LINK_ID => {
                let server = ServerWorker::new(
                    COURIER_PROTOCOL_ID,
                    self.bluetooth.clone(),
                    COURIER_SERVICE,
                    self.coordinator.clone(),
                    Self::client_factory(),
                );
                self.coordinator.add_worker(server).await;
            }
            WIFI_MANAGED_LINK_ID => {
                let group = MulticastWorker::new(
                    COURIER_PROTOCOL_ID,
                    self.wifi.clone(),
                    COURIER_SERVICE,
                );
                self.coordinator.add_worker(group).await;
            }
            other => debug!(link = other, "link not used by courier"),
        }
    }

    async fn on_link_stopped(&self, link_layer_id: &str) {
        if !self.started.load(Ordering::SeqCst) {
            return;
        }
        self.coordinator
            .stop_workers(link_layer_id, COURIER_PROTOCOL_ID)
            .await;
    }

    async fn on_neighbour_reachable(&self, neighbour: &LinkLayerNeighbour) {
        if !self.started.load(Ordering::SeqCst) {
            return;
        }
        // Group neighbours are already served by the shared worker.
        if !neighbour.is_point_to_point() {
            return;
        }
        self.dial(neighbour).await;
    }

    async fn on_neighbour_unreachable(&self, neighbour: &LinkLayerNeighbour) {
        // Discovery is noisy; an established connection stays up until
        // it actually breaks.
        // TODO: close connections with no frame activity once the pump
        // tracks last-seen timestamps.
        trace!(%neighbour, "unreachable signal ignored");
    }

    async fn neighbour_list(&self) -> Vec<ProtocolNeighbour> {
        let mut seen = HashSet::new();
        let mut list = Vec::new();
        for link in [BLUETOOTH_LINK_ID, WIFI_MANAGED_LINK_ID] {
            for worker in self
                .coordinator
                .get_workers(link, COURIER_PROTOCOL_ID, true)
            {
                for neighbour in worker.remote_neighbours() {
                    if seen.insert(neighbour.clone()) {
                        list.push(ProtocolNeighbour {
                            protocol_id: COURIER_PROTOCOL_ID.to_string(),
                            neighbour,
                        });
                    }
                }
            }
        }
        list
    }
}
