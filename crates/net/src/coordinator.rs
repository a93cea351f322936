//! Central registry binding adapters, neighbours, protocols, and workers.

use crate::event::{NetworkEvent, Protocol};
use crate::pool::{PoolConfig, WorkerPool};
use crate::worker::{Worker, WorkerFilter};
use async_trait::async_trait;
use driftmesh_link::{DiscoverySink, LinkLayerAdapter, LinkLayerNeighbour};
use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex, RwLock};
use tracing::{debug, info};

/// The one coordination point of a node.
///
/// Constructed explicitly at process start and injected into every
/// protocol, adapter, and worker that needs it; there is no ambient
/// global instance. All entry points are safe under concurrent
/// invocation, and no internal lock is held while protocol handlers
/// run, so handlers may freely call back in.
pub struct NetworkCoordinator {
    pool: Arc<WorkerPool>,
    adapters: RwLock<HashMap<String, Arc<dyn LinkLayerAdapter>>>,
    protocols: RwLock<HashMap<String, Arc<dyn Protocol>>>,
    subscribers: RwLock<Vec<Arc<dyn Protocol>>>,
    known_neighbours: Mutex<HashSet<LinkLayerNeighbour>>,
}

impl NetworkCoordinator {
    pub fn new(pool_config: PoolConfig) -> Arc<Self> {
        Arc::new(Self {
            pool: WorkerPool::new(pool_config),
            adapters: RwLock::new(HashMap::new()),
            protocols: RwLock::new(HashMap::new()),
            subscribers: RwLock::new(Vec::new()),
            known_neighbours: Mutex::new(HashSet::new()),
        })
    }

    /// Register a link-layer adapter. Populated at startup.
    pub fn register_adapter(&self, adapter: Arc<dyn LinkLayerAdapter>) {
        let id = adapter.link_layer_id().to_string();
        self.adapters.write().unwrap().insert(id, adapter);
    }

    /// Register a protocol. Populated at startup.
    pub fn register_protocol(&self, protocol: Arc<dyn Protocol>) {
        let id = protocol.protocol_id().to_string();
        self.protocols.write().unwrap().insert(id, protocol);
    }

    /// Subscribe a protocol to events. No-op when already subscribed.
    pub fn subscribe(&self, protocol: Arc<dyn Protocol>) {
        let mut subscribers = self.subscribers.write().unwrap();
        if subscribers
            .iter()
            .any(|p| p.protocol_id() == protocol.protocol_id())
        {
            return;
        }
        debug!(protocol = protocol.protocol_id(), "protocol subscribed");
        subscribers.push(protocol);
    }

    /// Drop a protocol's subscription. No-op when not subscribed. After
    /// this returns the protocol receives no further events.
    pub fn unsubscribe(&self, protocol_id: &str) {
        self.subscribers
            .write()
            .unwrap()
            .retain(|p| p.protocol_id() != protocol_id);
    }

    fn subscriber_snapshot(&self) -> Vec<Arc<dyn Protocol>> {
        self.subscribers.read().unwrap().clone()
    }

    /// Deliver `event` to every subscribed protocol. Dispatch works on
    /// a snapshot of the subscriber list; no lock is held while a
    /// handler runs.
    pub async fn publish(&self, event: NetworkEvent) {
        for protocol in self.subscriber_snapshot() {
            match &event {
                NetworkEvent::LinkLayerStarted { link_layer_id } => {
                    protocol.on_link_started(link_layer_id).await;
                }
                NetworkEvent::LinkLayerStopped { link_layer_id } => {
                    protocol.on_link_stopped(link_layer_id).await;
                }
                NetworkEvent::NeighbourReachable { neighbour } => {
                    protocol.on_neighbour_reachable(neighbour).await;
                }
                NetworkEvent::NeighbourUnreachable { neighbour } => {
                    protocol.on_neighbour_unreachable(neighbour).await;
                }
            }
        }
    }

    /// Record a discovered neighbour and publish `NeighbourReachable`.
    ///
    /// Policy: the event is re-published on every discovery signal,
    /// known neighbour or not. Protocols must absorb duplicates anyway
    /// (their connection state machine does), and suppression would
    /// starve protocols started after the first sighting. The known set
    /// only decides the return value and the log level.
    ///
    /// Returns `true` when the neighbour was not known before.
    pub async fn new_neighbour(&self, neighbour: LinkLayerNeighbour) -> bool {
        let newly_seen = self
            .known_neighbours
            .lock()
            .unwrap()
            .insert(neighbour.clone());
        if newly_seen {
            info!(%neighbour, "new neighbour");
        } else {
            debug!(%neighbour, "neighbour re-discovered");
        }
        self.publish(NetworkEvent::NeighbourReachable { neighbour })
            .await;
        newly_seen
    }

    /// Forget a neighbour and publish `NeighbourUnreachable`.
    pub async fn forget_neighbour(&self, neighbour: LinkLayerNeighbour) {
        self.known_neighbours.lock().unwrap().remove(&neighbour);
        debug!(%neighbour, "neighbour unreachable");
        self.publish(NetworkEvent::NeighbourUnreachable { neighbour })
            .await;
    }

    /// Submit a worker for execution. Priority is resolved from the
    /// worker's role: servers and accepted inbound connections run at
    /// high priority, outgoing attempts at low.
    ///
    /// On rejection the coordinator releases the worker's resource
    /// itself (nothing stays open on the hot accept path) and returns
    /// `false`.
    pub async fn add_worker(&self, worker: Arc<dyn Worker>) -> bool {
        let priority = worker.role().priority();
        if self.pool.admit(worker.clone(), priority) {
            return true;
        }
        debug!(
            worker_id = %worker.worker_id(),
            "worker rejected, releasing its resource"
        );
        worker.cancel();
        false
    }

    /// Stop every worker of `(link_layer_id, protocol_id)`. When this
    /// returns, no such worker is running.
    pub async fn stop_workers(&self, link_layer_id: &str, protocol_id: &str) {
        self.pool
            .remove(&WorkerFilter::new(link_layer_id, protocol_id))
            .await;
    }

    /// Snapshot of the workers of `(link_layer_id, protocol_id)`.
    pub fn get_workers(
        &self,
        link_layer_id: &str,
        protocol_id: &str,
        connected_only: bool,
    ) -> Vec<Arc<dyn Worker>> {
        self.pool.snapshot(
            &WorkerFilter::new(link_layer_id, protocol_id),
            connected_only,
        )
    }

    /// Number of currently supervised workers, all protocols included.
    pub fn active_workers(&self) -> usize {
        self.pool.active()
    }

    /// Start every registered protocol, then every registered adapter.
    /// Protocols first, so the `LinkLayerStarted` events reach them.
    pub async fn start_all(&self) {
        let protocols: Vec<_> = self.protocols.read().unwrap().values().cloned().collect();
        for protocol in protocols {
            protocol.protocol_start().await;
        }
        let adapters: Vec<_> = self.adapters.read().unwrap().values().cloned().collect();
        for adapter in adapters {
            adapter.link_start().await;
        }
    }

    /// Stop adapters, protocols, and any remaining workers.
    pub async fn shutdown(&self) {
        let adapters: Vec<_> = self.adapters.read().unwrap().values().cloned().collect();
        for adapter in adapters {
            adapter.link_stop().await;
        }
        let protocols: Vec<_> = self.protocols.read().unwrap().values().cloned().collect();
        for protocol in protocols {
            protocol.protocol_stop().await;
        }
        self.pool.shutdown().await;
        info!("network coordinator shut down");
    }
}

#[async_trait]
impl DiscoverySink for NetworkCoordinator {
    async fn link_started(&self, link_layer_id: &str) {
        self.publish(NetworkEvent::LinkLayerStarted {
            link_layer_id: link_layer_id.to_string(),
        })
        .await;
    }

    async fn link_stopped(&self, link_layer_id: &str) {
        self.publish(NetworkEvent::LinkLayerStopped {
            link_layer_id: link_layer_id.to_string(),
        })
        .await;
    }

    async fn neighbour_found(&self, neighbour: LinkLayerNeighbour) {
        self.new_neighbour(neighbour).await;
    }

    async fn neighbour_lost(&self, neighbour: LinkLayerNeighbour) {
        self.forget_neighbour(neighbour).await;
    }
}
