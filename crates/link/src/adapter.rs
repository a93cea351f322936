//! Per-link-layer lifecycle control and discovery signal routing.
//!
//! An adapter owns the start/stop state of one medium and forwards the
//! discovery signals the medium's scanner produces. Adapters know
//! nothing about protocols or workers; everything flows through the
//! [`DiscoverySink`] the adapter was constructed with.

use crate::neighbour::{
    LinkLayerNeighbour, BLUETOOTH_LINK_ID, WIFI_DIRECT_LINK_ID, WIFI_MANAGED_LINK_ID,
};
use async_trait::async_trait;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tracing::{debug, info};

/// Receiver of link lifecycle and discovery signals.
///
/// Implemented by the network coordinator; kept here so adapters do not
/// depend on the coordination crate.
#[async_trait]
pub trait DiscoverySink: Send + Sync {
    /// A link layer finished starting and is usable.
    async fn link_started(&self, link_layer_id: &str);
    /// A link layer stopped; its connections are going away.
    async fn link_stopped(&self, link_layer_id: &str);
    /// The scanner saw a neighbour. May fire repeatedly for the same
    /// neighbour; receivers must tolerate duplicates.
    async fn neighbour_found(&self, neighbour: LinkLayerNeighbour);
    /// The scanner lost sight of a previously seen neighbour.
    async fn neighbour_lost(&self, neighbour: LinkLayerNeighbour);
}

/// Lifecycle surface of one link layer.
#[async_trait]
pub trait LinkLayerAdapter: Send + Sync {
    /// Identifier of the medium this adapter controls.
    fn link_layer_id(&self) -> &'static str;
    /// Bring the link up. Idempotent.
    async fn link_start(&self);
    /// Take the link down. Idempotent.
    async fn link_stop(&self);
    /// Whether the medium is currently up and scanning.
    fn is_scanning(&self) -> bool;
    /// Request an immediate discovery pass from the scanner below.
    /// No-op while the link is down.
    async fn force_discovery(&self);
}

/// Adapter for the point-to-point (RFCOMM-style) medium.
pub struct BluetoothAdapter {
    sink: Arc<dyn DiscoverySink>,
    scanning: AtomicBool,
}

impl BluetoothAdapter {
    pub fn new(sink: Arc<dyn DiscoverySink>) -> Arc<Self> {
        Arc::new(Self {
            sink,
            scanning: AtomicBool::new(false),
        })
    }

    /// Entry point for the scanner below: a device came into range.
    pub async fn report_reachable(&self, mac: impl Into<String>) {
        if !self.is_scanning() {
            return;
        }
        self.sink
            .neighbour_found(LinkLayerNeighbour::Bluetooth { mac: mac.into() })
            .await;
    }

    /// Entry point for the scanner below: a device went out of range.
    pub async fn report_lost(&self, mac: impl Into<String>) {
        if !self.is_scanning() {
            return;
        }
        self.sink
            .neighbour_lost(LinkLayerNeighbour::Bluetooth { mac: mac.into() })
            .await;
    }
}

#[async_trait]
impl LinkLayerAdapter for BluetoothAdapter {
    fn link_layer_id(&self) -> &'static str {
        BLUETOOTH_LINK_ID
    }

    async fn link_start(&self) {
        if self.scanning.swap(true, Ordering::SeqCst) {
            return;
        }
        info!(link = BLUETOOTH_LINK_ID, "link layer started");
        self.sink.link_started(BLUETOOTH_LINK_ID).await;
    }

    async fn link_stop(&self) {
        if !self.scanning.swap(false, Ordering::SeqCst) {
            return;
        }
        info!(link = BLUETOOTH_LINK_ID, "link layer stopped");
        self.sink.link_stopped(BLUETOOTH_LINK_ID).await;
    }

    fn is_scanning(&self) -> bool {
        self.scanning.load(Ordering::SeqCst)
    }

    async fn force_discovery(&self) {
        if !self.is_scanning() {
            return;
        }
        // The scanner below owns the actual pass; it answers through
        // report_reachable / report_lost.
        debug!(link = BLUETOOTH_LINK_ID, "discovery pass requested");
    }
}

/// Adapter for the managed-WiFi multicast medium.
pub struct WifiManagedAdapter {
    sink: Arc<dyn DiscoverySink>,
    scanning: AtomicBool,
}

impl WifiManagedAdapter {
    pub fn new(sink: Arc<dyn DiscoverySink>) -> Arc<Self> {
        Arc::new(Self {
            sink,
            scanning: AtomicBool::new(false),
        })
    }

    /// A datagram source showed up on the group.
    pub async fn report_reachable(&self, addr: impl Into<String>) {
        if !self.is_scanning() {
            return;
        }
        self.sink
            .neighbour_found(LinkLayerNeighbour::Multicast { addr: addr.into() })
            .await;
    }

    /// A datagram source fell silent.
    pub async fn report_lost(&self, addr: impl Into<String>) {
        if !self.is_scanning() {
            return;
        }
        self.sink
            .neighbour_lost(LinkLayerNeighbour::Multicast { addr: addr.into() })
            .await;
    }
}

#[async_trait]
impl LinkLayerAdapter for WifiManagedAdapter {
    fn link_layer_id(&self) -> &'static str {
        WIFI_MANAGED_LINK_ID
    }

    async fn link_start(&self) {
        if self.scanning.swap(true, Ordering::SeqCst) {
            return;
        }
        info!(link = WIFI_MANAGED_LINK_ID, "link layer started");
        self.sink.link_started(WIFI_MANAGED_LINK_ID).await;
    }

    async fn link_stop(&self) {
        if !self.scanning.swap(false, Ordering::SeqCst) {
            return;
        }
        info!(link = WIFI_MANAGED_LINK_ID, "link layer stopped");
        self.sink.link_stopped(WIFI_MANAGED_LINK_ID).await;
    }

    fn is_scanning(&self) -> bool {
        self.scanning.load(Ordering::SeqCst)
    }

    async fn force_discovery(&self) {
        if !self.is_scanning() {
            return;
        }
        debug!(link = WIFI_MANAGED_LINK_ID, "discovery pass requested");
    }
}

/// WiFi-Direct adapter. Placeholder: the medium is declared but never
/// brought up, so no protocol ever sees events for it.
pub struct WifiDirectAdapter;

impl WifiDirectAdapter {
    pub fn new(_sink: Arc<dyn DiscoverySink>) -> Arc<Self> {
        Arc::new(Self)
    }
}

#[async_trait]
impl LinkLayerAdapter for WifiDirectAdapter {
    fn link_layer_id(&self) -> &'static str {
        WIFI_DIRECT_LINK_ID
    }

    async fn link_start(&self) {
        debug!(link = WIFI_DIRECT_LINK_ID, "link layer not implemented");
    }

    async fn link_stop(&self) {}

    fn is_scanning(&self) -> bool {
        false
    }

    async fn force_discovery(&self) {}
}
