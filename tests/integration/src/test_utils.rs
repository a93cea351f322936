//! Test fixtures: an in-process node wired over the loopback transport.

use driftmesh_link::{
    BluetoothAdapter, DiscoverySink, LinkConnection, LinkTransport, ServiceId, TcpLinkTransport,
    WifiManagedAdapter, BLUETOOTH_LINK_ID, WIFI_MANAGED_LINK_ID,
};
use driftmesh_net::{NetworkCoordinator, PoolConfig};
use driftmesh_protocols::{CourierProtocol, LanternProtocol};
use std::sync::Arc;
use std::time::Duration;

/// One node assembled the way the daemon assembles it.
///
/// The point-to-point listen address is allocated up front so other
/// test nodes know where to dial; it doubles as this node's neighbour
/// address.
pub struct TestNode {
    pub coordinator: Arc<NetworkCoordinator>,
    pub bluetooth: Arc<dyn LinkTransport>,
    pub wifi: Arc<dyn LinkTransport>,
    pub bluetooth_address: String,
    pub bluetooth_adapter: Arc<BluetoothAdapter>,
    pub wifi_adapter: Arc<WifiManagedAdapter>,
    pub courier: Arc<CourierProtocol>,
    pub lantern: Arc<LanternProtocol>,
}

impl TestNode {
    pub fn new() -> Self {
        Self::with_pool(PoolConfig::default())
    }

    pub fn with_pool(pool: PoolConfig) -> Self {
        let bluetooth_address = free_loopback_address();
        let coordinator = NetworkCoordinator::new(pool);
        let bluetooth: Arc<dyn LinkTransport> = Arc::new(TcpLinkTransport::new(
            BLUETOOTH_LINK_ID,
            bluetooth_address.clone(),
        ));
        let wifi: Arc<dyn LinkTransport> = Arc::new(
            TcpLinkTransport::new(WIFI_MANAGED_LINK_ID, "127.0.0.1:0")
                .with_group("127.0.0.1:0", "127.0.0.1:9"),
        );

        let courier = CourierProtocol::new(coordinator.clone(), bluetooth.clone(), wifi.clone());
        let lantern = LanternProtocol::new(coordinator.clone(), bluetooth.clone(), wifi.clone());
        coordinator.register_protocol(courier.clone());
        coordinator.register_protocol(lantern.clone());

        let sink: Arc<dyn DiscoverySink> = coordinator.clone();
        let bluetooth_adapter = BluetoothAdapter::new(sink.clone());
        let wifi_adapter = WifiManagedAdapter::new(sink);
        coordinator.register_adapter(bluetooth_adapter.clone());
        coordinator.register_adapter(wifi_adapter.clone());

        Self {
            coordinator,
            bluetooth,
            wifi,
            bluetooth_address,
            bluetooth_adapter,
            wifi_adapter,
            courier,
            lantern,
        }
    }
}

/// Reserve a free loopback port and release it for the node to bind.
pub fn free_loopback_address() -> String {
    let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
    listener.local_addr().unwrap().to_string()
}

/// Dial `address` with retries; the accept loop may still be binding.
pub async fn connect_with_retry(
    transport: &dyn LinkTransport,
    address: &str,
    service: &ServiceId,
) -> Box<dyn LinkConnection> {
    for _ in 0..200 {
        if let Ok(conn) = transport.connect(address, service, false).await {
            return conn;
        }
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
    panic!("nothing accepted a connection on {address}");
}

/// Poll `check` until it yields a value, panicking after ~1s.
pub async fn wait_for<T>(mut check: impl FnMut() -> Option<T>) -> T {
    for _ in 0..200 {
        if let Some(value) = check() {
            return value;
        }
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
    panic!("condition not reached in time");
}

/// Poll `check` until it returns true, panicking after ~1s.
pub async fn wait_until(mut check: impl FnMut() -> bool) {
    wait_for(|| check().then_some(())).await
}
