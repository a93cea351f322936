//! Pool admission under contention, exercised through a real accept
//! loop over loopback TCP.

use crate::test_utils::{connect_with_retry, wait_until};
use driftmesh_link::{LinkTransport, TcpLinkTransport, BLUETOOTH_LINK_ID};
use driftmesh_net::{NetworkCoordinator, PoolConfig, Worker};
use driftmesh_protocols::{ClientWorkerFactory, InboundWorker, ServerWorker, COURIER_SERVICE};
use std::sync::Arc;
use std::time::Duration;

fn inbound_factory() -> ClientWorkerFactory {
    Arc::new(|conn| InboundWorker::from_connection("courier", conn) as Arc<dyn Worker>)
}

async fn start_server(
    coordinator: &Arc<NetworkCoordinator>,
    transport: &Arc<dyn LinkTransport>,
) -> Arc<ServerWorker> {
    let server = ServerWorker::new(
        "courier",
        transport.clone(),
        COURIER_SERVICE,
        coordinator.clone(),
        inbound_factory(),
    );
    assert!(coordinator.add_worker(server.clone()).await);
    wait_until(|| server.local_address().is_some()).await;
    server
}

#[tokio::test]
async fn inbound_connections_beyond_capacity_are_closed() {
    // One slot for the accept loop, one for a single client.
    let coordinator = NetworkCoordinator::new(PoolConfig {
        capacity: 2,
        high_priority_reserve: 0,
    });
    let transport: Arc<dyn LinkTransport> =
        Arc::new(TcpLinkTransport::new(BLUETOOTH_LINK_ID, "127.0.0.1:0"));
    let server = start_server(&coordinator, &transport).await;
    let address = server.local_address().unwrap();

    let first = connect_with_retry(transport.as_ref(), &address, &COURIER_SERVICE).await;
    wait_until(|| {
        coordinator
            .get_workers(BLUETOOTH_LINK_ID, "courier", true)
            .len()
            == 1
    })
    .await;

    // The second client finds no slot; the node closes it immediately.
    let second = connect_with_retry(transport.as_ref(), &address, &COURIER_SERVICE).await;
    assert!(second.recv().await.unwrap().is_none());

    // The first connection is untouched.
    assert_eq!(
        coordinator
            .get_workers(BLUETOOTH_LINK_ID, "courier", true)
            .len(),
        1
    );
    first.send(b"ping").await.unwrap();

    coordinator.shutdown().await;
}

#[tokio::test]
async fn admission_contention_closes_exactly_the_overflow() {
    // Room for the accept loop plus two clients.
    let coordinator = NetworkCoordinator::new(PoolConfig {
        capacity: 3,
        high_priority_reserve: 0,
    });
    let transport: Arc<dyn LinkTransport> =
        Arc::new(TcpLinkTransport::new(BLUETOOTH_LINK_ID, "127.0.0.1:0"));
    let server = start_server(&coordinator, &transport).await;
    let address = server.local_address().unwrap();

    let mut clients = Vec::new();
    for _ in 0..3 {
        clients.push(connect_with_retry(transport.as_ref(), &address, &COURIER_SERVICE).await);
    }

    wait_until(|| {
        coordinator
            .get_workers(BLUETOOTH_LINK_ID, "courier", true)
            .len()
            == 2
    })
    .await;

    // Exactly one client observes the close; the survivors just block.
    let mut closed = 0;
    for client in &clients {
        match tokio::time::timeout(Duration::from_millis(300), client.recv()).await {
            Ok(Ok(None)) => closed += 1,
            Ok(other) => panic!("unexpected read result: {other:?}"),
            Err(_) => {} // still open
        }
    }
    assert_eq!(closed, 1);

    coordinator.shutdown().await;
}

#[tokio::test]
async fn stopping_workers_under_load_is_synchronous() {
    let coordinator = NetworkCoordinator::new(PoolConfig::default());
    let transport: Arc<dyn LinkTransport> =
        Arc::new(TcpLinkTransport::new(BLUETOOTH_LINK_ID, "127.0.0.1:0"));
    let server = start_server(&coordinator, &transport).await;
    let address = server.local_address().unwrap();

    let mut clients = Vec::new();
    for _ in 0..5 {
        clients.push(connect_with_retry(transport.as_ref(), &address, &COURIER_SERVICE).await);
    }
    wait_until(|| {
        coordinator
            .get_workers(BLUETOOTH_LINK_ID, "courier", true)
            .len()
            == 5
    })
    .await;

    coordinator.stop_workers(BLUETOOTH_LINK_ID, "courier").await;

    // Post-condition holds at return, not eventually.
    assert!(coordinator
        .get_workers(BLUETOOTH_LINK_ID, "courier", false)
        .is_empty());
    assert_eq!(coordinator.active_workers(), 0);

    // Every client sees its connection go away.
    for client in &clients {
        assert!(client.recv().await.unwrap().is_none());
    }
}
