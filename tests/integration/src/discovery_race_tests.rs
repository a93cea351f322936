//! Discovery signals are noisy and concurrent; the node must collapse
//! them into at most one outgoing connection per neighbour.

use crate::test_utils::{wait_until, TestNode};
use driftmesh_link::{
    DiscoverySink, LinkLayerNeighbour, LinkTransport, TcpLinkTransport, BLUETOOTH_LINK_ID,
};
use driftmesh_net::Protocol;
use driftmesh_protocols::{COURIER_PROTOCOL_ID, COURIER_SERVICE};

fn peer_transport() -> TcpLinkTransport {
    TcpLinkTransport::new(BLUETOOTH_LINK_ID, "127.0.0.1:0")
}

#[tokio::test]
async fn concurrent_discovery_yields_one_outgoing_worker() {
    let node = TestNode::new();
    node.courier.clone().protocol_start().await;

    // A fake remote node that accepts whatever dials it.
    let peer = peer_transport();
    let listener = peer.listen(&COURIER_SERVICE).await.unwrap();
    let neighbour = LinkLayerNeighbour::Bluetooth {
        mac: listener.local_address(),
    };

    let mut tasks = Vec::new();
    for _ in 0..8 {
        let coordinator = node.coordinator.clone();
        let neighbour = neighbour.clone();
        tasks.push(tokio::spawn(async move {
            coordinator.neighbour_found(neighbour).await;
        }));
    }
    for task in tasks {
        task.await.unwrap();
    }

    let _peer_side = listener.accept().await.unwrap();
    wait_until(|| {
        !node
            .coordinator
            .get_workers(BLUETOOTH_LINK_ID, COURIER_PROTOCOL_ID, true)
            .is_empty()
    })
    .await;

    // Eight signals, one connection.
    assert_eq!(
        node.coordinator
            .get_workers(BLUETOOTH_LINK_ID, COURIER_PROTOCOL_ID, false)
            .len(),
        1
    );

    node.courier.protocol_stop().await;
}

#[tokio::test]
async fn rediscovery_reaches_protocols_started_late() {
    let node = TestNode::new();

    let peer = peer_transport();
    let listener = peer.listen(&COURIER_SERVICE).await.unwrap();
    let neighbour = LinkLayerNeighbour::Bluetooth {
        mac: listener.local_address(),
    };

    // First sighting lands before any protocol is running.
    node.coordinator.neighbour_found(neighbour.clone()).await;
    assert_eq!(node.coordinator.active_workers(), 0);

    // The protocol starts late; the re-discovery still reaches it even
    // though the neighbour is already known.
    node.courier.clone().protocol_start().await;
    node.coordinator.neighbour_found(neighbour).await;

    let _peer_side = listener.accept().await.unwrap();
    wait_until(|| {
        !node
            .coordinator
            .get_workers(BLUETOOTH_LINK_ID, COURIER_PROTOCOL_ID, true)
            .is_empty()
    })
    .await;

    node.courier.protocol_stop().await;
}

#[tokio::test]
async fn unreachable_signal_leaves_the_connection_up() {
    let node = TestNode::new();
    node.courier.clone().protocol_start().await;

    let peer = peer_transport();
    let listener = peer.listen(&COURIER_SERVICE).await.unwrap();
    let neighbour = LinkLayerNeighbour::Bluetooth {
        mac: listener.local_address(),
    };

    node.coordinator.neighbour_found(neighbour.clone()).await;
    let peer_side = listener.accept().await.unwrap();
    wait_until(|| {
        !node
            .coordinator
            .get_workers(BLUETOOTH_LINK_ID, COURIER_PROTOCOL_ID, true)
            .is_empty()
    })
    .await;

    // Discovery loses sight of the neighbour; the established
    // connection must survive.
    node.coordinator.neighbour_lost(neighbour).await;
    tokio::time::sleep(std::time::Duration::from_millis(50)).await;
    assert_eq!(
        node.coordinator
            .get_workers(BLUETOOTH_LINK_ID, COURIER_PROTOCOL_ID, true)
            .len(),
        1
    );

    // The peer can still talk to us.
    peer_side.send(b"still here").await.unwrap();

    node.courier.protocol_stop().await;
}

#[tokio::test]
async fn neighbour_can_be_redialed_after_the_connection_ends() {
    let node = TestNode::new();
    node.courier.clone().protocol_start().await;

    let peer = peer_transport();
    let listener = peer.listen(&COURIER_SERVICE).await.unwrap();
    let neighbour = LinkLayerNeighbour::Bluetooth {
        mac: listener.local_address(),
    };

    node.coordinator.neighbour_found(neighbour.clone()).await;
    let first = listener.accept().await.unwrap();
    wait_until(|| {
        !node
            .coordinator
            .get_workers(BLUETOOTH_LINK_ID, COURIER_PROTOCOL_ID, true)
            .is_empty()
    })
    .await;

    // The peer hangs up; the worker drains out of the pool and the
    // address becomes claimable again.
    drop(first);
    wait_until(|| node.coordinator.active_workers() == 0).await;

    // The next discovery signal dials a fresh connection.
    node.coordinator.neighbour_found(neighbour).await;
    let _second = listener.accept().await.unwrap();
    wait_until(|| {
        !node
            .coordinator
            .get_workers(BLUETOOTH_LINK_ID, COURIER_PROTOCOL_ID, true)
            .is_empty()
    })
    .await;

    node.courier.protocol_stop().await;
}

#[tokio::test]
async fn both_overlays_dial_the_same_neighbour_independently() {
    let node = TestNode::new();
    node.courier.clone().protocol_start().await;
    node.lantern.clone().protocol_start().await;

    let peer = peer_transport();
    let listener = peer.listen(&COURIER_SERVICE).await.unwrap();
    let neighbour = LinkLayerNeighbour::Bluetooth {
        mac: listener.local_address(),
    };

    node.coordinator.neighbour_found(neighbour).await;

    // One connection per overlay protocol.
    let _first = listener.accept().await.unwrap();
    let _second = listener.accept().await.unwrap();
    wait_until(|| {
        node.coordinator
            .get_workers(BLUETOOTH_LINK_ID, COURIER_PROTOCOL_ID, true)
            .len()
            == 1
            && node
                .coordinator
                .get_workers(BLUETOOTH_LINK_ID, "lantern", true)
                .len()
                == 1
    })
    .await;

    node.courier.protocol_stop().await;
    node.lantern.protocol_stop().await;
}

#[tokio::test]
async fn adapter_gates_discovery_on_scanning() {
    let node = TestNode::new();
    node.courier.clone().protocol_start().await;

    // The adapter drops signals while the link is down.
    node.bluetooth_adapter.report_reachable("127.0.0.1:9").await;
    assert_eq!(node.coordinator.active_workers(), 0);

    node.courier.protocol_stop().await;
}
