//! Whole-node lifecycle: two nodes discovering each other over
//! loopback, connecting both ways, and shutting down cleanly.

use crate::test_utils::{wait_until, TestNode};
use driftmesh_link::{LinkLayerAdapter, BLUETOOTH_LINK_ID};
use driftmesh_net::Protocol;
use driftmesh_protocols::COURIER_PROTOCOL_ID;

#[tokio::test]
async fn two_nodes_connect_and_part() {
    let node_a = TestNode::new();
    let node_b = TestNode::new();

    node_a.coordinator.start_all().await;
    node_b.coordinator.start_all().await;

    // Both accept loops come up.
    wait_until(|| {
        !node_a
            .coordinator
            .get_workers(BLUETOOTH_LINK_ID, COURIER_PROTOCOL_ID, false)
            .is_empty()
            && !node_b
                .coordinator
                .get_workers(BLUETOOTH_LINK_ID, COURIER_PROTOCOL_ID, false)
                .is_empty()
    })
    .await;

    // A's scanner spots B.
    node_a
        .bluetooth_adapter
        .report_reachable(node_b.bluetooth_address.clone())
        .await;

    // A dials out, B accepts in.
    wait_until(|| {
        node_a
            .coordinator
            .get_workers(BLUETOOTH_LINK_ID, COURIER_PROTOCOL_ID, true)
            .iter()
            .any(|w| !w.remote_neighbours().is_empty())
    })
    .await;
    wait_until(|| {
        node_b
            .coordinator
            .get_workers(BLUETOOTH_LINK_ID, COURIER_PROTOCOL_ID, true)
            .len()
            >= 2 // A's courier and lantern both dialed in
    })
    .await;

    // A's courier reports B as a serviced neighbour.
    let neighbours = node_a.courier.neighbour_list().await;
    assert!(neighbours
        .iter()
        .any(|n| n.neighbour.address() == node_b.bluetooth_address));

    // A goes dark; nothing of A keeps running.
    node_a.coordinator.shutdown().await;
    assert_eq!(node_a.coordinator.active_workers(), 0);

    // B notices the connections dropping.
    wait_until(|| {
        node_b
            .coordinator
            .get_workers(BLUETOOTH_LINK_ID, COURIER_PROTOCOL_ID, true)
            .is_empty()
    })
    .await;

    node_b.coordinator.shutdown().await;
    assert_eq!(node_b.coordinator.active_workers(), 0);
}

#[tokio::test]
async fn node_lifecycle_is_restartable() {
    let node = TestNode::new();

    node.coordinator.start_all().await;
    wait_until(|| {
        !node
            .coordinator
            .get_workers(BLUETOOTH_LINK_ID, COURIER_PROTOCOL_ID, false)
            .is_empty()
    })
    .await;

    node.coordinator.shutdown().await;
    assert_eq!(node.coordinator.active_workers(), 0);
    assert!(!node.bluetooth_adapter.is_scanning());

    // Same wiring starts again; the accept loop rebinds its port.
    node.coordinator.start_all().await;
    wait_until(|| {
        !node
            .coordinator
            .get_workers(BLUETOOTH_LINK_ID, COURIER_PROTOCOL_ID, false)
            .is_empty()
    })
    .await;
    assert!(node.bluetooth_adapter.is_scanning());

    node.coordinator.shutdown().await;
    assert_eq!(node.coordinator.active_workers(), 0);
}

#[tokio::test]
async fn repeated_start_all_is_idempotent() {
    let node = TestNode::new();

    node.coordinator.start_all().await;
    node.coordinator.start_all().await;
    wait_until(|| {
        !node
            .coordinator
            .get_workers(BLUETOOTH_LINK_ID, COURIER_PROTOCOL_ID, false)
            .is_empty()
    })
    .await;

    // Started protocols and scanning adapters ignore the second start,
    // so exactly one accept loop exists.
    assert_eq!(
        node.coordinator
            .get_workers(BLUETOOTH_LINK_ID, COURIER_PROTOCOL_ID, false)
            .len(),
        1
    );

    node.coordinator.shutdown().await;
}
