//! Driftmesh node daemon.
//!
//! Wires the pieces together: link transports, discovery adapters, the
//! coordinator, and the two overlay protocols. Runs until interrupted,
//! then shuts everything down in order.

use anyhow::Context;
use driftmesh_core::{logging, Config};
use driftmesh_link::{
    BluetoothAdapter, DiscoverySink, LinkTransport, TcpLinkTransport, WifiDirectAdapter,
    WifiManagedAdapter, BLUETOOTH_LINK_ID, WIFI_MANAGED_LINK_ID,
};
use driftmesh_net::{NetworkCoordinator, PoolConfig};
use driftmesh_protocols::{CourierProtocol, LanternProtocol};
use std::path::PathBuf;
use std::sync::Arc;
use tracing::info;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args: Vec<String> = std::env::args().collect();

    let config = match parse_config_path(&args)? {
        Some(path) => Config::from_file(&path)
            .with_context(|| format!("cannot load config from {}", path.display()))?,
        None => Config::default_config(),
    };

    if args.iter().any(|arg| arg == "--log-json") {
        logging::init_json();
    } else {
        logging::init();
    }

    info!(node_id = %config.node.node_id, "driftmesh node starting");

    let bluetooth: Arc<dyn LinkTransport> = Arc::new(TcpLinkTransport::new(
        BLUETOOTH_LINK_ID,
        config.links.bluetooth_listen.clone(),
    ));
    let wifi: Arc<dyn LinkTransport> = Arc::new(
        TcpLinkTransport::new(WIFI_MANAGED_LINK_ID, config.links.multicast_bind.clone())
            .with_group(
                config.links.multicast_bind.clone(),
                config.links.multicast_group.clone(),
            ),
    );

    let coordinator = NetworkCoordinator::new(PoolConfig {
        capacity: config.pool.capacity,
        high_priority_reserve: config.pool.high_priority_reserve,
    });

    coordinator.register_protocol(CourierProtocol::new(
        coordinator.clone(),
        bluetooth.clone(),
        wifi.clone(),
    ));
    coordinator.register_protocol(LanternProtocol::new(
        coordinator.clone(),
        bluetooth,
        wifi,
    ));

    let sink: Arc<dyn DiscoverySink> = coordinator.clone();
    coordinator.register_adapter(BluetoothAdapter::new(sink.clone()));
    coordinator.register_adapter(WifiManagedAdapter::new(sink.clone()));
    coordinator.register_adapter(WifiDirectAdapter::new(sink));

    coordinator.start_all().await;
    info!("node up, waiting for interrupt");

    tokio::signal::ctrl_c()
        .await
        .context("cannot listen for the interrupt signal")?;

    info!("interrupt received, shutting down");
    coordinator.shutdown().await;
    Ok(())
}

fn parse_config_path(args: &[String]) -> anyhow::Result<Option<PathBuf>> {
    let mut args_iter = args.iter();
    while let Some(arg) = args_iter.next() {
        if arg == "--config" {
            return match args_iter.next() {
                Some(path) => Ok(Some(PathBuf::from(path))),
                None => Err(anyhow::anyhow!("--config was provided without a path")),
            };
        }
    }
    Ok(None)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn args(list: &[&str]) -> Vec<String> {
        list.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn config_path_is_optional() {
        assert!(parse_config_path(&args(&["driftmesh-node"]))
            .unwrap()
            .is_none());
    }

    #[test]
    fn config_path_follows_the_flag() {
        let path = parse_config_path(&args(&["driftmesh-node", "--config", "/etc/node.toml"]))
            .unwrap()
            .unwrap();
        assert_eq!(path, PathBuf::from("/etc/node.toml"));
    }

    #[test]
    fn missing_path_is_an_error() {
        assert!(parse_config_path(&args(&["driftmesh-node", "--config"])).is_err());
    }
}
