//! Configuration management for driftmesh.

use serde::{Deserialize, Serialize};
use std::path::Path;

/// Top-level node configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    pub node: NodeSettings,
    pub pool: PoolSettings,
    pub links: LinkSettings,
}

/// Node identity settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NodeSettings {
    pub node_id: String,
}

/// Connection pool sizing.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PoolSettings {
    /// Maximum number of concurrently supervised workers.
    pub capacity: usize,
    /// Slots withheld from low-priority admissions so inbound
    /// connections and protocol servers always find room.
    pub high_priority_reserve: usize,
}

/// Link-layer endpoints for the loopback TCP/UDP transport.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LinkSettings {
    /// Listen address for the point-to-point link emulation.
    pub bluetooth_listen: String,
    /// Local bind address for the multicast group channel.
    pub multicast_bind: String,
    /// Group address datagrams are sent to.
    pub multicast_group: String,
}

impl Config {
    pub fn from_file<P: AsRef<Path>>(path: P) -> anyhow::Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let config = toml::from_str(&content)?;
        Ok(config)
    }

    pub fn default_config() -> Self {
        Self {
            node: NodeSettings {
                node_id: "node-001".to_string(),
            },
            pool: PoolSettings {
                capacity: 16,
                high_priority_reserve: 4,
            },
            links: LinkSettings {
                bluetooth_listen: "127.0.0.1:0".to_string(),
                multicast_bind: "127.0.0.1:0".to_string(),
                multicast_group: "127.0.0.1:42420".to_string(),
            },
        }
    }
}
