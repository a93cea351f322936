//! Workers: supervised units of connection handling.

use async_trait::async_trait;
use driftmesh_link::LinkLayerNeighbour;

/// Admission priority. High priority is reserved for protocol servers
/// and inbound connections that were already accepted; ordinary
/// outgoing attempts compete at low priority.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Priority {
    Low,
    High,
}

/// What kind of work a worker performs. The coordinator resolves the
/// admission priority from this.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WorkerRole {
    /// Long-lived listener or shared group worker.
    Server,
    /// Connection handed over by an accept loop. The socket is already
    /// open, so dropping it on admission would waste an established
    /// link.
    AcceptedClient,
    /// Outgoing connection attempt to one neighbour.
    Outgoing,
}

impl WorkerRole {
    /// Admission priority for this role.
    pub fn priority(self) -> Priority {
        match self {
            WorkerRole::Server | WorkerRole::AcceptedClient => Priority::High,
            WorkerRole::Outgoing => Priority::Low,
        }
    }
}

/// A unit of connection handling executed under the pool's supervision.
///
/// Once admitted, the pool owns the worker's execution: it drives
/// `run()` in its own task and forgets the worker when the run loop
/// exits. `cancel()` is the synchronous stop signal; it must cause a
/// blocked `run()` to return promptly and must release any resource the
/// worker holds that `run()` has not taken yet (the rejection path).
#[async_trait]
pub trait Worker: Send + Sync {
    /// Unique identifier of this worker.
    fn worker_id(&self) -> String;

    /// Link layer this worker operates on.
    fn link_layer_id(&self) -> &'static str;

    /// Protocol this worker belongs to.
    fn protocol_id(&self) -> &'static str;

    /// Kind of work performed; decides admission priority.
    fn role(&self) -> WorkerRole;

    /// The worker's whole life. Never panics outward; failures are
    /// logged and end the loop.
    async fn run(&self);

    /// Signal the worker to stop and release what it holds.
    fn cancel(&self);

    /// Whether the underlying connection is currently established.
    fn is_connected(&self) -> bool;

    /// Neighbours currently reachable through this worker. A
    /// point-to-point worker reports its single peer while connected; a
    /// shared group worker reports every datagram source it has seen.
    fn remote_neighbours(&self) -> Vec<LinkLayerNeighbour>;
}

/// Filter over the pool's worker set. `None` fields match everything.
#[derive(Debug, Clone, Default)]
pub struct WorkerFilter {
    pub link_layer_id: Option<String>,
    pub protocol_id: Option<String>,
}

impl WorkerFilter {
    /// Match all workers.
    pub fn all() -> Self {
        Self::default()
    }

    /// Match workers of one (link layer, protocol) pair.
    pub fn new(link_layer_id: impl Into<String>, protocol_id: impl Into<String>) -> Self {
        Self {
            link_layer_id: Some(link_layer_id.into()),
            protocol_id: Some(protocol_id.into()),
        }
    }

    /// Match every worker of one protocol.
    pub fn protocol(protocol_id: impl Into<String>) -> Self {
        Self {
            link_layer_id: None,
            protocol_id: Some(protocol_id.into()),
        }
    }

    pub fn matches(&self, worker: &dyn Worker) -> bool {
        if let Some(link) = &self.link_layer_id {
            if worker.link_layer_id() != link {
                return false;
            }
        }
        if let Some(protocol) = &self.protocol_id {
            if worker.protocol_id() != protocol {
                return false;
            }
        }
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn roles_map_to_priorities() {
        assert_eq!(WorkerRole::Server.priority(), Priority::High);
        assert_eq!(WorkerRole::AcceptedClient.priority(), Priority::High);
        assert_eq!(WorkerRole::Outgoing.priority(), Priority::Low);
    }
}
