//! Worker implementations shared by the overlay protocols.
//!
//! Four kinds of work run under the pool:
//!
//! - [`ServerWorker`]: accept loop on a listening handle, turning each
//!   inbound connection into an [`InboundWorker`] through a
//!   protocol-supplied factory.
//! - [`OutgoingWorker`]: dials one point-to-point neighbour and pumps
//!   the connection until it breaks.
//! - [`InboundWorker`]: one accepted connection, already open when the
//!   worker is created.
//! - [`MulticastWorker`]: the single shared worker a broadcast-style
//!   link needs; it serves every group neighbour at once and tracks
//!   which sources it has heard from.
//!
//! Run loops never let an error escape: a failure ends the loop and is
//! logged, nothing more. Frame payloads are opaque here; dispatching
//! them is the job of the messaging layer above this core.

use crate::state::ConnectionState;
use async_trait::async_trait;
use driftmesh_link::{LinkConnection, LinkLayerNeighbour, LinkTransport, ServiceId};
use driftmesh_net::{NetworkCoordinator, Worker, WorkerRole};
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, trace, warn};

/// Builds the per-client worker for a connection the accept loop took.
pub type ClientWorkerFactory =
    Arc<dyn Fn(Box<dyn LinkConnection>) -> Arc<dyn Worker> + Send + Sync>;

/// Drain frames until the peer closes, the transport fails, or the
/// worker is cancelled.
async fn pump_frames(conn: &dyn LinkConnection, cancel: &CancellationToken) {
    loop {
        tokio::select! {
            _ = cancel.cancelled() => break,
            frame = conn.recv() => match frame {
                Ok(Some(frame)) => {
                    trace!(remote = %conn.remote(), len = frame.len(), "frame received");
                }
                Ok(None) => {
                    debug!(remote = %conn.remote(), "peer closed connection");
                    break;
                }
                Err(e) => {
                    debug!(remote = %conn.remote(), "connection failed: {e}");
                    break;
                }
            }
        }
    }
}

/// Accept loop on a well-known service identifier.
///
/// Bind failure ends the worker immediately; there is no automatic
/// retry, the next `LinkLayerStarted` builds a fresh server. Every
/// accepted connection registers its remote as a neighbour and is
/// submitted at high priority; when admission fails, the connection is
/// dropped on the spot.
pub struct ServerWorker {
    worker_id: String,
    protocol_id: &'static str,
    link_layer_id: &'static str,
    transport: Arc<dyn LinkTransport>,
    service: ServiceId,
    coordinator: Arc<NetworkCoordinator>,
    factory: ClientWorkerFactory,
    cancel_token: CancellationToken,
    listening: AtomicBool,
    local_address: Mutex<Option<String>>,
}

impl ServerWorker {
    pub fn new(
        protocol_id: &'static str,
        transport: Arc<dyn LinkTransport>,
        service: ServiceId,
        coordinator: Arc<NetworkCoordinator>,
        factory: ClientWorkerFactory,
    ) -> Arc<Self> {
        let link_layer_id = transport.link_layer_id();
        Arc::new(Self {
            worker_id: format!("{protocol_id}:{link_layer_id}:server"),
            protocol_id,
            link_layer_id,
            transport,
            service,
            coordinator,
            factory,
            cancel_token: CancellationToken::new(),
            listening: AtomicBool::new(false),
            local_address: Mutex::new(None),
        })
    }

    /// Whether the accept loop is currently bound and accepting.
    pub fn is_listening(&self) -> bool {
        self.listening.load(Ordering::SeqCst)
    }

    /// Address the listener bound to, once listening.
    pub fn local_address(&self) -> Option<String> {
        self.local_address.lock().unwrap().clone()
    }
}

#[async_trait]
impl Worker for ServerWorker {
    fn worker_id(&self) -> String {
        self.worker_id.clone()
    }

    fn link_layer_id(&self) -> &'static str {
        self.link_layer_id
    }

    fn protocol_id(&self) -> &'static str {
        self.protocol_id
    }

    fn role(&self) -> WorkerRole {
        WorkerRole::Server
    }

    async fn run(&self) {
        let listener = match self.transport.listen(&self.service).await {
            Ok(listener) => listener,
            Err(e) => {
                warn!(worker_id = %self.worker_id, service = %self.service, "bind failed: {e}");
                return;
            }
        };
        *self.local_address.lock().unwrap() = Some(listener.local_address());
        self.listening.store(true, Ordering::SeqCst);
        info!(
            worker_id = %self.worker_id,
            local = %listener.local_address(),
            "accept loop started"
        );

        loop {
            tokio::select! {
                _ = self.cancel_token.cancelled() => break,
                accepted = listener.accept() => match accepted {
                    Ok(conn) => {
                        let neighbour = conn.remote();
                        debug!(%neighbour, "client connected");
                        self.coordinator.new_neighbour(neighbour.clone()).await;
                        let client = (self.factory)(conn);
                        if !self.coordinator.add_worker(client).await {
                            debug!(%neighbour, "inbound connection dropped: no pool slot");
                        }
                    }
                    Err(e) => {
                        warn!(worker_id = %self.worker_id, "accept loop terminated: {e}");
                        break;
                    }
                }
            }
        }

        self.listening.store(false, Ordering::SeqCst);
        info!(worker_id = %self.worker_id, "accept loop stopped");
    }

    fn cancel(&self) {
        self.cancel_token.cancel();
    }

    fn is_connected(&self) -> bool {
        false
    }

    fn remote_neighbours(&self) -> Vec<LinkLayerNeighbour> {
        Vec::new()
    }
}

/// One accepted inbound connection.
pub struct InboundWorker {
    worker_id: String,
    protocol_id: &'static str,
    link_layer_id: &'static str,
    neighbour: LinkLayerNeighbour,
    conn: Mutex<Option<Box<dyn LinkConnection>>>,
    cancel_token: CancellationToken,
    connected: AtomicBool,
}

impl InboundWorker {
    pub fn from_connection(
        protocol_id: &'static str,
        conn: Box<dyn LinkConnection>,
    ) -> Arc<Self> {
        let neighbour = conn.remote();
        let link_layer_id = neighbour.link_layer_id();
        // Several connections from one peer can coexist briefly, so the
        // id carries a nonce on top of the address.
        let nonce: u32 = rand::random();
        Arc::new(Self {
            worker_id: format!(
                "{protocol_id}:{link_layer_id}:{}:{nonce:08x}",
                neighbour.address()
            ),
            protocol_id,
            link_layer_id,
            neighbour,
            conn: Mutex::new(Some(conn)),
            cancel_token: CancellationToken::new(),
            connected: AtomicBool::new(false),
        })
    }
}

#[async_trait]
impl Worker for InboundWorker {
    fn worker_id(&self) -> String {
        self.worker_id.clone()
    }

    fn link_layer_id(&self) -> &'static str {
        self.link_layer_id
    }

    fn protocol_id(&self) -> &'static str {
        self.protocol_id
    }

    fn role(&self) -> WorkerRole {
        WorkerRole::AcceptedClient
    }

    async fn run(&self) {
        let conn = self.conn.lock().unwrap().take();
        let Some(conn) = conn else {
            // Cancelled before the run loop started; nothing to do.
            return;
        };
        self.connected.store(true, Ordering::SeqCst);
        pump_frames(conn.as_ref(), &self.cancel_token).await;
        self.connected.store(false, Ordering::SeqCst);
    }

    fn cancel(&self) {
        self.cancel_token.cancel();
        // If the run loop never took the connection (the rejection
        // path), releasing it here closes the socket.
        self.conn.lock().unwrap().take();
    }

    fn is_connected(&self) -> bool {
        self.connected.load(Ordering::SeqCst)
    }

    fn remote_neighbours(&self) -> Vec<LinkLayerNeighbour> {
        if self.is_connected() {
            vec![self.neighbour.clone()]
        } else {
            Vec::new()
        }
    }
}

/// Outgoing connection attempt to one point-to-point neighbour.
///
/// The connection is opened inside the run loop; whatever way the loop
/// ends — connect failure, peer close, transport error, cancellation —
/// the neighbour's [`ConnectionState`] is reset so the next discovery
/// signal may try again.
pub struct OutgoingWorker {
    worker_id: String,
    protocol_id: &'static str,
    link_layer_id: &'static str,
    neighbour: LinkLayerNeighbour,
    service: ServiceId,
    secure: bool,
    transport: Arc<dyn LinkTransport>,
    state: Arc<ConnectionState>,
    cancel_token: CancellationToken,
    connected: AtomicBool,
}

impl OutgoingWorker {
    pub fn new(
        protocol_id: &'static str,
        neighbour: LinkLayerNeighbour,
        service: ServiceId,
        secure: bool,
        transport: Arc<dyn LinkTransport>,
        state: Arc<ConnectionState>,
    ) -> Arc<Self> {
        let link_layer_id = neighbour.link_layer_id();
        Arc::new(Self {
            worker_id: format!(
                "{protocol_id}:{link_layer_id}:{}",
                neighbour.address()
            ),
            protocol_id,
            link_layer_id,
            neighbour,
            service,
            secure,
            transport,
            state,
            cancel_token: CancellationToken::new(),
            connected: AtomicBool::new(false),
        })
    }
}

#[async_trait]
impl Worker for OutgoingWorker {
    fn worker_id(&self) -> String {
        self.worker_id.clone()
    }

    fn link_layer_id(&self) -> &'static str {
        self.link_layer_id
    }

    fn protocol_id(&self) -> &'static str {
        self.protocol_id
    }

    fn role(&self) -> WorkerRole {
        WorkerRole::Outgoing
    }

    async fn run(&self) {
        let address = self.neighbour.address().to_string();
        let conn = tokio::select! {
            _ = self.cancel_token.cancelled() => {
                self.state.end();
                return;
            }
            result = self.transport.connect(&address, &self.service, self.secure) => {
                match result {
                    Ok(conn) => conn,
                    Err(e) => {
                        debug!(neighbour = %self.neighbour, "outgoing connect failed: {e}");
                        self.state.end();
                        return;
                    }
                }
            }
        };

        info!(neighbour = %self.neighbour, "outgoing connection established");
        self.connected.store(true, Ordering::SeqCst);
        pump_frames(conn.as_ref(), &self.cancel_token).await;
        self.connected.store(false, Ordering::SeqCst);
        self.state.end();
    }

    fn cancel(&self) {
        self.cancel_token.cancel();
    }

    fn is_connected(&self) -> bool {
        self.connected.load(Ordering::SeqCst)
    }

    fn remote_neighbours(&self) -> Vec<LinkLayerNeighbour> {
        if self.is_connected() {
            vec![self.neighbour.clone()]
        } else {
            Vec::new()
        }
    }
}

/// Sources silent for this long stop counting as group neighbours.
const GROUP_SOURCE_TTL: Duration = Duration::from_secs(600);

/// The one shared worker of a broadcast-style link.
///
/// No per-neighbour connections exist on the group; this worker serves
/// everybody and remembers which sources it has heard datagrams from so
/// the protocol can report them as neighbours. A source that falls
/// silent for [`GROUP_SOURCE_TTL`] is forgotten, so the set stays
/// bounded by the neighbourhood actually talking.
pub struct MulticastWorker {
    worker_id: String,
    protocol_id: &'static str,
    link_layer_id: &'static str,
    transport: Arc<dyn LinkTransport>,
    service: ServiceId,
    seen: Mutex<HashMap<LinkLayerNeighbour, Instant>>,
    cancel_token: CancellationToken,
    connected: AtomicBool,
    local_address: Mutex<Option<String>>,
}

impl MulticastWorker {
    pub fn new(
        protocol_id: &'static str,
        transport: Arc<dyn LinkTransport>,
        service: ServiceId,
    ) -> Arc<Self> {
        let link_layer_id = transport.link_layer_id();
        Arc::new(Self {
            worker_id: format!("{protocol_id}:{link_layer_id}:group"),
            protocol_id,
            link_layer_id,
            transport,
            service,
            seen: Mutex::new(HashMap::new()),
            cancel_token: CancellationToken::new(),
            connected: AtomicBool::new(false),
            local_address: Mutex::new(None),
        })
    }

    /// Local address of the group channel, once joined.
    pub fn local_address(&self) -> Option<String> {
        self.local_address.lock().unwrap().clone()
    }

    fn note_source(&self, from: LinkLayerNeighbour) {
        let now = Instant::now();
        let mut seen = self.seen.lock().unwrap();
        seen.retain(|_, last| now.duration_since(*last) < GROUP_SOURCE_TTL);
        seen.insert(from, now);
    }
}

#[async_trait]
impl Worker for MulticastWorker {
    fn worker_id(&self) -> String {
        self.worker_id.clone()
    }

    fn link_layer_id(&self) -> &'static str {
        self.link_layer_id
    }

    fn protocol_id(&self) -> &'static str {
        self.protocol_id
    }

    fn role(&self) -> WorkerRole {
        WorkerRole::Server
    }

    async fn run(&self) {
        let group = match self.transport.join_group(&self.service).await {
            Ok(group) => group,
            Err(e) => {
                warn!(worker_id = %self.worker_id, "cannot join group: {e}");
                return;
            }
        };
        *self.local_address.lock().unwrap() = Some(group.local_address());
        self.connected.store(true, Ordering::SeqCst);
        info!(worker_id = %self.worker_id, local = %group.local_address(), "group worker started");

        loop {
            tokio::select! {
                _ = self.cancel_token.cancelled() => break,
                received = group.recv_from() => match received {
                    Ok((frame, from)) => {
                        trace!(%from, len = frame.len(), "group datagram");
                        self.note_source(from);
                    }
                    Err(e) => {
                        warn!(worker_id = %self.worker_id, "group channel failed: {e}");
                        break;
                    }
                }
            }
        }

        self.connected.store(false, Ordering::SeqCst);
        info!(worker_id = %self.worker_id, "group worker stopped");
    }

    fn cancel(&self) {
        self.cancel_token.cancel();
    }

    fn is_connected(&self) -> bool {
        self.connected.load(Ordering::SeqCst)
    }

    fn remote_neighbours(&self) -> Vec<LinkLayerNeighbour> {
        let now = Instant::now();
        self.seen
            .lock()
            .unwrap()
            .iter()
            .filter(|(_, last)| now.duration_since(**last) < GROUP_SOURCE_TTL)
            .map(|(neighbour, _)| neighbour.clone())
            .collect()
    }
}
