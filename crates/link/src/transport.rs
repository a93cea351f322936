//! Transport boundary: connect / listen / group primitives.
//!
//! Protocols never touch sockets directly; they go through
//! [`LinkTransport`], which hides the medium behind three primitives:
//! an outgoing point-to-point connection, a listening handle, and a
//! shared group channel for broadcast-style media.
//!
//! Wire format of point-to-point connections: `[4-byte LE length][frame]`.
//! Frame contents are opaque to this crate.

use crate::error::{LinkError, LinkResult};
use crate::neighbour::{LinkLayerNeighbour, BLUETOOTH_LINK_ID};
use async_trait::async_trait;
use std::fmt;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};
use tokio::net::{TcpListener, TcpStream, UdpSocket};
use tokio::sync::Mutex;
use tracing::debug;

/// Frames above this size are treated as a protocol violation.
pub const MAX_FRAME_LEN: usize = 1024 * 1024;

/// Opaque service identifier: a 128-bit UUID plus a human-readable
/// name. Owned by the protocol that listens or connects under it; this
/// crate only forwards it to the medium.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ServiceId {
    /// Canonical textual UUID.
    pub uuid: &'static str,
    /// Human-readable service name.
    pub name: &'static str,
}

impl fmt::Display for ServiceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({})", self.name, self.uuid)
    }
}

/// An established point-to-point connection.
#[async_trait]
pub trait LinkConnection: Send + Sync {
    /// The remote endpoint of this connection.
    fn remote(&self) -> LinkLayerNeighbour;

    /// Receive the next frame. `Ok(None)` means the peer closed the
    /// connection in an orderly way.
    async fn recv(&self) -> LinkResult<Option<Vec<u8>>>;

    /// Send one frame.
    async fn send(&self, frame: &[u8]) -> LinkResult<()>;
}

/// A bound listening handle accepting inbound connections.
#[async_trait]
pub trait LinkListener: Send + Sync {
    /// Address the listener is bound to.
    fn local_address(&self) -> String;

    /// Wait for the next inbound connection.
    async fn accept(&self) -> LinkResult<Box<dyn LinkConnection>>;
}

/// A shared broadcast-style channel serving every group neighbour.
#[async_trait]
pub trait GroupChannel: Send + Sync {
    /// Local address of the channel.
    fn local_address(&self) -> String;

    /// Receive the next datagram together with its source neighbour.
    async fn recv_from(&self) -> LinkResult<(Vec<u8>, LinkLayerNeighbour)>;

    /// Send one datagram to the group.
    async fn send_to_group(&self, frame: &[u8]) -> LinkResult<()>;
}

/// Connect / listen / group primitives of one link layer.
#[async_trait]
pub trait LinkTransport: Send + Sync {
    /// Link layer this transport belongs to.
    fn link_layer_id(&self) -> &'static str;

    /// Open an outgoing connection to `address` under `service`.
    async fn connect(
        &self,
        address: &str,
        service: &ServiceId,
        secure: bool,
    ) -> LinkResult<Box<dyn LinkConnection>>;

    /// Bind a listening handle for `service`.
    async fn listen(&self, service: &ServiceId) -> LinkResult<Box<dyn LinkListener>>;

    /// Join the broadcast group for `service`.
    async fn join_group(&self, service: &ServiceId) -> LinkResult<Box<dyn GroupChannel>>;
}

/// TCP/UDP-backed transport used for loopback operation and tests.
///
/// Point-to-point connections map onto TCP streams (the neighbour
/// address doubles as the socket address) and the group channel onto a
/// UDP socket. The `secure` flag is accepted and ignored; the loopback
/// medium has no pairing step.
pub struct TcpLinkTransport {
    link_layer_id: &'static str,
    listen_addr: String,
    group_bind: Option<String>,
    group_addr: Option<String>,
}

impl TcpLinkTransport {
    /// Transport for a point-to-point link layer listening on `listen_addr`.
    pub fn new(link_layer_id: &'static str, listen_addr: impl Into<String>) -> Self {
        Self {
            link_layer_id,
            listen_addr: listen_addr.into(),
            group_bind: None,
            group_addr: None,
        }
    }

    /// Enable the group channel, bound to `bind` and sending to `group`.
    pub fn with_group(mut self, bind: impl Into<String>, group: impl Into<String>) -> Self {
        self.group_bind = Some(bind.into());
        self.group_addr = Some(group.into());
        self
    }

    fn neighbour_for(&self, addr: String) -> LinkLayerNeighbour {
        if self.link_layer_id == BLUETOOTH_LINK_ID {
            LinkLayerNeighbour::Bluetooth { mac: addr }
        } else {
            LinkLayerNeighbour::Multicast { addr }
        }
    }
}

#[async_trait]
impl LinkTransport for TcpLinkTransport {
    fn link_layer_id(&self) -> &'static str {
        self.link_layer_id
    }

    async fn connect(
        &self,
        address: &str,
        service: &ServiceId,
        _secure: bool,
    ) -> LinkResult<Box<dyn LinkConnection>> {
        let stream = TcpStream::connect(address)
            .await
            .map_err(|source| LinkError::Connect {
                address: address.to_string(),
                source,
            })?;
        debug!(%service, %address, "opened outgoing connection");
        let remote = self.neighbour_for(address.to_string());
        Ok(Box::new(FramedTcpConnection::new(stream, remote)))
    }

    async fn listen(&self, service: &ServiceId) -> LinkResult<Box<dyn LinkListener>> {
        let listener =
            TcpListener::bind(&self.listen_addr)
                .await
                .map_err(|source| LinkError::Bind {
                    service: service.to_string(),
                    source,
                })?;
        let local = listener
            .local_addr()
            .map(|a| a.to_string())
            .unwrap_or_else(|_| self.listen_addr.clone());
        debug!(%service, %local, "listening");
        Ok(Box::new(TcpServiceListener {
            link_layer_id: self.link_layer_id,
            listener,
            local,
        }))
    }

    async fn join_group(&self, service: &ServiceId) -> LinkResult<Box<dyn GroupChannel>> {
        let (bind, group) = match (&self.group_bind, &self.group_addr) {
            (Some(bind), Some(group)) => (bind.clone(), group.clone()),
            _ => return Err(LinkError::NoGroup(self.link_layer_id)),
        };
        let socket = UdpSocket::bind(&bind)
            .await
            .map_err(|source| LinkError::Bind {
                service: service.to_string(),
                source,
            })?;
        let local = socket
            .local_addr()
            .map(|a| a.to_string())
            .unwrap_or(bind);
        debug!(%service, %local, %group, "joined group channel");
        Ok(Box::new(UdpGroupChannel {
            socket,
            group,
            local,
        }))
    }
}

struct TcpServiceListener {
    link_layer_id: &'static str,
    listener: TcpListener,
    local: String,
}

#[async_trait]
impl LinkListener for TcpServiceListener {
    fn local_address(&self) -> String {
        self.local.clone()
    }

    async fn accept(&self) -> LinkResult<Box<dyn LinkConnection>> {
        let (stream, peer) = self.listener.accept().await?;
        let remote = if self.link_layer_id == BLUETOOTH_LINK_ID {
            LinkLayerNeighbour::Bluetooth {
                mac: peer.to_string(),
            }
        } else {
            LinkLayerNeighbour::Multicast {
                addr: peer.to_string(),
            }
        };
        Ok(Box::new(FramedTcpConnection::new(stream, remote)))
    }
}

/// Length-prefixed frame connection over a TCP stream.
struct FramedTcpConnection {
    remote: LinkLayerNeighbour,
    reader: Mutex<OwnedReadHalf>,
    writer: Mutex<OwnedWriteHalf>,
}

impl FramedTcpConnection {
    fn new(stream: TcpStream, remote: LinkLayerNeighbour) -> Self {
        let (reader, writer) = stream.into_split();
        Self {
            remote,
            reader: Mutex::new(reader),
            writer: Mutex::new(writer),
        }
    }
}

#[async_trait]
impl LinkConnection for FramedTcpConnection {
    fn remote(&self) -> LinkLayerNeighbour {
        self.remote.clone()
    }

    async fn recv(&self) -> LinkResult<Option<Vec<u8>>> {
        let mut reader = self.reader.lock().await;
        let mut len_buf = [0u8; 4];
        match reader.read_exact(&mut len_buf).await {
            Ok(_) => {}
            Err(e) if e.kind() == std::io::ErrorKind::UnexpectedEof => return Ok(None),
            Err(e) => return Err(e.into()),
        }
        let len = u32::from_le_bytes(len_buf) as usize;
        if len > MAX_FRAME_LEN {
            return Err(LinkError::FrameTooLarge {
                got: len,
                cap: MAX_FRAME_LEN,
            });
        }
        let mut frame = vec![0u8; len];
        reader.read_exact(&mut frame).await?;
        Ok(Some(frame))
    }

    async fn send(&self, frame: &[u8]) -> LinkResult<()> {
        let mut writer = self.writer.lock().await;
        let len = (frame.len() as u32).to_le_bytes();
        writer.write_all(&len).await?;
        writer.write_all(frame).await?;
        writer.flush().await?;
        Ok(())
    }
}

struct UdpGroupChannel {
    socket: UdpSocket,
    group: String,
    local: String,
}

#[async_trait]
impl GroupChannel for UdpGroupChannel {
    fn local_address(&self) -> String {
        self.local.clone()
    }

    async fn recv_from(&self) -> LinkResult<(Vec<u8>, LinkLayerNeighbour)> {
        let mut buf = vec![0u8; 64 * 1024];
        let (n, from) = self.socket.recv_from(&mut buf).await?;
        buf.truncate(n);
        Ok((
            buf,
            LinkLayerNeighbour::Multicast {
                addr: from.to_string(),
            },
        ))
    }

    async fn send_to_group(&self, frame: &[u8]) -> LinkResult<()> {
        self.socket.send_to(frame, &self.group).await?;
        Ok(())
    }
}
