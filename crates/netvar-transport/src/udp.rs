use std::io::ErrorKind;
use std::net::{Ipv4Addr, SocketAddr, SocketAddrV4, ToSocketAddrs, UdpSocket};
use std::time::Duration;

use tracing::{debug, info};

use crate::error::{Result, TransportError};
use crate::sink::DatagramSink;

/// Default UDP port used by controllers for network variable lists.
pub const DEFAULT_PORT: u16 = 1202;

/// Default destination: limited broadcast.
pub const DEFAULT_BROADCAST_ENDPOINT: &str = "255.255.255.255";

/// Configuration for the UDP transport.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransportConfig {
    /// Host (name or address) frames are sent to. Default: limited broadcast.
    pub endpoint: String,
    /// Local port to listen on. Default: 1202.
    pub port: u16,
    /// Remote port to send to. Default: same as `port`.
    pub send_port: Option<u16>,
    /// Receive poll timeout. `None` blocks until a datagram arrives.
    pub poll_timeout: Option<Duration>,
}

impl TransportConfig {
    /// The port outbound datagrams are addressed to.
    pub fn effective_send_port(&self) -> u16 {
        self.send_port.unwrap_or(self.port)
    }
}

impl Default for TransportConfig {
    fn default() -> Self {
        Self {
            endpoint: DEFAULT_BROADCAST_ENDPOINT.to_string(),
            port: DEFAULT_PORT,
            send_port: None,
            poll_timeout: Some(Duration::from_millis(200)),
        }
    }
}

/// UDP socket bound to a local port with a fixed send destination.
pub struct UdpTransport {
    socket: UdpSocket,
    destination: SocketAddr,
}

impl UdpTransport {
    /// Bind `0.0.0.0:<port>` and resolve the send destination.
    pub fn bind(config: &TransportConfig) -> Result<Self> {
        let addr = SocketAddr::V4(SocketAddrV4::new(Ipv4Addr::UNSPECIFIED, config.port));
        Self::bind_addr(addr, config)
    }

    /// Bind an explicit local address (e.g. `127.0.0.1:0` in tests).
    pub fn bind_addr(addr: SocketAddr, config: &TransportConfig) -> Result<Self> {
        let destination = resolve(&config.endpoint, config.effective_send_port())?;

        let socket = UdpSocket::bind(addr).map_err(|source| TransportError::Bind { addr, source })?;
        socket.set_broadcast(true)?;
        socket.set_read_timeout(config.poll_timeout)?;

        info!(local = %socket.local_addr()?, %destination, "udp transport bound");

        Ok(Self {
            socket,
            destination,
        })
    }

    /// Send a datagram to an explicit address.
    pub fn send_to(&self, datagram: &[u8], dest: SocketAddr) -> Result<()> {
        self.socket
            .send_to(datagram, dest)
            .map_err(|source| TransportError::Send { dest, source })?;
        Ok(())
    }

    /// Receive one datagram into `buf`.
    ///
    /// Returns `Ok(None)` when the poll timeout elapses without data.
    pub fn recv(&self, buf: &mut [u8]) -> Result<Option<(usize, SocketAddr)>> {
        loop {
            match self.socket.recv_from(buf) {
                Ok((len, from)) => {
                    debug!(%from, len, "received datagram");
                    return Ok(Some((len, from)));
                }
                Err(err) if err.kind() == ErrorKind::Interrupted => continue,
                Err(err) if matches!(err.kind(), ErrorKind::WouldBlock | ErrorKind::TimedOut) => {
                    return Ok(None)
                }
                Err(err) => return Err(TransportError::Io(err)),
            }
        }
    }

    /// Where outbound datagrams go.
    pub fn destination(&self) -> SocketAddr {
        self.destination
    }

    /// The bound local address.
    pub fn local_addr(&self) -> Result<SocketAddr> {
        self.socket.local_addr().map_err(Into::into)
    }
}

impl DatagramSink for UdpTransport {
    fn send_datagram(&self, datagram: &[u8]) -> Result<()> {
        self.send_to(datagram, self.destination)
    }
}

impl std::fmt::Debug for UdpTransport {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("UdpTransport")
            .field("local", &self.socket.local_addr().ok())
            .field("destination", &self.destination)
            .finish()
    }
}

fn resolve(endpoint: &str, port: u16) -> Result<SocketAddr> {
    let unresolved = || TransportError::Resolve {
        endpoint: format!("{endpoint}:{port}"),
    };
    let addrs = (endpoint, port).to_socket_addrs().map_err(|_| unresolved())?;
    // The socket is bound on IPv4, so prefer an IPv4 destination.
    let mut fallback = None;
    for addr in addrs {
        if addr.is_ipv4() {
            return Ok(addr);
        }
        fallback.get_or_insert(addr);
    }
    fallback.ok_or_else(unresolved)
}
