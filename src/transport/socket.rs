//! Socket variants behind the uniform [`TransportSocket`] contract.
//!
//! The transport kind is selected once, when the protocol identifier is
//! parsed; nothing in the send or connect paths branches on protocol
//! strings again. The four variants reconcile very different socket
//! semantics behind one interface:
//!
//! - UDP and unconnected Unix datagrams are fire-and-forget; they are
//!   writable as soon as the socket exists.
//! - Connected Unix datagrams perform a real connect and can report
//!   congestion (`WouldBlock`) when the kernel send buffer fills.
//! - Streams (TCP, TLS) connect with a bounded timeout and report peer
//!   closure at any point of the connection's life.

use std::io;
use std::net::SocketAddr;
#[cfg(unix)]
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::time::Duration;

use async_trait::async_trait;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpStream, UdpSocket, lookup_host};
use tracing::{debug, trace};

use crate::core::constants::FALLBACK_MAX_DATAGRAM;
use crate::core::error::{ConfigError, TransportError};
use crate::transport::queue::Endpoint;

#[cfg(unix)]
use tokio::net::UnixDatagram;

#[cfg(feature = "tls")]
use std::sync::Arc;

/// The transport mechanism carrying encoded records.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransportKind {
    /// Connectionless UDP datagrams.
    Udp,
    /// Plain TCP stream.
    Tcp,
    /// TLS-wrapped TCP stream.
    Tls,
    /// Unix datagram socket, unconnected (`send_to` per datagram).
    UnixDatagram,
    /// Unix datagram socket with an explicit connect handshake.
    UnixConnect,
}

impl TransportKind {
    /// Whether each send is an independent packet.
    pub fn is_datagram(self) -> bool {
        matches!(self, Self::Udp | Self::UnixDatagram | Self::UnixConnect)
    }

    /// Whether bytes are written to an ordered byte stream.
    pub fn is_stream(self) -> bool {
        !self.is_datagram()
    }
}

/// Address family for IP transports.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AddrFamily {
    /// IPv4.
    V4,
    /// IPv6.
    V6,
}

/// Parsed protocol identifier: transport kind plus address family.
///
/// Computed once at configuration time from identifiers like `udp4` or
/// `unix-connect`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Protocol {
    /// Selected transport mechanism.
    pub kind: TransportKind,
    /// Address family; `None` for Unix-domain transports.
    pub family: Option<AddrFamily>,
}

impl Protocol {
    /// Whether the selected transport is a datagram transport.
    pub fn is_datagram(&self) -> bool {
        self.kind.is_datagram()
    }
}

impl FromStr for Protocol {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (kind, family) = match s {
            "udp4" => (TransportKind::Udp, Some(AddrFamily::V4)),
            "udp6" => (TransportKind::Udp, Some(AddrFamily::V6)),
            "tcp4" => (TransportKind::Tcp, Some(AddrFamily::V4)),
            "tcp6" => (TransportKind::Tcp, Some(AddrFamily::V6)),
            "tls4" => (TransportKind::Tls, Some(AddrFamily::V4)),
            "tls6" => (TransportKind::Tls, Some(AddrFamily::V6)),
            "unix" => (TransportKind::UnixDatagram, None),
            "unix-connect" => (TransportKind::UnixConnect, None),
            other => return Err(ConfigError::UnknownProtocol(other.to_string())),
        };
        Ok(Protocol { kind, family })
    }
}

/// Outcome of a single transmission attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SendStatus {
    /// The payload was handed to the kernel.
    Sent,
    /// The kernel send buffer is full; the payload was not transmitted and
    /// must be re-queued until the socket reports writability.
    Congested,
}

/// Uniform delivery contract over the four socket variants.
///
/// A socket is exclusively owned by one connection manager and all calls
/// happen on that manager's single control path.
#[async_trait]
pub trait TransportSocket: Send {
    /// The variant behind this handle.
    fn kind(&self) -> TransportKind;

    /// Maximum safe unit for a single send, queried from the kernel at
    /// open time. `None` for stream transports, which never chunk.
    fn max_datagram_size(&self) -> Option<usize>;

    /// Attempt to transmit one payload.
    ///
    /// `destination` carries the resend address for datagram transports;
    /// stream transports ignore it.
    async fn send(
        &mut self,
        payload: &[u8],
        destination: Option<&Endpoint>,
    ) -> Result<SendStatus, TransportError>;

    /// Wait until a congested socket can accept data again.
    async fn writable(&mut self) -> Result<(), TransportError>;

    /// Resolve when the peer closes a stream connection.
    ///
    /// Pends forever for datagram sockets, which have no peer lifecycle.
    async fn peer_closed(&mut self) -> TransportError;
}

/// TLS client options, passed through opaquely to the TLS handshake.
#[cfg(feature = "tls")]
#[derive(Clone)]
pub struct TlsOptions {
    /// rustls client configuration (roots, client auth, versions).
    pub client_config: Arc<rustls::ClientConfig>,
    /// Server name presented during the handshake; defaults to the
    /// configured host.
    pub server_name: Option<String>,
}

#[cfg(feature = "tls")]
impl std::fmt::Debug for TlsOptions {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TlsOptions")
            .field("server_name", &self.server_name)
            .finish_non_exhaustive()
    }
}

/// Allocates sockets for the configured protocol.
///
/// This is the seam the connection manager uses to (re)create sockets; the
/// tests substitute a scripted implementation to drive the state machine
/// without real I/O.
#[async_trait]
pub trait Connector: Send {
    /// The transport kind this connector produces.
    fn kind(&self) -> TransportKind;

    /// Open a fresh socket handle.
    async fn open(&mut self) -> Result<Box<dyn TransportSocket>, TransportError>;
}

/// Real connector building tokio sockets from the parsed configuration.
#[derive(Debug)]
pub struct SocketConnector {
    protocol: Protocol,
    endpoint: Endpoint,
    connect_timeout: Duration,
    #[cfg(feature = "tls")]
    tls: Option<TlsOptions>,
}

impl SocketConnector {
    /// Create a connector for the given protocol and endpoint.
    pub fn new(
        protocol: Protocol,
        endpoint: Endpoint,
        connect_timeout: Duration,
        #[cfg(feature = "tls")] tls: Option<TlsOptions>,
    ) -> Self {
        Self {
            protocol,
            endpoint,
            connect_timeout,
            #[cfg(feature = "tls")]
            tls,
        }
    }
}

#[async_trait]
impl Connector for SocketConnector {
    fn kind(&self) -> TransportKind {
        self.protocol.kind
    }

    async fn open(&mut self) -> Result<Box<dyn TransportSocket>, TransportError> {
        match self.protocol.kind {
            TransportKind::Udp => {
                let sock = UdpTransport::open(&self.endpoint, self.protocol.family).await?;
                Ok(Box::new(sock))
            }
            #[cfg(unix)]
            TransportKind::UnixDatagram => {
                let path = unix_path(&self.endpoint)?;
                let sock = UnixDatagramTransport::open_unconnected(path)?;
                Ok(Box::new(sock))
            }
            #[cfg(unix)]
            TransportKind::UnixConnect => {
                let path = unix_path(&self.endpoint)?;
                let sock = UnixDatagramTransport::open_connected(path).await?;
                Ok(Box::new(sock))
            }
            #[cfg(not(unix))]
            TransportKind::UnixDatagram | TransportKind::UnixConnect => {
                Err(TransportError::connect(io::Error::new(
                    io::ErrorKind::Unsupported,
                    "unix domain sockets are not supported on this platform",
                )))
            }
            TransportKind::Tcp | TransportKind::Tls => {
                #[cfg(feature = "tls")]
                let tls = if self.protocol.kind == TransportKind::Tls {
                    self.tls.clone()
                } else {
                    None
                };
                #[cfg(not(feature = "tls"))]
                let tls = None;
                let sock = StreamTransport::open(
                    &self.endpoint,
                    self.protocol,
                    self.connect_timeout,
                    tls,
                )
                .await?;
                Ok(Box::new(sock))
            }
        }
    }
}

#[cfg(unix)]
fn unix_path(endpoint: &Endpoint) -> Result<&Path, TransportError> {
    match endpoint {
        Endpoint::Path(path) => Ok(path),
        Endpoint::Inet { .. } => Err(TransportError::connect(io::Error::new(
            io::ErrorKind::InvalidInput,
            "unix transport requires a path endpoint",
        ))),
    }
}

async fn resolve(
    host: &str,
    port: u16,
    family: Option<AddrFamily>,
) -> Result<SocketAddr, TransportError> {
    let mut addrs = lookup_host((host, port))
        .await
        .map_err(TransportError::connect)?;
    addrs
        .find(|addr| match family {
            Some(AddrFamily::V4) => addr.is_ipv4(),
            Some(AddrFamily::V6) => addr.is_ipv6(),
            None => true,
        })
        .ok_or_else(|| {
            TransportError::connect(io::Error::new(
                io::ErrorKind::NotFound,
                format!("no {family:?} address found for {host}"),
            ))
        })
}

/// Query SO_SNDBUF for the maximum safe datagram unit.
#[cfg(unix)]
fn send_buffer_size<S: std::os::fd::AsFd>(sock: &S) -> usize {
    socket2::SockRef::from(sock)
        .send_buffer_size()
        .unwrap_or(FALLBACK_MAX_DATAGRAM)
}

// =============================================================================
// UDP
// =============================================================================

/// Connectionless UDP datagram socket.
///
/// Ready immediately after binding; every send is an independent packet
/// addressed to the collector resolved at open time.
#[derive(Debug)]
pub struct UdpTransport {
    socket: UdpSocket,
    peer: SocketAddr,
    max_unit: usize,
}

impl UdpTransport {
    /// Bind a wildcard socket for the configured family and resolve the
    /// collector address.
    pub async fn open(
        endpoint: &Endpoint,
        family: Option<AddrFamily>,
    ) -> Result<Self, TransportError> {
        let Endpoint::Inet { host, port } = endpoint else {
            return Err(TransportError::connect(io::Error::new(
                io::ErrorKind::InvalidInput,
                "udp transport requires a host/port endpoint",
            )));
        };
        let peer = resolve(host, *port, family).await?;
        let bind_addr = if peer.is_ipv6() { "[::]:0" } else { "0.0.0.0:0" };
        let socket = UdpSocket::bind(bind_addr)
            .await
            .map_err(TransportError::connect)?;

        #[cfg(unix)]
        let max_unit = send_buffer_size(&socket).min(FALLBACK_MAX_DATAGRAM);
        #[cfg(not(unix))]
        let max_unit = FALLBACK_MAX_DATAGRAM;

        debug!(%peer, max_unit, "udp socket ready");
        Ok(Self { socket, peer, max_unit })
    }
}

#[async_trait]
impl TransportSocket for UdpTransport {
    fn kind(&self) -> TransportKind {
        TransportKind::Udp
    }

    fn max_datagram_size(&self) -> Option<usize> {
        Some(self.max_unit)
    }

    async fn send(
        &mut self,
        payload: &[u8],
        _destination: Option<&Endpoint>,
    ) -> Result<SendStatus, TransportError> {
        // The endpoint is immutable per client; the address resolved at
        // open time stands in for any queued destination.
        self.socket
            .send_to(payload, self.peer)
            .await
            .map_err(TransportError::send)?;
        trace!(len = payload.len(), "udp datagram sent");
        Ok(SendStatus::Sent)
    }

    async fn writable(&mut self) -> Result<(), TransportError> {
        Ok(())
    }

    async fn peer_closed(&mut self) -> TransportError {
        std::future::pending().await
    }
}

// =============================================================================
// UNIX DATAGRAM (connected and unconnected)
// =============================================================================

/// Unix datagram socket addressed by filesystem path.
///
/// In unconnected mode each send targets the path explicitly and a missing
/// listener surfaces as a transient send error. In connected mode the
/// socket performs a real connect at open, and a full kernel send buffer
/// reports congestion instead of blocking the control path.
#[cfg(unix)]
#[derive(Debug)]
pub struct UnixDatagramTransport {
    socket: UnixDatagram,
    path: PathBuf,
    connected: bool,
    max_unit: usize,
}

#[cfg(unix)]
impl UnixDatagramTransport {
    /// Create an unbound socket; sends address the path per datagram.
    pub fn open_unconnected(path: &Path) -> Result<Self, TransportError> {
        let socket = UnixDatagram::unbound().map_err(TransportError::connect)?;
        let max_unit = send_buffer_size(&socket);
        debug!(path = %path.display(), max_unit, "unix datagram socket ready");
        Ok(Self {
            socket,
            path: path.to_path_buf(),
            connected: false,
            max_unit,
        })
    }

    /// Create a socket and connect it to the listener at `path`.
    ///
    /// Fails immediately when no listener exists; the caller queues the
    /// current message and retries on the next log call. Writable readiness
    /// is established here so that a later `try_send` returning `WouldBlock`
    /// means genuine kernel back-pressure, not merely unobserved readiness
    /// on a fresh socket.
    pub async fn open_connected(path: &Path) -> Result<Self, TransportError> {
        let socket = UnixDatagram::unbound().map_err(TransportError::connect)?;
        socket.connect(path).map_err(TransportError::connect)?;
        socket.writable().await.map_err(TransportError::connect)?;
        let max_unit = send_buffer_size(&socket);
        debug!(path = %path.display(), max_unit, "unix datagram socket connected");
        Ok(Self {
            socket,
            path: path.to_path_buf(),
            connected: true,
            max_unit,
        })
    }
}

#[cfg(unix)]
#[async_trait]
impl TransportSocket for UnixDatagramTransport {
    fn kind(&self) -> TransportKind {
        if self.connected {
            TransportKind::UnixConnect
        } else {
            TransportKind::UnixDatagram
        }
    }

    fn max_datagram_size(&self) -> Option<usize> {
        Some(self.max_unit)
    }

    async fn send(
        &mut self,
        payload: &[u8],
        destination: Option<&Endpoint>,
    ) -> Result<SendStatus, TransportError> {
        if self.connected {
            // try_send keeps the control path non-blocking so a full send
            // buffer becomes a congestion signal, not a stall.
            match self.socket.try_send(payload) {
                Ok(_) => Ok(SendStatus::Sent),
                Err(e) if e.kind() == io::ErrorKind::WouldBlock => {
                    debug!("unix datagram socket congested");
                    Ok(SendStatus::Congested)
                }
                Err(e) => Err(TransportError::send(e)),
            }
        } else {
            let path = match destination {
                Some(Endpoint::Path(p)) => p.as_path(),
                _ => self.path.as_path(),
            };
            self.socket
                .send_to(payload, path)
                .await
                .map_err(TransportError::send)?;
            Ok(SendStatus::Sent)
        }
    }

    async fn writable(&mut self) -> Result<(), TransportError> {
        self.socket.writable().await.map_err(TransportError::send)
    }

    async fn peer_closed(&mut self) -> TransportError {
        std::future::pending().await
    }
}

// =============================================================================
// STREAM (TCP / TLS)
// =============================================================================

#[derive(Debug)]
enum StreamInner {
    Tcp(TcpStream),
    #[cfg(feature = "tls")]
    Tls(Box<tokio_rustls::client::TlsStream<TcpStream>>),
}

/// Connection-oriented stream transport.
///
/// Keep-alive and no-delay are enabled unconditionally. For TLS the secure
/// handshake happens inside `open` and is opaque to the rest of the
/// engine. The whole open is bounded by the connect timeout.
#[derive(Debug)]
pub struct StreamTransport {
    inner: StreamInner,
    kind: TransportKind,
}

impl StreamTransport {
    /// Connect (and handshake, for TLS) within `connect_timeout`.
    pub async fn open(
        endpoint: &Endpoint,
        protocol: Protocol,
        connect_timeout: Duration,
        #[cfg(feature = "tls")] tls: Option<TlsOptions>,
        #[cfg(not(feature = "tls"))] _tls: Option<()>,
    ) -> Result<Self, TransportError> {
        let Endpoint::Inet { host, port } = endpoint else {
            return Err(TransportError::connect(io::Error::new(
                io::ErrorKind::InvalidInput,
                "stream transport requires a host/port endpoint",
            )));
        };

        let connect = async {
            let addr = resolve(host, *port, protocol.family).await?;
            let stream = TcpStream::connect(addr)
                .await
                .map_err(TransportError::connect)?;
            stream.set_nodelay(true).map_err(TransportError::connect)?;
            #[cfg(unix)]
            socket2::SockRef::from(&stream)
                .set_keepalive(true)
                .map_err(TransportError::connect)?;

            #[cfg(feature = "tls")]
            if let Some(tls) = &tls {
                let name = tls.server_name.clone().unwrap_or_else(|| host.clone());
                let server_name = rustls::pki_types::ServerName::try_from(name)
                    .map_err(|e| TransportError::connect(io::Error::other(e)))?;
                let connector = tokio_rustls::TlsConnector::from(tls.client_config.clone());
                let stream = connector
                    .connect(server_name, stream)
                    .await
                    .map_err(TransportError::connect)?;
                debug!(%addr, "tls stream ready");
                return Ok(Self {
                    inner: StreamInner::Tls(Box::new(stream)),
                    kind: TransportKind::Tls,
                });
            }

            debug!(%addr, "tcp stream ready");
            Ok(Self {
                inner: StreamInner::Tcp(stream),
                kind: protocol.kind,
            })
        };

        match tokio::time::timeout(connect_timeout, connect).await {
            Ok(result) => result,
            Err(_) => Err(TransportError::Timeout(connect_timeout)),
        }
    }
}

#[async_trait]
impl TransportSocket for StreamTransport {
    fn kind(&self) -> TransportKind {
        self.kind
    }

    fn max_datagram_size(&self) -> Option<usize> {
        None
    }

    async fn send(
        &mut self,
        payload: &[u8],
        _destination: Option<&Endpoint>,
    ) -> Result<SendStatus, TransportError> {
        let result = match &mut self.inner {
            StreamInner::Tcp(stream) => match stream.write_all(payload).await {
                Ok(()) => stream.flush().await,
                Err(e) => Err(e),
            },
            #[cfg(feature = "tls")]
            StreamInner::Tls(stream) => match stream.write_all(payload).await {
                Ok(()) => stream.flush().await,
                Err(e) => Err(e),
            },
        };
        result.map_err(TransportError::send)?;
        trace!(len = payload.len(), "stream write complete");
        Ok(SendStatus::Sent)
    }

    async fn writable(&mut self) -> Result<(), TransportError> {
        Ok(())
    }

    async fn peer_closed(&mut self) -> TransportError {
        // Collectors never send application data; any read completion
        // means the connection is gone (EOF) or broken.
        let mut buf = [0u8; 512];
        loop {
            let read = match &mut self.inner {
                StreamInner::Tcp(stream) => stream.read(&mut buf).await,
                #[cfg(feature = "tls")]
                StreamInner::Tls(stream) => stream.read(&mut buf).await,
            };
            match read {
                Ok(0) => return TransportError::Closed,
                Ok(n) => {
                    trace!(len = n, "discarding unexpected bytes from collector");
                }
                Err(e) => return TransportError::send(e),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_protocol_parse_all_identifiers() {
        let cases = [
            ("udp4", TransportKind::Udp, Some(AddrFamily::V4)),
            ("udp6", TransportKind::Udp, Some(AddrFamily::V6)),
            ("tcp4", TransportKind::Tcp, Some(AddrFamily::V4)),
            ("tcp6", TransportKind::Tcp, Some(AddrFamily::V6)),
            ("tls4", TransportKind::Tls, Some(AddrFamily::V4)),
            ("tls6", TransportKind::Tls, Some(AddrFamily::V6)),
            ("unix", TransportKind::UnixDatagram, None),
            ("unix-connect", TransportKind::UnixConnect, None),
        ];
        for (s, kind, family) in cases {
            let p: Protocol = s.parse().unwrap();
            assert_eq!(p.kind, kind, "{s}");
            assert_eq!(p.family, family, "{s}");
        }
    }

    #[test]
    fn test_protocol_parse_rejects_unknown() {
        assert!("udp".parse::<Protocol>().is_err());
        assert!("tcp".parse::<Protocol>().is_err());
        assert!("sctp4".parse::<Protocol>().is_err());
        assert!("".parse::<Protocol>().is_err());
    }

    #[test]
    fn test_datagram_vs_stream_kinds() {
        assert!(TransportKind::Udp.is_datagram());
        assert!(TransportKind::UnixDatagram.is_datagram());
        assert!(TransportKind::UnixConnect.is_datagram());
        assert!(TransportKind::Tcp.is_stream());
        assert!(TransportKind::Tls.is_stream());
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_fresh_connected_unix_socket_sends_without_congestion() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("collector.sock");
        let listener = UnixDatagram::bind(&path).unwrap();

        // A just-connected socket with an idle kernel buffer must deliver
        // immediately; only genuine back-pressure may report Congested.
        let mut transport = UnixDatagramTransport::open_connected(&path).await.unwrap();
        let status = transport.send(b"first", None).await.unwrap();
        assert_eq!(status, SendStatus::Sent);

        let mut buf = [0u8; 64];
        let len = listener.recv(&mut buf).await.unwrap();
        assert_eq!(&buf[..len], b"first");
    }

    #[tokio::test]
    async fn test_resolve_loopback_v4() {
        let addr = resolve("127.0.0.1", 514, Some(AddrFamily::V4)).await.unwrap();
        assert!(addr.is_ipv4());
        assert_eq!(addr.port(), 514);
    }

    #[tokio::test]
    async fn test_resolve_family_mismatch() {
        let err = resolve("127.0.0.1", 514, Some(AddrFamily::V6)).await.unwrap_err();
        assert!(err.is_connect());
    }
}
