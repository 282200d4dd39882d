//! Transport layer: sockets, the outbound queue and connection management.
//!
//! Layout mirrors the delivery pipeline:
//! - [`socket`] opens and drives the concrete socket types (UDP, TCP, TLS,
//!   Unix-domain datagram) behind the [`TransportSocket`] trait
//! - [`queue`] buffers encoded messages while no socket is usable
//! - [`chunk`] splits oversize datagram payloads
//! - [`connection`] ties them together under the connection state machine

pub mod chunk;
pub mod connection;
pub mod queue;
pub mod socket;

pub use connection::{
    ConnectionManager, ConnectionState, Event, RetryState, Signal, SubmitOutcome,
};
pub use queue::{Endpoint, OutboundQueue, PendingMessage};
#[cfg(feature = "tls")]
pub use socket::TlsOptions;
pub use socket::{Connector, Protocol, SendStatus, SocketConnector, TransportKind, TransportSocket};
