//! Error types for the syslog delivery client.

use std::io;
use std::time::Duration;

use thiserror::Error;

/// Errors raised while building a [`SyslogConfig`](crate::client::SyslogConfig).
///
/// These are fatal at construction time and never retried.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// The protocol identifier is not one of the recognized values.
    #[error("unknown protocol: {0:?} (expected udp4, udp6, tcp4, tcp6, tls4, tls6, unix or unix-connect)")]
    UnknownProtocol(String),

    /// A Unix-domain protocol was selected without a socket path.
    #[error("`path` is required on unix datagram sockets")]
    MissingPath,

    /// A TLS protocol was selected without TLS client options.
    #[error("`protocol_options` with a TLS client config is required on tls sockets")]
    MissingTlsConfig,

    /// A TLS protocol was selected but the `tls` feature is disabled.
    #[error("protocol {0:?} requires the `tls` cargo feature")]
    TlsDisabled(String),

    /// The facility name is not a recognized syslog facility.
    #[error("unknown facility: {0:?}")]
    UnknownFacility(String),
}

/// I/O failures in the transport layer, tagged with their underlying cause.
///
/// All of these are transient from the engine's point of view: they are
/// converted into queueing decisions and surfaced as
/// [`Event::Error`](crate::transport::Event) rather than terminating anything.
#[derive(Debug, Error)]
pub enum TransportError {
    /// Opening the socket (or the stream/TLS handshake) failed.
    #[error("connect failed: {source}")]
    Connect {
        /// Underlying socket error.
        #[source]
        source: io::Error,
    },

    /// A write or datagram send failed on a live socket.
    #[error("send failed: {source}")]
    Send {
        /// Underlying socket error.
        #[source]
        source: io::Error,
    },

    /// The peer closed a stream connection.
    #[error("connection closed by peer")]
    Closed,

    /// A stream never became ready within the connect timeout.
    #[error("connect timed out after {0:?}")]
    Timeout(Duration),
}

impl TransportError {
    /// Tag a connect-phase I/O error.
    pub fn connect(source: io::Error) -> Self {
        Self::Connect { source }
    }

    /// Tag a send-phase I/O error.
    pub fn send(source: io::Error) -> Self {
        Self::Send { source }
    }

    /// Whether this error was raised while establishing the connection.
    pub fn is_connect(&self) -> bool {
        matches!(self, Self::Connect { .. } | Self::Timeout(_))
    }
}

/// Top-level error type aggregating all layers.
#[derive(Debug, Error)]
pub enum SyslogError {
    /// Configuration error.
    #[error("configuration error: {0}")]
    Config(#[from] ConfigError),

    /// Transport error.
    #[error("transport error: {0}")]
    Transport(#[from] TransportError),

    /// I/O error.
    #[error("i/o error: {0}")]
    Io(#[from] io::Error),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_transport_error_cause_tags() {
        let e = TransportError::connect(io::Error::from(io::ErrorKind::ConnectionRefused));
        assert!(e.is_connect());
        assert!(e.to_string().starts_with("connect failed"));

        let e = TransportError::send(io::Error::from(io::ErrorKind::BrokenPipe));
        assert!(!e.is_connect());
        assert!(e.to_string().starts_with("send failed"));
    }

    #[test]
    fn test_timeout_is_connect_class() {
        assert!(TransportError::Timeout(Duration::from_secs(10)).is_connect());
    }
}
