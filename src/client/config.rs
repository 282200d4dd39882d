//! Delivery client configuration.
//!
//! Built through [`SyslogConfigBuilder`], which validates the protocol
//! identifier and the per-transport requirements once, at build time. The
//! resulting [`SyslogConfig`] is immutable for the life of the client.

use std::path::PathBuf;
use std::time::Duration;

use crate::core::constants::{CONNECT_TIMEOUT, DEFAULT_HOST, DEFAULT_LOCALHOST, DEFAULT_PORT};
use crate::core::error::ConfigError;
use crate::transport::queue::Endpoint;
use crate::transport::socket::Protocol;
#[cfg(feature = "tls")]
use crate::transport::socket::TlsOptions;
use crate::transport::socket::TransportKind;
use crate::wire::{Facility, Producer, SyslogFormat};

/// Validated client configuration.
#[derive(Debug, Clone)]
pub struct SyslogConfig {
    /// Collector hostname or address (IP transports).
    pub host: String,
    /// Collector port (IP transports).
    pub port: u16,
    /// Collector socket path (Unix transports).
    pub path: Option<PathBuf>,
    /// Parsed transport protocol.
    pub protocol: Protocol,
    /// Hostname reported as record origin.
    pub localhost: String,
    /// Wire format of the embedded encoder.
    pub format: SyslogFormat,
    /// Facility stamped into every record.
    pub facility: Facility,
    /// Application name reported in each record.
    pub app_name: String,
    /// Process id reported in each record.
    pub pid: u32,
    /// Suffix appended to every message before transmission.
    pub end_of_line: String,
    /// Budget for connect (and TLS handshake) on stream transports.
    pub connect_timeout: Duration,
    /// TLS client options, required when the protocol is `tls4`/`tls6`.
    #[cfg(feature = "tls")]
    pub tls: Option<TlsOptions>,
}

impl SyslogConfig {
    /// Start building a configuration from defaults.
    pub fn builder() -> SyslogConfigBuilder {
        SyslogConfigBuilder::default()
    }

    /// The collector endpoint for the configured transport.
    pub fn endpoint(&self) -> Endpoint {
        match (&self.path, self.protocol.kind) {
            (Some(path), TransportKind::UnixDatagram | TransportKind::UnixConnect) => {
                Endpoint::Path(path.clone())
            }
            _ => Endpoint::Inet {
                host: self.host.clone(),
                port: self.port,
            },
        }
    }

    /// The record encoder derived from this configuration.
    pub fn producer(&self) -> Producer {
        Producer {
            format: self.format,
            facility: self.facility,
            hostname: self.localhost.clone(),
            app_name: self.app_name.clone(),
            pid: self.pid,
        }
    }
}

/// Builder for [`SyslogConfig`].
///
/// Every setter has a sensible default; `build` only fails on genuinely
/// invalid combinations (unknown protocol, Unix transport without a path,
/// TLS transport without TLS options).
#[derive(Debug, Clone)]
pub struct SyslogConfigBuilder {
    host: String,
    port: u16,
    path: Option<PathBuf>,
    protocol: String,
    localhost: Option<String>,
    format: SyslogFormat,
    facility: Facility,
    app_name: Option<String>,
    pid: Option<u32>,
    end_of_line: String,
    connect_timeout: Duration,
    #[cfg(feature = "tls")]
    tls: Option<TlsOptions>,
}

impl Default for SyslogConfigBuilder {
    fn default() -> Self {
        Self {
            host: DEFAULT_HOST.to_string(),
            port: DEFAULT_PORT,
            path: None,
            protocol: "udp4".to_string(),
            localhost: None,
            format: SyslogFormat::default(),
            facility: Facility::default(),
            app_name: None,
            pid: None,
            end_of_line: "\n".to_string(),
            connect_timeout: CONNECT_TIMEOUT,
            #[cfg(feature = "tls")]
            tls: None,
        }
    }
}

impl SyslogConfigBuilder {
    /// Collector hostname or address. Default `localhost`.
    pub fn host(mut self, host: impl Into<String>) -> Self {
        self.host = host.into();
        self
    }

    /// Collector port. Default 514.
    pub fn port(mut self, port: u16) -> Self {
        self.port = port;
        self
    }

    /// Unix-domain socket path. Required for `unix` and `unix-connect`.
    pub fn path(mut self, path: impl Into<PathBuf>) -> Self {
        self.path = Some(path.into());
        self
    }

    /// Transport protocol identifier (`udp4`, `udp6`, `tcp4`, `tcp6`,
    /// `tls4`, `tls6`, `unix`, `unix-connect`). Default `udp4`.
    pub fn protocol(mut self, protocol: impl Into<String>) -> Self {
        self.protocol = protocol.into();
        self
    }

    /// Hostname reported as record origin. Default `localhost`.
    pub fn localhost(mut self, localhost: impl Into<String>) -> Self {
        self.localhost = Some(localhost.into());
        self
    }

    /// Wire format. Default BSD (RFC 3164).
    pub fn format(mut self, format: SyslogFormat) -> Self {
        self.format = format;
        self
    }

    /// Facility. Default `local0`.
    pub fn facility(mut self, facility: Facility) -> Self {
        self.facility = facility;
        self
    }

    /// Application name. Defaults to the current executable's file name.
    pub fn app_name(mut self, app_name: impl Into<String>) -> Self {
        self.app_name = Some(app_name.into());
        self
    }

    /// Process id reported in records. Defaults to the current process.
    pub fn pid(mut self, pid: u32) -> Self {
        self.pid = Some(pid);
        self
    }

    /// Suffix appended to every message. Default `"\n"`.
    pub fn end_of_line(mut self, eol: impl Into<String>) -> Self {
        self.end_of_line = eol.into();
        self
    }

    /// Connect budget for stream transports. Default 10 seconds.
    pub fn connect_timeout(mut self, timeout: Duration) -> Self {
        self.connect_timeout = timeout;
        self
    }

    /// TLS client options for `tls4`/`tls6`.
    #[cfg(feature = "tls")]
    pub fn tls(mut self, tls: TlsOptions) -> Self {
        self.tls = Some(tls);
        self
    }

    /// Validate and produce the final configuration.
    pub fn build(self) -> Result<SyslogConfig, ConfigError> {
        let protocol: Protocol = self.protocol.parse()?;

        match protocol.kind {
            TransportKind::UnixDatagram | TransportKind::UnixConnect if self.path.is_none() => {
                return Err(ConfigError::MissingPath);
            }
            #[cfg(feature = "tls")]
            TransportKind::Tls if self.tls.is_none() => {
                return Err(ConfigError::MissingTlsConfig);
            }
            #[cfg(not(feature = "tls"))]
            TransportKind::Tls => {
                return Err(ConfigError::TlsDisabled(self.protocol));
            }
            _ => {}
        }

        Ok(SyslogConfig {
            host: self.host,
            port: self.port,
            path: self.path,
            protocol,
            localhost: self.localhost.unwrap_or_else(|| DEFAULT_LOCALHOST.to_string()),
            format: self.format,
            facility: self.facility,
            app_name: self.app_name.unwrap_or_else(default_app_name),
            pid: self.pid.unwrap_or_else(std::process::id),
            end_of_line: self.end_of_line,
            connect_timeout: self.connect_timeout,
            #[cfg(feature = "tls")]
            tls: self.tls,
        })
    }
}

/// Executable file name, falling back to an empty tag when unavailable.
fn default_app_name() -> String {
    std::env::current_exe()
        .ok()
        .and_then(|p| p.file_name().map(|n| n.to_string_lossy().into_owned()))
        .unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = SyslogConfig::builder().build().unwrap();
        assert_eq!(config.host, "localhost");
        assert_eq!(config.port, 514);
        assert_eq!(config.protocol.kind, TransportKind::Udp);
        assert_eq!(config.localhost, "localhost");
        assert_eq!(config.facility, Facility::Local0);
        assert_eq!(config.format, SyslogFormat::Bsd);
        assert_eq!(config.end_of_line, "\n");
        assert_eq!(config.pid, std::process::id());
    }

    #[test]
    fn test_unknown_protocol_rejected() {
        let err = SyslogConfig::builder().protocol("sctp4").build().unwrap_err();
        assert!(matches!(err, ConfigError::UnknownProtocol(_)));
    }

    #[test]
    fn test_unix_protocol_requires_path() {
        for protocol in ["unix", "unix-connect"] {
            let err = SyslogConfig::builder().protocol(protocol).build().unwrap_err();
            assert!(matches!(err, ConfigError::MissingPath), "{protocol}");
        }
    }

    #[test]
    #[cfg(feature = "tls")]
    fn test_tls_protocol_requires_options() {
        let err = SyslogConfig::builder().protocol("tls4").build().unwrap_err();
        assert!(matches!(err, ConfigError::MissingTlsConfig));
    }

    #[test]
    fn test_unix_endpoint_uses_path() {
        let config = SyslogConfig::builder()
            .protocol("unix")
            .path("/dev/log")
            .build()
            .unwrap();
        assert_eq!(config.endpoint(), Endpoint::Path(PathBuf::from("/dev/log")));
    }

    #[test]
    fn test_inet_endpoint_uses_host_port() {
        let config = SyslogConfig::builder()
            .host("logs.example.com")
            .port(6514)
            .protocol("tcp4")
            .build()
            .unwrap();
        assert_eq!(
            config.endpoint(),
            Endpoint::Inet {
                host: "logs.example.com".to_string(),
                port: 6514,
            }
        );
    }
}
