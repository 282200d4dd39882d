//! # syslog-courier
//!
//! Reliable syslog delivery over UDP, TCP, TLS and Unix-domain sockets.
//!
//! The crate is a delivery engine for logging front-ends: records are
//! encoded once, then guaranteed never to be silently dropped before the
//! client is closed. When the collector is unreachable, records queue in
//! FIFO order and flush as a batch once the connection recovers. Stream
//! transports reconnect automatically with exponential backoff (1s, 2s,
//! 4s, ...); datagram transports retry lazily on the next log call.
//!
//! ## Feature Flags
//!
//! - `tls` (default): TLS stream transport via rustls
//!
//! ## Modules
//!
//! - [`core`]: Constants and error types
//! - [`wire`]: Severities, facilities and the RFC 3164 / RFC 5424 encoder
//! - [`transport`]: Sockets, the outbound queue and connection management
//! - [`client`]: Configuration and the [`DeliveryClient`] handle
//!
//! ## Example Usage
//!
//! ```rust,no_run
//! use syslog_courier::prelude::*;
//!
//! # async fn demo() -> Result<(), Box<dyn std::error::Error>> {
//! let config = SyslogConfig::builder()
//!     .host("logs.example.com")
//!     .port(514)
//!     .protocol("udp4")
//!     .app_name("demo")
//!     .build()?;
//!
//! let (client, mut events) = DeliveryClient::new(config);
//!
//! client.log("info", "service started").await?;
//! client.log("warning", "disk usage at 91%").await?;
//!
//! // Lifecycle events (errors, close) arrive out of band.
//! tokio::spawn(async move {
//!     while let Some(event) = events.recv().await {
//!         eprintln!("syslog event: {event:?}");
//!     }
//! });
//!
//! client.close().await?;
//! # Ok(())
//! # }
//! ```

#![forbid(unsafe_code)]
#![warn(missing_docs)]
#![cfg_attr(docsrs, feature(doc_cfg))]

pub mod core;

pub mod wire;

pub mod transport;

pub mod client;

/// Prelude module for convenient imports.
pub mod prelude {
    pub use crate::client::{ClientError, Delivery, DeliveryClient, SyslogConfig};
    pub use crate::core::error::{ConfigError, SyslogError, TransportError};
    pub use crate::transport::{ConnectionState, Event};
    #[cfg(feature = "tls")]
    pub use crate::transport::TlsOptions;
    pub use crate::wire::{Facility, Severity, SyslogFormat};
}

// Re-export commonly used items at crate root
pub use client::{ClientError, Delivery, DeliveryClient, SyslogConfig, SyslogConfigBuilder};
pub use core::error::{ConfigError, SyslogError, TransportError};
pub use transport::{ConnectionState, Event};
pub use wire::{Facility, Severity, SyslogFormat};

#[cfg(test)]
mod test {
    use ctor::ctor;

    #[ctor]
    fn init_test_logging() {
        let _ = tracing_subscriber::fmt()
            .with_env_filter(
                tracing_subscriber::EnvFilter::try_from_default_env()
                    .unwrap_or_else(|_| "debug".into()),
            )
            .with_test_writer()
            .try_init();
    }
}
