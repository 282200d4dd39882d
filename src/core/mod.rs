//! Core constants and error types, shared by every layer.

pub mod constants;
pub mod error;

pub use error::{ConfigError, SyslogError, TransportError};
