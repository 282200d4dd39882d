//! Fixed defaults and policy constants for the delivery engine.

use std::time::Duration;

// =============================================================================
// ENDPOINT DEFAULTS
// =============================================================================

/// Default collector hostname.
pub const DEFAULT_HOST: &str = "localhost";

/// Default syslog collector port.
pub const DEFAULT_PORT: u16 = 514;

/// Hostname reported as the origin of each record unless overridden.
pub const DEFAULT_LOCALHOST: &str = "localhost";

// =============================================================================
// CONNECTION POLICY
// =============================================================================

/// Base interval for reconnect backoff. Successive failures double it.
pub const BACKOFF_BASE: Duration = Duration::from_secs(1);

/// Timeout applied to stream connects (TCP handshake plus, for TLS, the
/// secure handshake). A stream that never becomes ready within this window
/// is destroyed and enters the reconnect path.
pub const CONNECT_TIMEOUT: Duration = Duration::from_secs(10);

/// Maximum number of shutdown poll attempts before the socket is
/// force-closed with pending work still queued.
pub const CLOSE_MAX_ATTEMPTS: u32 = 6;

/// Base wait between shutdown polls; attempt `n` waits `n` times this.
pub const CLOSE_POLL_INTERVAL: Duration = Duration::from_millis(200);

// =============================================================================
// DATAGRAM SIZING
// =============================================================================

/// Fallback maximum datagram unit when the kernel send-buffer size cannot
/// be queried (largest UDP payload over IPv4).
pub const FALLBACK_MAX_DATAGRAM: usize = 65507;

// =============================================================================
// CHANNELS
// =============================================================================

/// Capacity of the command channel between client handle and delivery task.
pub const COMMAND_CHANNEL_CAPACITY: usize = 32;
