//! Outbound FIFO queue of encoded messages awaiting transmission.

use std::collections::VecDeque;
use std::path::PathBuf;

use bytes::Bytes;

/// Where a payload is delivered.
///
/// IP transports address the collector by host and port; Unix-domain
/// transports by filesystem path. Immutable after construction.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Endpoint {
    /// IP endpoint (UDP, TCP, TLS).
    Inet {
        /// Collector hostname or address.
        host: String,
        /// Collector port.
        port: u16,
    },
    /// Unix-domain socket path.
    Path(PathBuf),
}

/// An encoded payload waiting to be sent.
///
/// Datagram sends carry the destination needed to resend the payload after
/// a socket is re-created; stream payloads are written to whichever
/// connection is live at drain time.
#[derive(Debug, Clone)]
pub struct PendingMessage {
    /// Encoded wire bytes. Cheap to clone (refcounted).
    pub payload: Bytes,
    /// Resend destination for datagram transports.
    pub destination: Option<Endpoint>,
}

impl PendingMessage {
    /// Create a pending message.
    pub fn new(payload: Bytes, destination: Option<Endpoint>) -> Self {
        Self { payload, destination }
    }
}

/// Ordered buffer of pending messages, drained in enqueue order.
///
/// The queue lives on the delivery task's single control path, so there is
/// never more than one drain in progress.
#[derive(Debug, Default)]
pub struct OutboundQueue {
    items: VecDeque<PendingMessage>,
}

impl OutboundQueue {
    /// Create an empty queue.
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a message at the back.
    pub fn enqueue(&mut self, message: PendingMessage) {
        self.items.push_back(message);
    }

    /// Put a message back at the front after a failed transmission attempt,
    /// preserving its position relative to everything behind it.
    pub fn requeue_front(&mut self, message: PendingMessage) {
        self.items.push_front(message);
    }

    /// Take the next message in FIFO order.
    pub fn pop(&mut self) -> Option<PendingMessage> {
        self.items.pop_front()
    }

    /// Number of queued messages.
    pub fn len(&self) -> usize {
        self.items.len()
    }

    /// Whether the queue is empty.
    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    /// Iterate the queued messages front to back without consuming them.
    pub fn iter(&self) -> impl Iterator<Item = &PendingMessage> {
        self.items.iter()
    }

    /// Drop every queued message. Used after a whole-backlog stream write
    /// succeeds.
    pub fn clear(&mut self) {
        self.items.clear();
    }
}
