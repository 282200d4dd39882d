//! Connection lifecycle management for the delivery engine.
//!
//! The connection state machine is a pure transition function from
//! (state, signal) to (state, actions); [`ConnectionManager`] interprets
//! the actions (arming the reconnect timer, flushing the queue) against a
//! real or scripted transport. This keeps the reconnect and backoff logic
//! testable without sockets.
//!
//! All methods run on the delivery task's single control path; there is no
//! concurrent mutation of state, retry counters or the queue.

use bytes::{Bytes, BytesMut};
use tokio::sync::mpsc;
use tokio::time::{Instant, sleep};
use tracing::{debug, trace, warn};

use crate::core::constants::{BACKOFF_BASE, CLOSE_MAX_ATTEMPTS, CLOSE_POLL_INTERVAL};
use crate::core::error::TransportError;
use crate::transport::chunk::chunk_spans;
use crate::transport::queue::{Endpoint, OutboundQueue, PendingMessage};
use crate::transport::socket::{Connector, SendStatus, TransportSocket};

/// Connection lifecycle state.
///
/// Exactly one [`ConnectionManager`] owns this value; every transition
/// happens through [`transition`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    /// No socket, or socket known dead.
    Disconnected,
    /// Socket open in progress.
    Connecting,
    /// Sends proceed directly to the socket.
    Connected,
    /// Kernel send buffer full; sends are queued until writability.
    Congested,
    /// Explicit shutdown; no further state is accepted.
    Closing,
}

/// Lifecycle signals fed into the state machine.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Signal {
    /// A socket open was requested.
    ConnectRequested,
    /// The socket became ready for traffic.
    Ready,
    /// A datagram socket failed to open; no reconnect timer is armed, the
    /// next log call retries.
    ConnectFailed,
    /// The kernel send buffer filled on a connected datagram socket.
    Congestion,
    /// A congested socket can accept data again.
    Writable,
    /// A stream connection closed or failed; enters the reconnect path.
    Closed,
    /// A stream never became ready within the connect timeout.
    Timeout,
    /// A connected datagram socket errored on send; the socket is dropped
    /// and re-created on the next log call.
    SocketError,
    /// Explicit shutdown was requested.
    CloseRequested,
}

/// Side effects the state machine requests from its interpreter.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Action {
    /// Reset the backoff counter after a successful connect.
    ResetBackoff,
    /// Arm the reconnect timer (if not already armed) using the current
    /// backoff interval.
    ScheduleReconnect,
    /// Drain the outbound queue in FIFO order.
    FlushQueue,
}

/// The single transition function of the connection state machine.
///
/// `Closing` is terminal: once entered, every signal is absorbed. A
/// `Closed` signal while already `Disconnected` is deliberately a no-op so
/// that duplicate close events cannot double-schedule reconnection.
pub fn transition(state: ConnectionState, signal: Signal) -> (ConnectionState, &'static [Action]) {
    use Action::*;
    use ConnectionState::*;
    use Signal::*;

    match (state, signal) {
        (Closing, _) => (Closing, &[]),
        (_, CloseRequested) => (Closing, &[]),

        (Disconnected, ConnectRequested) => (Connecting, &[]),
        (Connecting, Ready) => (Connected, &[ResetBackoff, FlushQueue]),
        (Connecting, ConnectFailed) => (Disconnected, &[]),
        (Connecting, Closed | Timeout) => (Disconnected, &[ScheduleReconnect]),

        (Connected, Congestion) => (Congested, &[]),
        (Congested, Writable) => (Connected, &[FlushQueue]),

        (Connected | Congested, Closed | Timeout) => (Disconnected, &[ScheduleReconnect]),
        (Connected | Congested, SocketError) => (Disconnected, &[]),

        (state, _) => (state, &[]),
    }
}

/// Reconnect backoff bookkeeping.
///
/// The delay doubles with every failed attempt (1s, 2s, 4s, ...) without an
/// attempt cap: a long-lived daemon keeps retrying forever. A successful
/// connect resets the counter so the next outage starts from one second.
#[derive(Debug, Default, Clone, Copy)]
pub struct RetryState {
    attempts: u32,
}

impl RetryState {
    /// Fresh state with zero recorded attempts.
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of reconnect attempts since the last successful connect.
    pub fn attempts(&self) -> u32 {
        self.attempts
    }

    /// Delay before the next reconnect attempt: `2^attempts` seconds.
    pub fn next_delay(&self) -> std::time::Duration {
        let factor = 2u64.saturating_pow(self.attempts);
        std::time::Duration::from_secs(BACKOFF_BASE.as_secs().saturating_mul(factor))
    }

    /// Record that a reconnect attempt fired.
    pub fn record_attempt(&mut self) {
        self.attempts = self.attempts.saturating_add(1);
    }

    /// Reset after a successful connect.
    pub fn reset(&mut self) {
        self.attempts = 0;
    }
}

/// Lifecycle events observable by the host logging front-end.
#[derive(Debug)]
pub enum Event {
    /// A record was transmitted or queued for later transmission.
    Logged,
    /// An underlying I/O failure occurred. The affected message was queued
    /// for retransmission, not lost.
    Error(TransportError),
    /// Shutdown completed. `clean` is false when the close budget expired
    /// with work still pending.
    Closed {
        /// Whether the queue was empty and no sends were in flight.
        clean: bool,
    },
}

/// Outcome of submitting one encoded record.
#[derive(Debug)]
pub enum SubmitOutcome {
    /// Handed to the kernel on a live socket.
    Sent,
    /// Queued for the next drain.
    Queued,
    /// The socket could not be opened during this call; the record was
    /// queued and the connect failure is reported to the caller.
    ConnectFailed(TransportError),
}

enum TransmitResult {
    Sent,
    Congested,
    Failed(TransportError),
}

/// Owns the socket, the state machine, the retry state and the outbound
/// queue for one delivery client.
pub struct ConnectionManager {
    connector: Box<dyn Connector>,
    socket: Option<Box<dyn TransportSocket>>,
    state: ConnectionState,
    retry: RetryState,
    queue: OutboundQueue,
    in_flight: usize,
    reconnect_at: Option<Instant>,
    datagram_destination: Option<Endpoint>,
    events: mpsc::UnboundedSender<Event>,
}

impl std::fmt::Debug for ConnectionManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ConnectionManager")
            .field("state", &self.state)
            .field("pending", &self.queue.len())
            .field("attempts", &self.retry.attempts())
            .finish_non_exhaustive()
    }
}

impl ConnectionManager {
    /// Create a manager around a connector.
    pub fn new(connector: Box<dyn Connector>, events: mpsc::UnboundedSender<Event>) -> Self {
        Self {
            connector,
            socket: None,
            state: ConnectionState::Disconnected,
            retry: RetryState::new(),
            queue: OutboundQueue::new(),
            in_flight: 0,
            reconnect_at: None,
            datagram_destination: None,
            events,
        }
    }

    /// Attach a resend destination for datagram payloads.
    pub fn with_datagram_destination(mut self, destination: Option<Endpoint>) -> Self {
        self.datagram_destination = destination;
        self
    }

    /// Current connection state.
    pub fn state(&self) -> ConnectionState {
        self.state
    }

    /// Number of messages awaiting transmission.
    pub fn pending(&self) -> usize {
        self.queue.len()
    }

    /// Deadline of the armed reconnect timer, if any.
    pub fn reconnect_at(&self) -> Option<Instant> {
        self.reconnect_at
    }

    /// Reconnect attempt counter (for observability).
    pub fn retry(&self) -> RetryState {
        self.retry
    }

    /// Apply one signal and run any non-flush actions; returns whether the
    /// transition requested a queue flush.
    fn step(&mut self, signal: Signal) -> bool {
        let (next, actions) = transition(self.state, signal);
        trace!(from = ?self.state, ?signal, to = ?next, "connection transition");
        self.state = next;

        let mut flush = false;
        for action in actions {
            match action {
                Action::ResetBackoff => self.retry.reset(),
                Action::ScheduleReconnect => {
                    // Only one pending reconnect timer at a time.
                    if self.reconnect_at.is_none() {
                        let delay = self.retry.next_delay();
                        self.reconnect_at = Some(Instant::now() + delay);
                        debug!(?delay, attempts = self.retry.attempts(), "reconnect scheduled");
                    }
                }
                Action::FlushQueue => flush = true,
            }
        }
        flush
    }

    /// Feed a signal into the state machine, draining the queue when the
    /// transition asks for it.
    pub async fn signal(&mut self, signal: Signal) {
        if self.step(signal) {
            self.drain().await;
        }
    }

    /// Submit one encoded record for delivery.
    ///
    /// Always attempts to connect first (idempotently). When the transport
    /// is a datagram transport and the payload exceeds its maximum unit,
    /// the payload is split and each chunk is sent independently.
    pub async fn submit(&mut self, payload: Bytes) -> SubmitOutcome {
        if self.state == ConnectionState::Closing {
            return SubmitOutcome::Queued;
        }

        let outcome = match self.ensure_open().await {
            Err(e) => {
                self.enqueue(payload);
                SubmitOutcome::ConnectFailed(e)
            }
            Ok(()) if self.state != ConnectionState::Connected => {
                self.enqueue(payload);
                SubmitOutcome::Queued
            }
            Ok(()) => {
                let max_unit = self
                    .socket
                    .as_ref()
                    .and_then(|s| s.max_datagram_size());
                match max_unit {
                    Some(max) if payload.len() > max => {
                        // Each chunk is its own datagram with its own
                        // failure tracking.
                        for span in chunk_spans(payload.len(), max) {
                            self.send_now(payload.slice(span.range())).await;
                        }
                    }
                    _ => self.send_now(payload).await,
                }
                SubmitOutcome::Sent
            }
        };

        // `logged` means transmitted or queued, either way the record is
        // in the engine's custody now.
        let _ = self.events.send(Event::Logged);
        outcome
    }

    /// Idempotent socket open: an existing handle (or an armed reconnect
    /// timer) is left alone and current readiness is reported via state.
    async fn ensure_open(&mut self) -> Result<(), TransportError> {
        if self.socket.is_some() || self.reconnect_at.is_some() {
            return Ok(());
        }
        self.try_open().await
    }

    async fn try_open(&mut self) -> Result<(), TransportError> {
        self.step(Signal::ConnectRequested);
        match self.connector.open().await {
            Ok(socket) => {
                self.socket = Some(socket);
                self.signal(Signal::Ready).await;
                Ok(())
            }
            Err(e) => {
                self.socket = None;
                warn!(error = %e, "connect attempt failed");
                let signal = match &e {
                    TransportError::Timeout(_) => Signal::Timeout,
                    _ if self.connector.kind().is_stream() => Signal::Closed,
                    _ => Signal::ConnectFailed,
                };
                self.signal(signal).await;
                Err(e)
            }
        }
    }

    /// The reconnect timer fired: count the attempt and try to open.
    ///
    /// A failed stream open feeds back into the machine and re-arms the
    /// timer with the next (doubled) backoff interval.
    pub async fn reconnect_due(&mut self) {
        self.reconnect_at = None;
        self.retry.record_attempt();
        debug!(attempts = self.retry.attempts(), "reconnect attempt");
        if let Err(e) = self.try_open().await {
            let _ = self.events.send(Event::Error(e));
        }
    }

    /// Wait for the next socket-level lifecycle signal.
    ///
    /// Pends forever unless the socket is congested (waiting for
    /// writability) or a connected stream can report peer closure. The
    /// future is recreated by the caller after every state change.
    pub async fn socket_event(&mut self) -> Signal {
        match self.state {
            ConnectionState::Congested => {
                let Some(socket) = self.socket.as_mut() else {
                    return std::future::pending().await;
                };
                match socket.writable().await {
                    Ok(()) => Signal::Writable,
                    Err(e) => {
                        self.socket = None;
                        let _ = self.events.send(Event::Error(e));
                        Signal::SocketError
                    }
                }
            }
            ConnectionState::Connected
                if self.socket.as_ref().is_some_and(|s| s.kind().is_stream()) =>
            {
                let Some(socket) = self.socket.as_mut() else {
                    return std::future::pending().await;
                };
                let err = socket.peer_closed().await;
                debug!(error = %err, "stream connection lost");
                self.socket = None;
                if !matches!(err, TransportError::Closed) {
                    let _ = self.events.send(Event::Error(err));
                }
                Signal::Closed
            }
            _ => std::future::pending().await,
        }
    }

    /// Best-effort graceful shutdown.
    ///
    /// Polls up to the close budget for the queue to empty and in-flight
    /// sends to settle, then closes the socket regardless. Returns whether
    /// the shutdown was clean.
    pub async fn close(&mut self) -> bool {
        self.step(Signal::CloseRequested);

        let mut attempt = 0;
        while attempt < CLOSE_MAX_ATTEMPTS && !(self.queue.is_empty() && self.in_flight == 0) {
            attempt += 1;
            sleep(CLOSE_POLL_INTERVAL * attempt).await;
        }

        let clean = self.queue.is_empty() && self.in_flight == 0;
        if !clean {
            warn!(pending = self.queue.len(), "close budget exhausted, dropping queued records");
        }
        self.socket = None;
        self.reconnect_at = None;
        let _ = self.events.send(Event::Closed { clean });
        clean
    }

    fn enqueue(&mut self, payload: Bytes) {
        self.queue
            .enqueue(PendingMessage::new(payload, self.datagram_destination.clone()));
    }

    /// Send a fresh payload on a connected socket, queueing it on
    /// congestion or failure.
    async fn send_now(&mut self, payload: Bytes) {
        if self.state != ConnectionState::Connected {
            self.enqueue(payload);
            return;
        }
        let message = PendingMessage::new(payload, self.datagram_destination.clone());
        match self.transmit(&message).await {
            TransmitResult::Sent => {}
            TransmitResult::Congested => {
                self.queue.enqueue(message);
                self.step(Signal::Congestion);
            }
            TransmitResult::Failed(e) => {
                self.queue.enqueue(message);
                self.on_send_failure(e);
            }
        }
    }

    /// Drain the queue in FIFO order over the current transport.
    ///
    /// Stream transports write the whole backlog as one buffer (the
    /// collector sees an ordered byte stream either way). Datagram
    /// transports send message by message; the first congested or failed
    /// send stops the drain with the affected message back at the front.
    async fn drain(&mut self) {
        if self.queue.is_empty() {
            return;
        }
        let is_stream = self
            .socket
            .as_ref()
            .is_some_and(|s| s.kind().is_stream());

        if is_stream {
            let mut joined = BytesMut::new();
            for message in self.queue.iter() {
                joined.extend_from_slice(&message.payload);
            }
            let batch = PendingMessage::new(joined.freeze(), None);
            match self.transmit(&batch).await {
                TransmitResult::Sent => {
                    debug!(flushed = self.queue.len(), "stream backlog flushed");
                    self.queue.clear();
                }
                TransmitResult::Congested => unreachable!("streams do not report congestion"),
                TransmitResult::Failed(e) => self.on_send_failure(e),
            }
            return;
        }

        let max_unit = self.socket.as_ref().and_then(|s| s.max_datagram_size());
        let mut flushed = 0usize;
        while let Some(message) = self.queue.pop() {
            // Payloads queued during an outage have never seen this socket's
            // maximum unit; split them here so no datagram exceeds it.
            if let Some(max) = max_unit {
                if message.payload.len() > max {
                    for span in chunk_spans(message.payload.len(), max).iter().rev() {
                        self.queue.requeue_front(PendingMessage::new(
                            message.payload.slice(span.range()),
                            message.destination.clone(),
                        ));
                    }
                    continue;
                }
            }
            match self.transmit(&message).await {
                TransmitResult::Sent => flushed += 1,
                TransmitResult::Congested => {
                    self.queue.requeue_front(message);
                    self.step(Signal::Congestion);
                    break;
                }
                TransmitResult::Failed(e) => {
                    self.queue.requeue_front(message);
                    self.on_send_failure(e);
                    break;
                }
            }
        }
        if flushed > 0 {
            debug!(flushed, remaining = self.queue.len(), "queue drained");
        }
    }

    async fn transmit(&mut self, message: &PendingMessage) -> TransmitResult {
        let Some(socket) = self.socket.as_mut() else {
            return TransmitResult::Failed(TransportError::Closed);
        };
        self.in_flight += 1;
        let result = socket.send(&message.payload, message.destination.as_ref()).await;
        self.in_flight -= 1;
        match result {
            Ok(SendStatus::Sent) => TransmitResult::Sent,
            Ok(SendStatus::Congested) => TransmitResult::Congested,
            Err(e) => TransmitResult::Failed(e),
        }
    }

    /// Convert a send failure into a state decision.
    ///
    /// Stream write errors mean the connection is dead and enter the
    /// reconnect path. Connected datagram sockets are dropped and lazily
    /// re-created; fire-and-forget datagram sockets stay as they are.
    fn on_send_failure(&mut self, error: TransportError) {
        use crate::transport::socket::TransportKind;

        let kind = self.connector.kind();
        warn!(error = %error, ?kind, "send failed, message re-queued");
        let _ = self.events.send(Event::Error(error));
        match kind {
            TransportKind::Tcp | TransportKind::Tls => {
                self.socket = None;
                self.step(Signal::Closed);
            }
            TransportKind::UnixConnect => {
                self.socket = None;
                self.step(Signal::SocketError);
            }
            TransportKind::Udp | TransportKind::UnixDatagram => {}
        }
    }
}
