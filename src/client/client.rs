//! The public delivery client and its background task.
//!
//! [`DeliveryClient`] is a cheap handle; all socket state lives in a single
//! spawned task that owns the [`ConnectionManager`]. Commands flow over a
//! bounded channel, lifecycle events flow back over an unbounded one. The
//! single-task design means the state machine, retry counters and queue are
//! never touched concurrently.

use std::sync::Arc;

use bytes::Bytes;
use chrono::Local;
use tokio::sync::{mpsc, oneshot};
use tracing::debug;

use crate::client::config::SyslogConfig;
use crate::core::constants::COMMAND_CHANNEL_CAPACITY;
use crate::core::error::TransportError;
use crate::transport::connection::{ConnectionManager, Event, Signal, SubmitOutcome};
use crate::transport::socket::SocketConnector;
use crate::wire::{EncodeRecord, Record, Severity, UnknownLevel};

/// Errors surfaced to callers of the client handle.
#[derive(Debug, thiserror::Error)]
pub enum ClientError {
    /// The level string was not one of the eight syslog severities.
    #[error(transparent)]
    UnknownLevel(#[from] UnknownLevel),
    /// The transport could not be opened; the record was queued and will be
    /// retried.
    #[error("syslog connect failed: {0}")]
    Connect(TransportError),
    /// The client was closed.
    #[error("syslog client is closed")]
    Closed,
}

/// How a record left the caller's hands.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Delivery {
    /// Handed to the kernel on a live socket.
    Sent,
    /// Buffered; it will be flushed once a connection is available.
    Queued,
}

enum Command {
    Log {
        payload: Bytes,
        reply: oneshot::Sender<Result<Delivery, ClientError>>,
    },
    Close {
        reply: oneshot::Sender<bool>,
    },
    Pending {
        reply: oneshot::Sender<usize>,
    },
}

/// Reliable syslog delivery client.
///
/// Records are encoded by the configured producer, then submitted to the
/// background task, which connects lazily, queues across outages and
/// reconnects with exponential backoff.
#[derive(Clone)]
pub struct DeliveryClient {
    commands: mpsc::Sender<Command>,
    encoder: Arc<dyn EncodeRecord>,
    end_of_line: String,
}

impl std::fmt::Debug for DeliveryClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DeliveryClient")
            .field("end_of_line", &self.end_of_line)
            .finish_non_exhaustive()
    }
}

impl DeliveryClient {
    /// Spawn the delivery task for this configuration.
    ///
    /// Returns the handle and the stream of lifecycle events ([`Event`]).
    /// No socket is opened until the first record is logged.
    pub fn new(config: SyslogConfig) -> (Self, mpsc::UnboundedReceiver<Event>) {
        let encoder: Arc<dyn EncodeRecord> = Arc::new(config.producer());
        Self::with_encoder(config, encoder)
    }

    /// Spawn the delivery task with a caller-supplied encoder.
    pub fn with_encoder(
        config: SyslogConfig,
        encoder: Arc<dyn EncodeRecord>,
    ) -> (Self, mpsc::UnboundedReceiver<Event>) {
        let (command_tx, command_rx) = mpsc::channel(COMMAND_CHANNEL_CAPACITY);
        let (event_tx, event_rx) = mpsc::unbounded_channel();

        let endpoint = config.endpoint();
        let connector = SocketConnector::new(
            config.protocol,
            endpoint.clone(),
            config.connect_timeout,
            #[cfg(feature = "tls")]
            config.tls.clone(),
        );
        let manager = ConnectionManager::new(Box::new(connector), event_tx)
            .with_datagram_destination(config.protocol.is_datagram().then_some(endpoint));

        tokio::spawn(run(manager, command_rx));

        let client = Self {
            commands: command_tx,
            encoder,
            end_of_line: config.end_of_line,
        };
        (client, event_rx)
    }

    /// Log one message at the given severity level.
    ///
    /// Accepts the eight syslog level keywords (plus `err` as an alias for
    /// `error`). The returned [`Delivery`] says whether the record reached
    /// the socket or was queued; `Err(Connect)` also means queued, with the
    /// connect failure reported for visibility.
    pub async fn log(&self, level: &str, message: &str) -> Result<Delivery, ClientError> {
        let severity: Severity = level.parse()?;
        let record = Record {
            severity,
            timestamp: Local::now(),
            message,
        };
        let mut encoded = self.encoder.encode(&record);
        encoded.push_str(&self.end_of_line);

        let (reply_tx, reply_rx) = oneshot::channel();
        self.commands
            .send(Command::Log {
                payload: Bytes::from(encoded),
                reply: reply_tx,
            })
            .await
            .map_err(|_| ClientError::Closed)?;
        reply_rx.await.map_err(|_| ClientError::Closed)?
    }

    /// Shut the client down, waiting a bounded time for queued records.
    ///
    /// Returns `Ok(true)` when everything pending was delivered, `Ok(false)`
    /// when the close budget expired with records still queued.
    pub async fn close(&self) -> Result<bool, ClientError> {
        let (reply_tx, reply_rx) = oneshot::channel();
        self.commands
            .send(Command::Close { reply: reply_tx })
            .await
            .map_err(|_| ClientError::Closed)?;
        reply_rx.await.map_err(|_| ClientError::Closed)
    }

    /// Number of records currently queued for retransmission.
    pub async fn pending(&self) -> Result<usize, ClientError> {
        let (reply_tx, reply_rx) = oneshot::channel();
        self.commands
            .send(Command::Pending { reply: reply_tx })
            .await
            .map_err(|_| ClientError::Closed)?;
        reply_rx.await.map_err(|_| ClientError::Closed)
    }
}

/// What woke the delivery task.
enum Wake {
    Command(Option<Command>),
    ReconnectDue,
    Socket(Signal),
}

/// The delivery task: single owner of the connection manager.
async fn run(mut manager: ConnectionManager, mut commands: mpsc::Receiver<Command>) {
    debug!("delivery task started");
    loop {
        // The select produces a plain value so its borrows end before any
        // handler mutates the manager.
        let wake = {
            let reconnect_at = manager.reconnect_at();
            tokio::select! {
                command = commands.recv() => Wake::Command(command),
                () = async {
                    match reconnect_at {
                        Some(deadline) => tokio::time::sleep_until(deadline).await,
                        None => std::future::pending().await,
                    }
                } => Wake::ReconnectDue,
                signal = manager.socket_event() => Wake::Socket(signal),
            }
        };

        match wake {
            Wake::Command(None) => break,
            Wake::Command(Some(Command::Log { payload, reply })) => {
                let result = match manager.submit(payload).await {
                    SubmitOutcome::Sent => Ok(Delivery::Sent),
                    SubmitOutcome::Queued => Ok(Delivery::Queued),
                    SubmitOutcome::ConnectFailed(e) => Err(ClientError::Connect(e)),
                };
                let _ = reply.send(result);
            }
            Wake::Command(Some(Command::Close { reply })) => {
                let clean = manager.close().await;
                let _ = reply.send(clean);
                break;
            }
            Wake::Command(Some(Command::Pending { reply })) => {
                let _ = reply.send(manager.pending());
            }
            Wake::ReconnectDue => manager.reconnect_due().await,
            Wake::Socket(signal) => manager.signal(signal).await,
        }
    }
    debug!("delivery task stopped");
}
