//! Transport port: the seam between the connection manager and a concrete socket.
//!
//! A [`Connector`] opens transports; each transport reports its lifecycle through
//! an [`EventSink`] tagged with the id the manager assigned to it, so events from
//! a superseded socket can be told apart from the current one.

use std::sync::Arc;

use tokio::sync::mpsc;

use crate::infrastructure::messaging::ConnectionState;

/// Identifies one underlying transport within a logical connection
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TransportId(pub u64);

impl std::fmt::Display for TransportId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Lifecycle notifications emitted by a transport
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TransportEvent {
    Opened,
    Message(String),
    Error(String),
    Closed { code: u16, reason: String },
}

/// Transport-level failures
#[derive(Debug, Clone, thiserror::Error)]
pub enum TransportError {
    #[error("Failed to open transport to {url}: {message}")]
    Connect { url: String, message: String },
    #[error("Transport is not open")]
    NotOpen,
    #[error("Failed to send frame: {0}")]
    Send(String),
}

/// Where a transport delivers its events
#[derive(Debug, Clone)]
pub struct EventSink {
    id: TransportId,
    tx: mpsc::UnboundedSender<(TransportId, TransportEvent)>,
}

impl EventSink {
    pub fn new(id: TransportId, tx: mpsc::UnboundedSender<(TransportId, TransportEvent)>) -> Self {
        Self { id, tx }
    }

    pub fn id(&self) -> TransportId {
        self.id
    }

    /// Deliver an event; silently dropped once the manager has shut down.
    pub fn emit(&self, event: TransportEvent) {
        if self.tx.send((self.id, event)).is_err() {
            tracing::trace!(transport = %self.id, "Connection manager gone, dropping transport event");
        }
    }
}

/// A live (or in-progress) socket
pub trait Transport: Send + Sync {
    fn ready_state(&self) -> ConnectionState;

    /// Queue a text frame. Fails unless the transport is open.
    fn send_text(&self, text: String) -> Result<(), TransportError>;

    /// Begin closing with the given close code. Safe to call more than once.
    fn close(&self, code: u16, reason: &str);
}

/// Opens transports for the connection manager
pub trait Connector: Send + Sync + 'static {
    /// Start opening a transport to `url`.
    ///
    /// Must return promptly with the transport in the `Connecting` state; the
    /// outcome of the handshake is reported through `sink`.
    fn open(&self, url: &str, sink: EventSink) -> Result<Arc<dyn Transport>, TransportError>;
}
