//! Simple transport fixtures: a transport that records what it was asked to do
//! and a connector that hands those out while letting the test drive events.

use std::sync::atomic::{AtomicBool, AtomicU8, Ordering};
use std::sync::{Arc, Mutex, PoisonError};

use crate::infrastructure::messaging::{set_connection_state, ConnectionState};
use crate::infrastructure::websocket::{
    Connector, EventSink, Transport, TransportError, TransportEvent,
};

/// Transport that keeps every frame and close request
#[derive(Debug, Default)]
pub struct RecordingTransport {
    state: AtomicU8,
    sent: Mutex<Vec<String>>,
    closes: Mutex<Vec<u16>>,
    fail_sends: AtomicBool,
}

impl RecordingTransport {
    pub fn with_state(state: ConnectionState) -> Self {
        let transport = Self::default();
        set_connection_state(&transport.state, state);
        transport
    }

    pub fn open() -> Self {
        Self::with_state(ConnectionState::Open)
    }

    pub fn set_state(&self, state: ConnectionState) {
        set_connection_state(&self.state, state);
    }

    /// Make every later `send_text` fail
    pub fn fail_sends(&self) {
        self.fail_sends.store(true, Ordering::SeqCst);
    }

    pub fn sent(&self) -> Vec<String> {
        self.sent
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    pub fn closes(&self) -> Vec<u16> {
        self.closes
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }
}

impl Transport for RecordingTransport {
    fn ready_state(&self) -> ConnectionState {
        ConnectionState::from_u8(self.state.load(Ordering::SeqCst))
    }

    fn send_text(&self, text: String) -> Result<(), TransportError> {
        if self.ready_state() != ConnectionState::Open {
            return Err(TransportError::NotOpen);
        }
        if self.fail_sends.load(Ordering::SeqCst) {
            return Err(TransportError::Send("simulated failure".into()));
        }
        self.sent
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(text);
        Ok(())
    }

    fn close(&self, code: u16, _reason: &str) {
        self.closes
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(code);
        self.set_state(ConnectionState::Closing);
    }
}

struct Opened {
    url: String,
    sink: EventSink,
    transport: Arc<RecordingTransport>,
}

/// Connector whose transports only change state when the test says so
#[derive(Clone, Default)]
pub struct InMemoryConnector {
    opened: Arc<Mutex<Vec<Opened>>>,
    refuse: Arc<AtomicBool>,
}

impl InMemoryConnector {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make every later `open` fail outright
    pub fn refuse_opens(&self) {
        self.refuse.store(true, Ordering::SeqCst);
    }

    /// Number of transports created so far
    pub fn open_count(&self) -> usize {
        self.lock().len()
    }

    pub fn url(&self, index: usize) -> Option<String> {
        self.lock().get(index).map(|o| o.url.clone())
    }

    pub fn transport(&self, index: usize) -> Option<Arc<RecordingTransport>> {
        self.lock().get(index).map(|o| Arc::clone(&o.transport))
    }

    /// Complete the handshake of transport `index`
    pub fn accept(&self, index: usize) {
        if let Some(opened) = self.lock().get(index) {
            opened.transport.set_state(ConnectionState::Open);
            opened.sink.emit(TransportEvent::Opened);
        }
    }

    /// Deliver an inbound text frame on transport `index`
    pub fn push(&self, index: usize, text: &str) {
        if let Some(opened) = self.lock().get(index) {
            opened.sink.emit(TransportEvent::Message(text.to_string()));
        }
    }

    /// Close transport `index` from the server side
    pub fn drop_with(&self, index: usize, code: u16) {
        if let Some(opened) = self.lock().get(index) {
            opened.transport.set_state(ConnectionState::Disconnected);
            opened.sink.emit(TransportEvent::Closed {
                code,
                reason: String::new(),
            });
        }
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Vec<Opened>> {
        self.opened.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl Connector for InMemoryConnector {
    fn open(&self, url: &str, sink: EventSink) -> Result<Arc<dyn Transport>, TransportError> {
        if self.refuse.load(Ordering::SeqCst) {
            return Err(TransportError::Connect {
                url: url.to_string(),
                message: "refused".into(),
            });
        }
        let transport = Arc::new(RecordingTransport::with_state(ConnectionState::Connecting));
        self.lock().push(Opened {
            url: url.to_string(),
            sink,
            transport: Arc::clone(&transport),
        });
        Ok(transport)
    }
}
