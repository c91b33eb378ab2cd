//! Desktop WebSocket transport using tokio-tungstenite

use std::borrow::Cow;
use std::sync::atomic::{AtomicU8, Ordering};
use std::sync::Arc;

use futures_util::{SinkExt, StreamExt};
use tokio::sync::mpsc;
use tokio_tungstenite::connect_async;
use tokio_tungstenite::tungstenite::protocol::frame::coding::CloseCode;
use tokio_tungstenite::tungstenite::protocol::CloseFrame;
use tokio_tungstenite::tungstenite::Message;
use tokio_util::sync::CancellationToken;

use storyforge_shared::close_code::{ABNORMAL_CLOSURE, NORMAL_CLOSURE};

use crate::infrastructure::messaging::{set_connection_state, ConnectionState};
use crate::infrastructure::websocket::transport::{
    Connector, EventSink, Transport, TransportError, TransportEvent,
};

enum Outgoing {
    Text(String),
    Close { code: u16, reason: String },
}

/// Opens [`TungsteniteTransport`]s on the current tokio runtime
#[derive(Debug, Clone, Copy, Default)]
pub struct TungsteniteConnector;

impl Connector for TungsteniteConnector {
    fn open(&self, url: &str, sink: EventSink) -> Result<Arc<dyn Transport>, TransportError> {
        let runtime = tokio::runtime::Handle::try_current().map_err(|e| TransportError::Connect {
            url: url.to_string(),
            message: e.to_string(),
        })?;

        let state = Arc::new(AtomicU8::new(ConnectionState::Connecting.to_u8()));
        let (tx, rx) = mpsc::unbounded_channel();
        let cancel = CancellationToken::new();

        runtime.spawn(run_socket(
            url.to_string(),
            sink,
            Arc::clone(&state),
            rx,
            cancel.clone(),
        ));

        Ok(Arc::new(TungsteniteTransport { state, tx, cancel }))
    }
}

/// One socket; the read/write loop runs on a spawned task
pub struct TungsteniteTransport {
    state: Arc<AtomicU8>,
    tx: mpsc::UnboundedSender<Outgoing>,
    cancel: CancellationToken,
}

impl Transport for TungsteniteTransport {
    fn ready_state(&self) -> ConnectionState {
        ConnectionState::from_u8(self.state.load(Ordering::SeqCst))
    }

    fn send_text(&self, text: String) -> Result<(), TransportError> {
        if self.ready_state() != ConnectionState::Open {
            return Err(TransportError::NotOpen);
        }
        self.tx
            .send(Outgoing::Text(text))
            .map_err(|e| TransportError::Send(e.to_string()))
    }

    fn close(&self, code: u16, reason: &str) {
        match self.ready_state() {
            ConnectionState::Connecting => {
                set_connection_state(&self.state, ConnectionState::Closing);
                self.cancel.cancel();
            }
            ConnectionState::Open => {
                set_connection_state(&self.state, ConnectionState::Closing);
                let outgoing = Outgoing::Close {
                    code,
                    reason: reason.to_string(),
                };
                if self.tx.send(outgoing).is_err() {
                    self.cancel.cancel();
                }
            }
            ConnectionState::Closing | ConnectionState::Disconnected => {}
        }
    }
}

impl Drop for TungsteniteTransport {
    fn drop(&mut self) {
        self.cancel.cancel();
    }
}

async fn run_socket(
    url: String,
    sink: EventSink,
    state: Arc<AtomicU8>,
    mut outgoing: mpsc::UnboundedReceiver<Outgoing>,
    cancel: CancellationToken,
) {
    let connected = tokio::select! {
        _ = cancel.cancelled() => {
            tracing::debug!(url = %url, "Connect cancelled before handshake finished");
            set_connection_state(&state, ConnectionState::Disconnected);
            sink.emit(TransportEvent::Closed { code: NORMAL_CLOSURE, reason: String::new() });
            return;
        }
        result = connect_async(url.as_str()) => result,
    };

    let ws_stream = match connected {
        Ok((ws_stream, _)) => ws_stream,
        Err(e) => {
            tracing::error!(url = %url, error = %e, "Failed to connect WebSocket");
            set_connection_state(&state, ConnectionState::Disconnected);
            sink.emit(TransportEvent::Error(e.to_string()));
            sink.emit(TransportEvent::Closed {
                code: ABNORMAL_CLOSURE,
                reason: e.to_string(),
            });
            return;
        }
    };

    set_connection_state(&state, ConnectionState::Open);
    sink.emit(TransportEvent::Opened);

    let (mut write, mut read) = ws_stream.split();

    let (code, reason) = loop {
        tokio::select! {
            _ = cancel.cancelled() => {
                let frame = close_frame(NORMAL_CLOSURE, String::new());
                if let Err(e) = write.send(Message::Close(Some(frame))).await {
                    tracing::debug!(error = %e, "Failed to send close frame");
                }
                break (NORMAL_CLOSURE, String::new());
            }
            next = outgoing.recv() => match next {
                Some(Outgoing::Text(text)) => {
                    if let Err(e) = write.send(Message::Text(text)).await {
                        tracing::error!(error = %e, "Failed to send message");
                        sink.emit(TransportEvent::Error(e.to_string()));
                        break (ABNORMAL_CLOSURE, e.to_string());
                    }
                }
                Some(Outgoing::Close { code, reason }) => {
                    let frame = close_frame(code, reason.clone());
                    if let Err(e) = write.send(Message::Close(Some(frame))).await {
                        tracing::debug!(error = %e, "Failed to send close frame");
                    }
                    break (code, reason);
                }
                None => {
                    if let Err(e) = write.send(Message::Close(None)).await {
                        tracing::debug!(error = %e, "Failed to send close frame");
                    }
                    break (NORMAL_CLOSURE, String::new());
                }
            },
            frame = read.next() => match frame {
                Some(Ok(Message::Text(text))) => sink.emit(TransportEvent::Message(text)),
                Some(Ok(Message::Close(frame))) => {
                    let (code, reason) = match frame {
                        Some(frame) => (u16::from(frame.code), frame.reason.into_owned()),
                        None => (u16::from(CloseCode::Status), String::new()),
                    };
                    tracing::info!(code, reason = %reason, "Server closed connection");
                    break (code, reason);
                }
                Some(Ok(_)) => {}
                Some(Err(e)) => {
                    tracing::warn!(error = %e, "WebSocket read failed");
                    sink.emit(TransportEvent::Error(e.to_string()));
                    break (ABNORMAL_CLOSURE, e.to_string());
                }
                None => break (ABNORMAL_CLOSURE, String::new()),
            },
        }
    };

    set_connection_state(&state, ConnectionState::Disconnected);
    sink.emit(TransportEvent::Closed { code, reason });
}

fn close_frame(code: u16, reason: String) -> CloseFrame<'static> {
    CloseFrame {
        code: CloseCode::from(code),
        reason: Cow::Owned(reason),
    }
}
