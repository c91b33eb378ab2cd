//! WebSocket Bridge - runs a [`ConnectionCore`] on a tokio task.
//!
//! `create_connection` spawns a `ConnectionManager` actor and returns the
//! owning [`Connection`] handle. The actor is the only writer of lifecycle
//! state: it feeds commands, transport events and timer expiry into the core
//! and executes the effects the core returns. Handlers run on the actor task
//! in frame delivery order.
//!
//! Dropping the `Connection` closes the command channel; the actor then tears
//! the transport down and exits.

use std::collections::{BTreeMap, VecDeque};
use std::pin::Pin;
use std::sync::atomic::AtomicU8;
use std::sync::{Arc, PoisonError, RwLock};
use std::time::Duration;

use serde::Serialize;
use tokio::sync::mpsc;
use tokio::time::Sleep;

use super::core::{ConnectionCore, Effect};
use super::dispatcher;
use super::shared::ReconnectConfig;
use super::transport::{Connector, EventSink, Transport, TransportEvent, TransportId};
use crate::infrastructure::messaging::{
    set_connection_state, ConnectionState, ConnectionStateObserver,
};

type OpenHandler = Box<dyn FnMut() + Send>;
type CloseHandler = Box<dyn FnMut(u16) + Send>;
type MessageHandler = Box<dyn FnMut(&str) + Send>;
type ReconnectScheduledHandler = Box<dyn FnMut(u32, Duration) + Send>;

/// Callbacks invoked by the connection manager.
///
/// Replaced as a whole through [`Connection::set_handlers`].
#[derive(Default)]
pub struct ConnectionHandlers {
    pub on_open: Option<OpenHandler>,
    pub on_close: Option<CloseHandler>,
    pub on_message: Option<MessageHandler>,
    pub on_reconnect_scheduled: Option<ReconnectScheduledHandler>,
}

impl ConnectionHandlers {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn on_open(mut self, handler: impl FnMut() + Send + 'static) -> Self {
        self.on_open = Some(Box::new(handler));
        self
    }

    pub fn on_close(mut self, handler: impl FnMut(u16) + Send + 'static) -> Self {
        self.on_close = Some(Box::new(handler));
        self
    }

    pub fn on_message(mut self, handler: impl FnMut(&str) + Send + 'static) -> Self {
        self.on_message = Some(Box::new(handler));
        self
    }

    pub fn on_reconnect_scheduled(
        mut self,
        handler: impl FnMut(u32, Duration) + Send + 'static,
    ) -> Self {
        self.on_reconnect_scheduled = Some(Box::new(handler));
        self
    }
}

impl std::fmt::Debug for ConnectionHandlers {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ConnectionHandlers")
            .field("on_open", &self.on_open.is_some())
            .field("on_close", &self.on_close.is_some())
            .field("on_message", &self.on_message.is_some())
            .field("on_reconnect_scheduled", &self.on_reconnect_scheduled.is_some())
            .finish()
    }
}

enum Command {
    Configure { url: Option<String>, enabled: bool },
    Connect,
    Reconnect,
    Teardown,
    SetCredentials(BTreeMap<String, String>),
    SetHandlers(ConnectionHandlers),
}

type TransportSlot = Arc<RwLock<Option<Arc<dyn Transport>>>>;

/// Owning handle for one logical channel
pub struct Connection {
    commands: mpsc::UnboundedSender<Command>,
    transport: TransportSlot,
    state_observer: ConnectionStateObserver,
}

/// Spawn a connection manager on the current tokio runtime.
///
/// The channel starts disabled with no address; call [`Connection::configure`]
/// to point it somewhere.
pub fn create_connection(connector: Arc<dyn Connector>, reconnect: ReconnectConfig) -> Connection {
    let (cmd_tx, cmd_rx) = mpsc::unbounded_channel();
    let (event_tx, event_rx) = mpsc::unbounded_channel();
    let state = Arc::new(AtomicU8::new(ConnectionState::Disconnected.to_u8()));
    let transport: TransportSlot = Arc::new(RwLock::new(None));

    let manager = ConnectionManager {
        core: ConnectionCore::new(None, false, reconnect),
        connector,
        handlers: ConnectionHandlers::default(),
        commands: cmd_rx,
        events: event_rx,
        event_tx,
        transport: Arc::clone(&transport),
        current: None,
        state: Arc::clone(&state),
        timer: None,
    };
    tokio::spawn(manager.run());

    Connection {
        commands: cmd_tx,
        transport,
        state_observer: ConnectionStateObserver::new(state),
    }
}

impl Connection {
    /// Set address and enabled flag; connects when enabled with an address.
    pub fn configure(&self, url: Option<String>, enabled: bool) {
        self.command(Command::Configure { url, enabled });
    }

    pub fn connect(&self) {
        self.command(Command::Connect);
    }

    /// Manual reconnect with reset backoff. No-op while open or connecting.
    pub fn reconnect(&self) {
        self.command(Command::Reconnect);
    }

    /// Cancel any pending retry and close the transport
    pub fn teardown(&self) {
        self.command(Command::Teardown);
    }

    /// Credentials for the authenticate frame sent on each open
    pub fn set_credentials(&self, credentials: BTreeMap<String, String>) {
        self.command(Command::SetCredentials(credentials));
    }

    pub fn set_handlers(&self, handlers: ConnectionHandlers) {
        self.command(Command::SetHandlers(handlers));
    }

    /// Send through the current transport; see [`dispatcher::send`].
    pub fn send<P>(&self, payload: &P) -> bool
    where
        P: Serialize + ?Sized,
    {
        let guard = self.transport.read().unwrap_or_else(PoisonError::into_inner);
        dispatcher::send(guard.as_deref(), payload)
    }

    /// Whether a transport exists, in any state
    pub fn has_transport(&self) -> bool {
        self.transport
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .is_some()
    }

    /// Whether the current transport can accept frames right now
    pub fn is_transport_open(&self) -> bool {
        self.transport
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .as_ref()
            .is_some_and(|t| t.ready_state() == ConnectionState::Open)
    }

    pub fn state(&self) -> ConnectionState {
        self.state_observer.state()
    }

    pub fn is_connected(&self) -> bool {
        self.state_observer.is_connected()
    }

    pub fn observer(&self) -> ConnectionStateObserver {
        self.state_observer.clone()
    }

    fn command(&self, command: Command) {
        if self.commands.send(command).is_err() {
            tracing::debug!("Connection manager has stopped, command dropped");
        }
    }
}

impl std::fmt::Debug for Connection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Connection")
            .field("state", &self.state())
            .finish()
    }
}

enum Input {
    Command(Option<Command>),
    Transport(TransportId, TransportEvent),
    TimerFired,
}

struct ConnectionManager {
    core: ConnectionCore,
    connector: Arc<dyn Connector>,
    handlers: ConnectionHandlers,
    commands: mpsc::UnboundedReceiver<Command>,
    events: mpsc::UnboundedReceiver<(TransportId, TransportEvent)>,
    event_tx: mpsc::UnboundedSender<(TransportId, TransportEvent)>,
    transport: TransportSlot,
    current: Option<TransportId>,
    state: Arc<AtomicU8>,
    timer: Option<Pin<Box<Sleep>>>,
}

impl ConnectionManager {
    async fn run(mut self) {
        loop {
            let input = tokio::select! {
                command = self.commands.recv() => Input::Command(command),
                Some((id, event)) = self.events.recv() => Input::Transport(id, event),
                () = wait_for(&mut self.timer) => Input::TimerFired,
            };

            let effects = match input {
                Input::Command(Some(command)) => self.handle_command(command),
                Input::Command(None) => {
                    tracing::debug!("Connection handle dropped, shutting down");
                    let effects = self.core.teardown();
                    self.apply(effects);
                    break;
                }
                Input::Transport(id, event) => self.handle_event(id, event),
                Input::TimerFired => {
                    self.timer = None;
                    self.core.timer_fired()
                }
            };
            self.apply(effects);
        }
    }

    fn handle_command(&mut self, command: Command) -> Vec<Effect> {
        match command {
            Command::Configure { url, enabled } => self.core.configure(url, enabled),
            Command::Connect => self.core.connect(),
            Command::Reconnect => self.core.reconnect(),
            Command::Teardown => self.core.teardown(),
            Command::SetCredentials(credentials) => {
                self.core.set_credentials(credentials);
                Vec::new()
            }
            Command::SetHandlers(handlers) => {
                self.handlers = handlers;
                Vec::new()
            }
        }
    }

    fn handle_event(&mut self, id: TransportId, event: TransportEvent) -> Vec<Effect> {
        match event {
            TransportEvent::Opened => self.core.transport_opened(id),
            TransportEvent::Message(text) => self.core.transport_message(id, text),
            TransportEvent::Error(message) => self.core.transport_error(id, &message),
            TransportEvent::Closed { code, reason } => {
                if self.current == Some(id) {
                    tracing::debug!(transport = %id, code, reason = %reason, "Transport closed");
                    self.current = None;
                    *self.slot() = None;
                }
                self.core.transport_closed(id, code)
            }
        }
    }

    fn apply(&mut self, effects: Vec<Effect>) {
        let mut queue: VecDeque<Effect> = effects.into();
        while let Some(effect) = queue.pop_front() {
            match effect {
                Effect::Open { id, url } => {
                    let sink = EventSink::new(id, self.event_tx.clone());
                    match self.connector.open(&url, sink) {
                        Ok(transport) => {
                            self.current = Some(id);
                            *self.slot() = Some(transport);
                        }
                        Err(e) => {
                            tracing::error!(url = %url, error = %e, "Failed to create WebSocket");
                            queue.extend(self.core.transport_failed(id));
                        }
                    }
                }
                Effect::Close { id, code } => {
                    if self.current == Some(id) {
                        self.current = None;
                        let transport = self.slot().take();
                        if let Some(transport) = transport {
                            transport.close(code, "");
                        }
                    }
                }
                Effect::Send { id, text } => {
                    if self.current == Some(id) {
                        let guard = self.transport.read().unwrap_or_else(PoisonError::into_inner);
                        if let Some(transport) = guard.as_ref() {
                            if let Err(e) = transport.send_text(text) {
                                tracing::error!(transport = %id, error = %e, "Failed to send frame");
                            }
                        }
                    }
                }
                Effect::ScheduleRetry { attempt, delay } => {
                    self.timer = Some(Box::pin(tokio::time::sleep(delay)));
                    if let Some(handler) = self.handlers.on_reconnect_scheduled.as_mut() {
                        handler(attempt, delay);
                    }
                }
                Effect::ScheduleReconnect { delay } => {
                    self.timer = Some(Box::pin(tokio::time::sleep(delay)));
                }
                Effect::CancelTimer => self.timer = None,
                Effect::NotifyOpen => {
                    if let Some(handler) = self.handlers.on_open.as_mut() {
                        handler();
                    }
                }
                Effect::NotifyClose { code } => {
                    if let Some(handler) = self.handlers.on_close.as_mut() {
                        handler(code);
                    }
                }
                Effect::Deliver(text) => {
                    if let Some(handler) = self.handlers.on_message.as_mut() {
                        handler(&text);
                    }
                }
            }
        }
        set_connection_state(&self.state, self.core.state());
    }

    fn slot(&self) -> std::sync::RwLockWriteGuard<'_, Option<Arc<dyn Transport>>> {
        self.transport.write().unwrap_or_else(PoisonError::into_inner)
    }
}

async fn wait_for(timer: &mut Option<Pin<Box<Sleep>>>) {
    match timer {
        Some(sleep) => sleep.as_mut().await,
        None => std::future::pending().await,
    }
}
