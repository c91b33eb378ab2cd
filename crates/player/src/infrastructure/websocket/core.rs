//! Platform-agnostic lifecycle core for a reconnecting WebSocket channel.
//!
//! This is deliberately free of any runtime dependencies (tokio, sockets, timers).
//! Every input returns the list of [`Effect`]s the owner must perform; the
//! connection manager actor executes them against real transports and timers.

use std::collections::BTreeMap;
use std::time::Duration;

use storyforge_shared::close_code::{self, NORMAL_CLOSURE};
use storyforge_shared::ClientMessage;

use super::shared::{ReconnectConfig, MANUAL_RECONNECT_DEBOUNCE_MS};
use super::transport::TransportId;
use crate::infrastructure::messaging::ConnectionState;

/// Exponential backoff state shared by reconnect logic.
#[derive(Debug, Clone, Copy)]
pub struct BackoffState {
    config: ReconnectConfig,
    attempts: u32,
}

impl BackoffState {
    pub fn new(config: ReconnectConfig) -> Self {
        Self {
            config,
            attempts: 0,
        }
    }

    pub fn reset(&mut self) {
        self.attempts = 0;
    }

    pub fn attempts(&self) -> u32 {
        self.attempts
    }

    pub fn is_exhausted(&self) -> bool {
        self.attempts >= self.config.max_attempts
    }

    /// Advance to the next attempt.
    ///
    /// Returns the delay to wait *before* performing this attempt.
    pub fn next_delay_and_advance(&mut self) -> Option<Duration> {
        if self.is_exhausted() {
            return None;
        }

        let delay = self.config.delay_for(self.attempts);
        self.attempts += 1;
        Some(delay)
    }
}

/// Why the single pending timer is armed
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum PendingTimer {
    Retry,
    ManualReconnect,
}

/// Side effects requested by the core
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Effect {
    /// Open a new transport and tag its events with `id`
    Open { id: TransportId, url: String },
    /// Close a transport; its later events must be ignored
    Close { id: TransportId, code: u16 },
    /// Write a text frame to the transport
    Send { id: TransportId, text: String },
    /// Arm the timer for an automatic retry, replacing any pending one
    ScheduleRetry { attempt: u32, delay: Duration },
    /// Arm the timer for a debounced manual reconnect, replacing any pending one
    ScheduleReconnect { delay: Duration },
    CancelTimer,
    NotifyOpen,
    NotifyClose { code: u16 },
    /// Hand an inbound text frame to the message handler
    Deliver(String),
}

/// Lifecycle decisions for one logical channel.
///
/// Holds at most one current transport; anything reported by an older
/// transport id is ignored.
#[derive(Debug)]
pub struct ConnectionCore {
    url: Option<String>,
    enabled: bool,
    credentials: BTreeMap<String, String>,
    state: ConnectionState,
    backoff: BackoffState,
    current: Option<TransportId>,
    next_id: u64,
    timer: Option<PendingTimer>,
}

impl ConnectionCore {
    pub fn new(url: Option<String>, enabled: bool, reconnect: ReconnectConfig) -> Self {
        Self {
            url,
            enabled,
            credentials: BTreeMap::new(),
            state: ConnectionState::Disconnected,
            backoff: BackoffState::new(reconnect),
            current: None,
            next_id: 0,
            timer: None,
        }
    }

    pub fn state(&self) -> ConnectionState {
        self.state
    }

    pub fn attempts(&self) -> u32 {
        self.backoff.attempts()
    }

    pub fn url(&self) -> Option<&str> {
        self.url.as_deref()
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    pub fn current_transport(&self) -> Option<TransportId> {
        self.current
    }

    /// Replace the credentials sent on the next open. Does not reconnect.
    pub fn set_credentials(&mut self, credentials: BTreeMap<String, String>) {
        self.credentials = credentials;
    }

    /// Change address and/or enabled flag, then connect if allowed.
    ///
    /// Disabling or pointing at a different address tears the current
    /// transport down first.
    pub fn configure(&mut self, url: Option<String>, enabled: bool) -> Vec<Effect> {
        let mut effects = Vec::new();
        if url != self.url || !enabled {
            effects.extend(self.teardown());
        }
        self.url = url;
        self.enabled = enabled;
        effects.extend(self.connect());
        effects
    }

    /// Open a transport unless one is already open or connecting.
    pub fn connect(&mut self) -> Vec<Effect> {
        let url = match (&self.url, self.enabled) {
            (Some(url), true) => url.clone(),
            _ => return self.teardown(),
        };

        if self.current.is_some() && self.state.is_active() {
            tracing::debug!(url = %url, state = ?self.state, "Connect ignored, transport already active");
            return Vec::new();
        }

        let mut effects = Vec::new();
        if self.timer.take().is_some() {
            effects.push(Effect::CancelTimer);
        }
        if let Some(stale) = self.current.take() {
            effects.push(Effect::Close {
                id: stale,
                code: NORMAL_CLOSURE,
            });
        }

        self.next_id += 1;
        let id = TransportId(self.next_id);
        self.current = Some(id);
        self.state = ConnectionState::Connecting;
        tracing::info!(url = %url, transport = %id, "Opening WebSocket");
        effects.push(Effect::Open { id, url });
        effects
    }

    /// Manual reconnect: reset the backoff and connect after a short debounce.
    ///
    /// A second call while the debounce is pending replaces it.
    pub fn reconnect(&mut self) -> Vec<Effect> {
        if !self.enabled {
            tracing::debug!("Reconnect ignored, channel disabled");
            return Vec::new();
        }
        if self.current.is_some() && self.state.is_active() {
            tracing::debug!(state = ?self.state, "Reconnect ignored, transport already active");
            return Vec::new();
        }

        let mut effects = Vec::new();
        if let Some(stale) = self.current.take() {
            effects.push(Effect::Close {
                id: stale,
                code: NORMAL_CLOSURE,
            });
        }
        self.state = ConnectionState::Disconnected;
        self.backoff.reset();
        self.timer = Some(PendingTimer::ManualReconnect);
        effects.push(Effect::ScheduleReconnect {
            delay: Duration::from_millis(MANUAL_RECONNECT_DEBOUNCE_MS),
        });
        effects
    }

    /// Cancel the pending timer and close the current transport. Idempotent.
    pub fn teardown(&mut self) -> Vec<Effect> {
        let mut effects = Vec::new();
        if self.timer.take().is_some() {
            effects.push(Effect::CancelTimer);
        }
        if let Some(id) = self.current.take() {
            tracing::debug!(transport = %id, "Tearing down WebSocket");
            effects.push(Effect::Close {
                id,
                code: NORMAL_CLOSURE,
            });
        }
        self.state = ConnectionState::Disconnected;
        effects
    }

    pub fn transport_opened(&mut self, id: TransportId) -> Vec<Effect> {
        if !self.is_current(id) {
            tracing::debug!(transport = %id, "Ignoring open from superseded transport");
            return Vec::new();
        }

        self.backoff.reset();
        self.state = ConnectionState::Open;
        tracing::info!(transport = %id, "WebSocket connected");

        let mut effects = Vec::new();
        if !self.credentials.is_empty() {
            let frame = ClientMessage::Authenticate(self.credentials.clone());
            match serde_json::to_string(&frame) {
                Ok(text) => effects.push(Effect::Send { id, text }),
                Err(e) => tracing::error!(error = %e, "Failed to encode authenticate frame"),
            }
        }
        effects.push(Effect::NotifyOpen);
        effects
    }

    pub fn transport_message(&mut self, id: TransportId, text: String) -> Vec<Effect> {
        if !self.is_current(id) {
            tracing::debug!(transport = %id, "Dropping frame from superseded transport");
            return Vec::new();
        }
        vec![Effect::Deliver(text)]
    }

    /// Errors are only logged; the close that follows drives recovery.
    pub fn transport_error(&mut self, id: TransportId, message: &str) -> Vec<Effect> {
        if self.is_current(id) {
            tracing::warn!(transport = %id, error = %message, "WebSocket error");
        }
        Vec::new()
    }

    pub fn transport_closed(&mut self, id: TransportId, code: u16) -> Vec<Effect> {
        if !self.is_current(id) {
            tracing::debug!(transport = %id, code, "Ignoring close from superseded transport");
            return Vec::new();
        }

        self.current = None;
        self.state = ConnectionState::Disconnected;
        tracing::info!(transport = %id, code, "WebSocket closed");

        let mut effects = vec![Effect::NotifyClose { code }];
        if !self.enabled || !close_code::is_abnormal(code) {
            return effects;
        }

        match self.backoff.next_delay_and_advance() {
            Some(delay) => {
                let attempt = self.backoff.attempts();
                tracing::info!(
                    attempt,
                    delay_ms = delay.as_millis() as u64,
                    "Scheduling reconnect"
                );
                self.timer = Some(PendingTimer::Retry);
                effects.push(Effect::ScheduleRetry { attempt, delay });
            }
            None => {
                tracing::warn!(
                    attempts = self.backoff.attempts(),
                    "Max reconnection attempts reached, giving up until manual reconnect"
                );
            }
        }
        effects
    }

    /// The transport could not even be constructed. Stays closed until the
    /// next `connect()` or `reconnect()`.
    pub fn transport_failed(&mut self, id: TransportId) -> Vec<Effect> {
        if self.is_current(id) {
            self.current = None;
            self.state = ConnectionState::Disconnected;
        }
        Vec::new()
    }

    /// The pending retry or debounced reconnect elapsed.
    pub fn timer_fired(&mut self) -> Vec<Effect> {
        match self.timer.take() {
            Some(PendingTimer::Retry) | Some(PendingTimer::ManualReconnect) => self.connect(),
            None => Vec::new(),
        }
    }

    fn is_current(&self, id: TransportId) -> bool {
        self.current == Some(id)
    }
}
