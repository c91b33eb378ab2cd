//! Connection lifecycle state.
//!
//! This module provides the state vocabulary shared by transports and the
//! connection manager, plus a lock-free observer for UI binding.

use std::sync::atomic::{AtomicU8, Ordering};
use std::sync::Arc;

/// Lifecycle state of a socket.
///
/// Used both for a single transport's ready state and for the logical
/// channel that the manager keeps alive across transports.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ConnectionState {
    /// No transport, or the last one has closed
    #[default]
    Disconnected,
    /// Handshake in progress
    Connecting,
    /// Frames can be sent
    Open,
    /// Close requested, waiting for the peer
    Closing,
}

impl ConnectionState {
    /// Convert to u8 for atomic storage.
    pub fn to_u8(self) -> u8 {
        match self {
            ConnectionState::Disconnected => 0,
            ConnectionState::Connecting => 1,
            ConnectionState::Open => 2,
            ConnectionState::Closing => 3,
        }
    }

    /// Convert from u8 (atomic storage).
    pub fn from_u8(v: u8) -> Self {
        match v {
            1 => ConnectionState::Connecting,
            2 => ConnectionState::Open,
            3 => ConnectionState::Closing,
            _ => ConnectionState::Disconnected,
        }
    }

    /// Open or connecting: a live transport already exists.
    pub fn is_active(self) -> bool {
        matches!(self, ConnectionState::Open | ConnectionState::Connecting)
    }
}

/// Observable connection state for UI binding.
///
/// Multiple observers can share the same underlying state; only the
/// connection manager writes it.
#[derive(Clone, Debug)]
pub struct ConnectionStateObserver {
    state: Arc<AtomicU8>,
}

impl ConnectionStateObserver {
    /// Create a new observer from a shared state Arc.
    pub fn new(state: Arc<AtomicU8>) -> Self {
        Self { state }
    }

    /// Get the current connection state.
    pub fn state(&self) -> ConnectionState {
        ConnectionState::from_u8(self.state.load(Ordering::SeqCst))
    }

    /// Check if currently open.
    pub fn is_connected(&self) -> bool {
        self.state() == ConnectionState::Open
    }
}

/// Internal helper to update connection state (used by the manager and transports).
pub fn set_connection_state(state_ref: &AtomicU8, new_state: ConnectionState) {
    state_ref.store(new_state.to_u8(), Ordering::SeqCst);
}
