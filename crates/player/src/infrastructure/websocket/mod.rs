//! Reconnecting WebSocket channel
//!
//! - `core`: runtime-free lifecycle decisions (backoff, de-duplication, teardown)
//! - `bridge`: tokio actor executing the core's effects, plus the owning handle
//! - `desktop`: tokio-tungstenite transport
//! - `dispatcher`: readiness-checked JSON sends

mod bridge;
mod core;
mod dispatcher;
mod shared;
mod transport;

mod desktop;

pub use bridge::{create_connection, Connection, ConnectionHandlers};
pub use core::{BackoffState, ConnectionCore, Effect};
pub use desktop::{TungsteniteConnector, TungsteniteTransport};
pub use dispatcher::send;
pub use shared::{
    ReconnectConfig, INITIAL_RETRY_DELAY_MS, MANUAL_RECONNECT_DEBOUNCE_MS, MAX_RETRY_ATTEMPTS,
    MAX_RETRY_DELAY_MS,
};
pub use transport::{Connector, EventSink, Transport, TransportError, TransportEvent, TransportId};
