//! Connection state shared between transports, the connection manager and
//! observers.

pub mod connection;

pub use connection::{set_connection_state, ConnectionState, ConnectionStateObserver};
