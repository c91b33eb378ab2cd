//! Desktop WebSocket transport using tokio-tungstenite

mod client;

pub use client::{TungsteniteConnector, TungsteniteTransport};
