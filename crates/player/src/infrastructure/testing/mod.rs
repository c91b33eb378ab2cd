//! In-memory transports and connectors used across unit and integration tests.

mod fixtures;

pub use fixtures::{InMemoryConnector, RecordingTransport};
