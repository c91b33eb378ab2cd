//! Fire-and-forget sending of JSON payloads over a transport.

use serde::Serialize;

use super::transport::Transport;
use crate::infrastructure::messaging::ConnectionState;

/// Send `payload` if `transport` is open.
///
/// A payload that serializes to a JSON string is written verbatim; anything
/// else is sent as its JSON encoding. Returns whether the frame was handed to
/// the transport. Failures are logged, never raised.
pub fn send<P>(transport: Option<&dyn Transport>, payload: &P) -> bool
where
    P: Serialize + ?Sized,
{
    let Some(transport) = transport else {
        tracing::warn!("Cannot send message, no transport");
        return false;
    };

    let state = transport.ready_state();
    if state != ConnectionState::Open {
        tracing::warn!(state = ?state, "Cannot send message, WebSocket not open");
        return false;
    }

    let text = match encode(payload) {
        Ok(text) => text,
        Err(e) => {
            tracing::error!(error = %e, "Failed to encode outgoing message");
            return false;
        }
    };

    match transport.send_text(text) {
        Ok(()) => true,
        Err(e) => {
            tracing::error!(error = %e, "Failed to send message");
            false
        }
    }
}

/// Compact JSON in field order; a bare JSON string is unquoted.
fn encode<P>(payload: &P) -> Result<String, serde_json::Error>
where
    P: Serialize + ?Sized,
{
    let json = serde_json::to_string(payload)?;
    if json.starts_with('"') {
        return serde_json::from_str(&json);
    }
    Ok(json)
}
