//! WebSocket close codes understood by the Player.
//!
//! Only two codes are treated as deliberate shutdowns; everything else is an
//! abnormal closure and is eligible for automatic reconnection.

/// Normal closure: the purpose of the connection has been fulfilled.
pub const NORMAL_CLOSURE: u16 = 1000;

/// Going away: the peer is shutting down or navigating away.
pub const GOING_AWAY: u16 = 1001;

/// Reserved code reported when a connection ends without a close frame.
pub const ABNORMAL_CLOSURE: u16 = 1006;

/// Returns true if a close with this code should trigger a reconnect attempt.
pub fn is_abnormal(code: u16) -> bool {
    code != NORMAL_CLOSURE && code != GOING_AWAY
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn only_normal_and_going_away_are_clean() {
        assert!(!is_abnormal(NORMAL_CLOSURE));
        assert!(!is_abnormal(GOING_AWAY));
        assert!(is_abnormal(ABNORMAL_CLOSURE));
        assert!(is_abnormal(1011));
        assert!(is_abnormal(4000));
    }
}
