//! Shared reconnection settings for the WebSocket client.
//!
//! This module is runtime-agnostic (no tokio) so the lifecycle core and its
//! tests can use it directly.

use std::time::Duration;

// Reconnection defaults
pub const INITIAL_RETRY_DELAY_MS: u64 = 1_000;
pub const MAX_RETRY_DELAY_MS: u64 = 30_000;
pub const MAX_RETRY_ATTEMPTS: u32 = 5;

/// Delay before a manual reconnect actually opens, coalescing rapid triggers
pub const MANUAL_RECONNECT_DEBOUNCE_MS: u64 = 100;

/// Exponential backoff parameters for automatic reconnection
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReconnectConfig {
    pub initial_delay: Duration,
    pub max_delay: Duration,
    /// Automatic retries allowed before giving up
    pub max_attempts: u32,
}

impl Default for ReconnectConfig {
    fn default() -> Self {
        Self {
            initial_delay: Duration::from_millis(INITIAL_RETRY_DELAY_MS),
            max_delay: Duration::from_millis(MAX_RETRY_DELAY_MS),
            max_attempts: MAX_RETRY_ATTEMPTS,
        }
    }
}

impl ReconnectConfig {
    /// `min(initial_delay * 2^attempt, max_delay)`, saturating on overflow
    pub fn delay_for(&self, attempt: u32) -> Duration {
        let factor = 2u32.checked_pow(attempt).unwrap_or(u32::MAX);
        self.initial_delay
            .checked_mul(factor)
            .map_or(self.max_delay, |delay| delay.min(self.max_delay))
    }
}
