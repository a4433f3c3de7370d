//! Reconnect backoff policy

use std::time::Duration;

/// Exponential backoff for reconnection attempts
///
/// Delay for attempt `n` (zero-based) is `base_delay * 2^n`, capped at
/// `max_delay`. After `max_attempts` failed attempts the client gives up
/// and surfaces a terminal disconnected state.
#[derive(Debug, Clone)]
pub struct ReconnectPolicy {
    pub base_delay: Duration,
    pub max_delay: Duration,
    pub max_attempts: u32,
}

impl Default for ReconnectPolicy {
    fn default() -> Self {
        Self {
            base_delay: Duration::from_secs(1),
            max_delay: Duration::from_secs(30),
            max_attempts: 10,
        }
    }
}

impl ReconnectPolicy {
    /// Delay before the given zero-based attempt, or `None` once the
    /// attempt budget is spent
    pub fn delay_for(&self, attempt: u32) -> Option<Duration> {
        if attempt >= self.max_attempts {
            return None;
        }

        let factor = 2u32.checked_pow(attempt).unwrap_or(u32::MAX);
        let delay = self
            .base_delay
            .checked_mul(factor)
            .unwrap_or(self.max_delay);
        Some(delay.min(self.max_delay))
    }
}
