//! Reconnect pacing for the broker session.

use std::time::Duration;

use rand::Rng;

use crate::config::BrokerOptions;

/// Delays between broker reconnect attempts.
///
/// The ceiling doubles from `reconnectDelayMS` after every failed attempt up
/// to `maxReconnectDelayMS`. Each delay is drawn from the upper half of the
/// current ceiling so a fleet of bridges restarted together spreads out.
#[derive(Debug, Clone)]
pub struct ReconnectBackoff {
    base: Duration,
    max: Duration,
    failures: u32,
}

impl ReconnectBackoff {
    pub fn new(options: &BrokerOptions) -> Self {
        let base = Duration::from_millis(options.reconnect_delay_ms);
        Self {
            base,
            max: Duration::from_millis(options.max_reconnect_delay_ms).max(base),
            failures: 0,
        }
    }

    /// Failed attempts since the last established session.
    pub fn failures(&self) -> u32 {
        self.failures
    }

    /// A session was established; start over from the base delay.
    pub fn reset(&mut self) {
        self.failures = 0;
    }

    /// Ceiling for the next delay, without jitter.
    pub fn ceiling(&self) -> Duration {
        self.base
            .checked_mul(1u32.checked_shl(self.failures).unwrap_or(u32::MAX))
            .map_or(self.max, |delay| delay.min(self.max))
    }

    /// Record a failed attempt and return how long to wait before the next one.
    pub fn next_delay(&mut self) -> Duration {
        let ceiling = self.ceiling();
        self.failures = self.failures.saturating_add(1);

        let floor = ceiling / 2;
        let spread = (ceiling - floor).as_millis() as u64;
        if spread == 0 {
            return ceiling;
        }
        floor + Duration::from_millis(rand::thread_rng().gen_range(0..=spread))
    }
}
