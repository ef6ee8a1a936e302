//! Reconnect delay schedule for the per-symbol feed loops.

use std::time::Duration;

/// Multiplicative backoff: starts at a base delay, grows 1.5x per consecutive
/// failure up to a cap, and resets to the base on a successful connect.
#[derive(Debug)]
pub struct ReconnectBackoff {
    base_secs: f64,
    cap_secs: f64,
    current_secs: f64,
}

impl ReconnectBackoff {
    pub fn new(base_secs: f64, cap_secs: f64) -> Self {
        let base_secs = base_secs.max(0.1);
        Self {
            base_secs,
            cap_secs: cap_secs.max(base_secs),
            current_secs: base_secs,
        }
    }

    /// Delay to wait after this failure; advances the schedule.
    pub fn on_failure(&mut self) -> Duration {
        let delay = self.current_secs;
        self.current_secs = (self.current_secs * 1.5).min(self.cap_secs);
        Duration::from_secs_f64(delay)
    }

    pub fn reset(&mut self) {
        self.current_secs = self.base_secs;
    }

    pub fn current_delay(&self) -> Duration {
        Duration::from_secs_f64(self.current_secs)
    }
}
