//! Elapsed-time gate between join attempts.

use std::time::{Duration, Instant};

/// Non-blocking timer: [`RetryTimer::is_due`] turns true once `interval`
/// has passed since the last restart.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryTimer {
    started: Instant,
    interval: Duration,
}

impl RetryTimer {
    /// Start a timer at `now`.
    pub fn new(now: Instant, interval: Duration) -> Self {
        Self {
            started: now,
            interval,
        }
    }

    /// Restart at `now` with a (possibly different) interval.
    pub fn restart(&mut self, now: Instant, interval: Duration) {
        self.started = now;
        self.interval = interval;
    }

    /// Whether the interval has elapsed.
    pub fn is_due(&self, now: Instant) -> bool {
        now.saturating_duration_since(self.started) >= self.interval
    }

    /// Time left until due.
    pub fn remaining(&self, now: Instant) -> Duration {
        self.interval
            .saturating_sub(now.saturating_duration_since(self.started))
    }

    /// Current interval.
    pub fn interval(&self) -> Duration {
        self.interval
    }
}
