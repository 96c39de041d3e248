//! Time source for guard delays and retry timers.
//!
//! The uplink code never calls `Instant::now()` or sleeps directly. Everything
//! goes through a [`Clock`] so that host tests can run the full join sequence
//! (several seconds of guard time per command exchange) instantly.
//!
//! # Example
//!
//! ```
//! use std::time::Duration;
//! use rover_uplink::clock::{Clock, ManualClock};
//!
//! let clock = ManualClock::new();
//! let start = clock.now();
//! clock.delay(Duration::from_millis(1000));
//! assert_eq!(clock.now() - start, Duration::from_millis(1000));
//! ```

use std::cell::Cell;
use std::rc::Rc;
use std::time::{Duration, Instant};

/// Monotonic time source with a blocking delay.
pub trait Clock {
    /// Current instant.
    fn now(&self) -> Instant;

    /// Block the caller for `duration`.
    fn delay(&self, duration: Duration);

    /// Time elapsed since `since`.
    fn elapsed(&self, since: Instant) -> Duration {
        self.now().saturating_duration_since(since)
    }
}

/// Wall clock backed by `std::time` (works on host and ESP-IDF std builds).
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> Instant {
        Instant::now()
    }

    fn delay(&self, duration: Duration) {
        std::thread::sleep(duration);
    }
}

/// Manually advanced clock for tests.
///
/// Clones share the same time line, so a test can keep a handle while the
/// controller owns another one. [`Clock::delay`] advances time instead of
/// sleeping.
#[derive(Debug, Clone)]
pub struct ManualClock {
    origin: Instant,
    offset: Rc<Cell<Duration>>,
}

impl ManualClock {
    /// Create a clock starting at the current instant.
    pub fn new() -> Self {
        Self {
            origin: Instant::now(),
            offset: Rc::new(Cell::new(Duration::ZERO)),
        }
    }

    /// Move time forward.
    pub fn advance(&self, duration: Duration) {
        self.offset.set(self.offset.get() + duration);
    }

    /// Total time advanced since creation.
    pub fn total_elapsed(&self) -> Duration {
        self.offset.get()
    }
}

impl Default for ManualClock {
    fn default() -> Self {
        Self::new()
    }
}

impl Clock for ManualClock {
    fn now(&self) -> Instant {
        self.origin + self.offset.get()
    }

    fn delay(&self, duration: Duration) {
        self.advance(duration);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_manual_clock_starts_at_zero() {
        let clock = ManualClock::new();
        assert_eq!(clock.total_elapsed(), Duration::ZERO);
    }

    #[test]
    fn test_manual_clock_clones_share_time() {
        let clock = ManualClock::new();
        let handle = clock.clone();
        let start = handle.now();

        clock.delay(Duration::from_secs(2));
        handle.advance(Duration::from_millis(500));

        assert_eq!(clock.elapsed(start), Duration::from_millis(2500));
        assert_eq!(handle.total_elapsed(), Duration::from_millis(2500));
    }

    #[test]
    fn test_elapsed_never_negative() {
        let clock = ManualClock::new();
        let later = clock.now() + Duration::from_secs(1);
        assert_eq!(clock.elapsed(later), Duration::ZERO);
    }
}
