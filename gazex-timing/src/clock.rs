//! Clock abstraction for deterministic testing.
//!
//! Production code uses `SystemClock`; tests use `TestClock`, whose
//! `sleep` advances time instead of blocking.

use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use crate::sleep::precise_sleep;

/// Monotonic time source shared by the link, the scheduler and the session.
pub trait Clock: Send + Sync {
    fn now(&self) -> Instant;
    fn sleep(&self, d: Duration);
}

#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> Instant {
        Instant::now()
    }

    fn sleep(&self, d: Duration) {
        precise_sleep(d)
    }
}

/// Manually advanced clock. Clones share the same instant.
#[derive(Debug, Clone)]
pub struct TestClock {
    instant: Arc<Mutex<Instant>>,
}

impl TestClock {
    pub fn new() -> Self {
        Self {
            instant: Arc::new(Mutex::new(Instant::now())),
        }
    }

    pub fn advance(&self, d: Duration) {
        let mut instant = self.instant.lock().unwrap();
        *instant += d;
    }

    pub fn advance_ms(&self, ms: f64) {
        self.advance(Duration::from_nanos((ms * 1_000_000.0).round() as u64));
    }
}

impl Default for TestClock {
    fn default() -> Self {
        Self::new()
    }
}

impl Clock for TestClock {
    fn now(&self) -> Instant {
        *self.instant.lock().unwrap()
    }

    fn sleep(&self, d: Duration) {
        self.advance(d);
    }
}

/// Milliseconds elapsed on `clock` since `epoch`.
pub fn elapsed_ms(clock: &dyn Clock, epoch: Instant) -> f64 {
    clock.now().saturating_duration_since(epoch).as_nanos() as f64 / 1_000_000.0
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn system_clock_is_monotonic() {
        let clock = SystemClock;
        let t0 = clock.now();
        assert!(clock.now() >= t0);
    }

    #[test]
    fn test_clock_advance_is_shared_between_clones() {
        let clock = TestClock::new();
        let other = clock.clone();
        let t0 = clock.now();

        other.advance(Duration::from_millis(250));

        assert_eq!(clock.now() - t0, Duration::from_millis(250));
    }

    #[test]
    fn test_clock_sleep_advances_instead_of_blocking() {
        let clock = TestClock::new();
        let t0 = clock.now();
        clock.sleep(Duration::from_secs(3600));
        assert_eq!(clock.now() - t0, Duration::from_secs(3600));
    }

    #[test]
    fn elapsed_ms_reads_fractional_milliseconds() {
        let clock = TestClock::new();
        let epoch = clock.now();
        clock.advance_ms(1.5);
        assert!((elapsed_ms(&clock, epoch) - 1.5).abs() < 1e-6);
    }
}
