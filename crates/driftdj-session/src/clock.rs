//! Injectable wall clock
//!
//! Every recovery timer in the orchestrator (probe interval, reconnect
//! confirmation, stuck-loading watchdog, throttle windows) reads time
//! through this trait, so the state machine tests run instantly on a
//! mock clock instead of sleeping.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

pub trait Clock: Send {
    fn now(&self) -> Instant;
}

/// The real thing
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> Instant {
        Instant::now()
    }
}

/// Manually-advanced clock for tests
///
/// Clones share the same timeline, so a test can hold one handle and
/// hand another to the orchestrator.
#[derive(Clone)]
pub struct MockClock {
    base: Instant,
    offset_millis: Arc<AtomicU64>,
}

impl MockClock {
    pub fn new() -> Self {
        Self {
            base: Instant::now(),
            offset_millis: Arc::new(AtomicU64::new(0)),
        }
    }

    pub fn advance(&self, duration: Duration) {
        self.offset_millis
            .fetch_add(duration.as_millis() as u64, Ordering::SeqCst);
    }
}

impl Default for MockClock {
    fn default() -> Self {
        Self::new()
    }
}

impl Clock for MockClock {
    fn now(&self) -> Instant {
        self.base + Duration::from_millis(self.offset_millis.load(Ordering::SeqCst))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_mock_clock_advances_shared_timeline() {
        let clock = MockClock::new();
        let other = clock.clone();
        let start = clock.now();

        other.advance(Duration::from_secs(5));

        assert_eq!(clock.now() - start, Duration::from_secs(5));
    }

    #[test]
    fn test_system_clock_is_monotonic() {
        let clock = SystemClock;
        let a = clock.now();
        let b = clock.now();
        assert!(b >= a);
    }
}
