//! Injectable wall-clock source (§6.2: `nowMillis() -> i64`, epoch milliseconds).
//!
//! The Dedup Buffer never calls `SystemTime::now()` directly so that tests
//! can substitute a controlled clock (§4.2 Timing source).

use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};

/// A source of epoch milliseconds. Monotonic is not required (§6.2).
pub trait Clock: Send + Sync {
    fn now_millis(&self) -> i64;
}

impl<T: Clock + ?Sized> Clock for Arc<T> {
    fn now_millis(&self) -> i64 {
        (**self).now_millis()
    }
}

/// The process's real wall clock.
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now_millis(&self) -> i64 {
        SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_millis() as i64)
            .unwrap_or(0)
    }
}

/// A manually-advanced clock for deterministic tests (SPEC_FULL.md §13).
#[derive(Debug, Default)]
pub struct ManualClock {
    millis: AtomicI64,
}

impl ManualClock {
    pub fn new(start_millis: i64) -> Self {
        Self {
            millis: AtomicI64::new(start_millis),
        }
    }

    pub fn advance(&self, delta_millis: i64) {
        self.millis.fetch_add(delta_millis, Ordering::SeqCst);
    }

    pub fn set(&self, millis: i64) {
        self.millis.store(millis, Ordering::SeqCst);
    }
}

impl Clock for ManualClock {
    fn now_millis(&self) -> i64 {
        self.millis.load(Ordering::SeqCst)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn manual_clock_advances() {
        let clock = ManualClock::new(1_000);
        assert_eq!(clock.now_millis(), 1_000);
        clock.advance(50);
        assert_eq!(clock.now_millis(), 1_050);
        clock.set(0);
        assert_eq!(clock.now_millis(), 0);
    }

    #[test]
    fn system_clock_is_positive() {
        assert!(SystemClock.now_millis() > 0);
    }
}
