//! Issuance clock.
//!
//! Receipt timestamps come from wall-clock time but must never go
//! backwards, even if the system clock does. The clock remembers the last
//! value it handed out and never returns anything smaller.

use std::sync::atomic::{AtomicI64, Ordering};
use std::time::{SystemTime, UNIX_EPOCH};

/// Get current wall-clock time in milliseconds.
pub fn now_millis() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as i64)
        .unwrap_or(0)
}

/// Monotonic-safe millisecond clock.
#[derive(Debug, Default)]
pub struct IssuanceClock {
    last: AtomicI64,
}

impl IssuanceClock {
    pub fn new() -> Self {
        Self {
            last: AtomicI64::new(0),
        }
    }

    /// Start no earlier than `floor` (e.g. the newest persisted key time).
    pub fn with_floor(floor: i64) -> Self {
        Self {
            last: AtomicI64::new(floor),
        }
    }

    /// Never return less than `floor` from now on.
    pub fn advance_to(&self, floor: i64) {
        self.last.fetch_max(floor, Ordering::AcqRel);
    }

    /// Current time, never less than any previous return value.
    pub fn now(&self) -> i64 {
        self.observe(now_millis())
    }

    /// Fold an externally read wall-clock value into the clock.
    fn observe(&self, wall: i64) -> i64 {
        let prev = self.last.fetch_max(wall, Ordering::AcqRel);
        prev.max(wall)
    }
}
