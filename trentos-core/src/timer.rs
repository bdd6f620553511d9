//! Timer: a monotonic time point plus pure functions over it. Kept as
//! essentially value-type plumbing, with no async driver attached — a
//! synchronous library cannot own a blocking sleep without surprising an
//! embedder, so the actual wait is left to the caller's own loop.

use std::time::Duration;

/// A monotonic clock reading expressed as an offset from some unspecified
/// epoch. Only differences and additions between points from the *same*
/// source are meaningful.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord)]
pub struct MonotonicTimePoint(Duration);

impl MonotonicTimePoint {
    pub fn from_offset(offset: Duration) -> Self {
        MonotonicTimePoint(offset)
    }

    pub fn as_duration(self) -> Duration {
        self.0
    }

    /// Saturating difference; never panics on a time point that appears to
    /// be in the past relative to `earlier`.
    pub fn saturating_duration_since(self, earlier: MonotonicTimePoint) -> Duration {
        self.0.checked_sub(earlier.0).unwrap_or(Duration::ZERO)
    }

    pub fn saturating_add(self, delta: Duration) -> MonotonicTimePoint {
        MonotonicTimePoint(self.0.saturating_add(delta))
    }
}

/// Supplies the current time. Injected so callers can substitute a fake
/// clock in tests rather than reading the OS clock directly.
pub trait Clock: Send + Sync {
    fn now(&self) -> MonotonicTimePoint;
}

/// Reads `std::time::Instant` relative to process start.
pub struct SystemClock {
    start: std::time::Instant,
}

impl SystemClock {
    pub fn new() -> Self {
        Self { start: std::time::Instant::now() }
    }
}

impl Default for SystemClock {
    fn default() -> Self {
        Self::new()
    }
}

impl Clock for SystemClock {
    fn now(&self) -> MonotonicTimePoint {
        MonotonicTimePoint::from_offset(self.start.elapsed())
    }
}

/// A clock a test can advance by hand.
pub struct FixedClock {
    now: parking_lot::Mutex<MonotonicTimePoint>,
}

impl FixedClock {
    pub fn new(start: MonotonicTimePoint) -> Self {
        Self { now: parking_lot::Mutex::new(start) }
    }

    pub fn advance(&self, delta: Duration) {
        let mut now = self.now.lock();
        *now = now.saturating_add(delta);
    }
}

impl Clock for FixedClock {
    fn now(&self) -> MonotonicTimePoint {
        *self.now.lock()
    }
}

/// Remaining time until `deadline`, zero if it has already passed.
pub fn remaining(clock: &dyn Clock, deadline: MonotonicTimePoint) -> Duration {
    deadline.saturating_duration_since(clock.now())
}

/// Whether `deadline` has been reached or passed.
pub fn sleep_until_elapsed(clock: &dyn Clock, deadline: MonotonicTimePoint) -> bool {
    clock.now() >= deadline
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn remaining_is_zero_past_deadline() {
        let clock = FixedClock::new(MonotonicTimePoint::from_offset(Duration::from_secs(10)));
        let deadline = MonotonicTimePoint::from_offset(Duration::from_secs(5));
        assert_eq!(remaining(&clock, deadline), Duration::ZERO);
        assert!(sleep_until_elapsed(&clock, deadline));
    }

    #[test]
    fn remaining_counts_down_as_clock_advances() {
        let clock = FixedClock::new(MonotonicTimePoint::from_offset(Duration::ZERO));
        let deadline = MonotonicTimePoint::from_offset(Duration::from_secs(2));
        assert!(!sleep_until_elapsed(&clock, deadline));
        assert_eq!(remaining(&clock, deadline), Duration::from_secs(2));
        clock.advance(Duration::from_secs(1));
        assert_eq!(remaining(&clock, deadline), Duration::from_secs(1));
        clock.advance(Duration::from_secs(5));
        assert!(sleep_until_elapsed(&clock, deadline));
    }
}
