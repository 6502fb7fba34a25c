//! Sources of the current time used to stamp cache entries.

use core::cell::Cell;

use chrono::{DateTime, TimeDelta, Utc};

/// Source of the current UTC time.
pub trait Clock {
    /// Returns the current time.
    fn now(&self) -> DateTime<Utc>;
}

impl<C: Clock + ?Sized> Clock for &C {
    #[inline]
    fn now(&self) -> DateTime<Utc> {
        (**self).now()
    }
}

/// [`Clock`] reading the system wall clock.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
#[expect(clippy::exhaustive_structs, reason = "contains no state")]
#[expect(clippy::module_name_repetitions, reason = "this is intended")]
pub struct SystemClock;

impl Clock for SystemClock {
    #[inline]
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

/// [`Clock`] which only moves when told to.
///
/// Useful to get reproducible timestamps in tests or dry runs.
#[derive(Debug, Clone, PartialEq, Eq)]
#[expect(clippy::module_name_repetitions, reason = "this is intended")]
pub struct ManualClock {
    /// Time reported by [`Clock::now`].
    now: Cell<DateTime<Utc>>,
}

impl ManualClock {
    /// Creates a clock stopped at the given time.
    #[inline]
    #[must_use]
    pub const fn new(now: DateTime<Utc>) -> Self {
        Self {
            now: Cell::new(now),
        }
    }

    /// Moves the clock to the given time, which may be in the past.
    #[inline]
    pub fn set(&self, now: DateTime<Utc>) {
        self.now.set(now);
    }

    /// Moves the clock forward by the given amount.
    #[inline]
    pub fn advance(&self, delta: TimeDelta) {
        self.now.set(self.now.get() + delta);
    }
}

impl Clock for ManualClock {
    #[inline]
    fn now(&self) -> DateTime<Utc> {
        self.now.get()
    }
}

#[cfg(test)]
mod tests {
    use chrono::TimeZone as _;

    use super::*;

    #[test]
    fn manual_clock_moves_only_when_told() {
        let start = Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap();
        let clock = ManualClock::new(start);
        assert_eq!(clock.now(), start);
        assert_eq!(clock.now(), start);

        clock.advance(TimeDelta::hours(1));
        assert_eq!(clock.now(), start + TimeDelta::hours(1));

        clock.set(start);
        assert_eq!((&clock).now(), start);
    }

    #[test]
    fn system_clock_is_not_in_the_past() {
        let before = Utc::now();
        assert!(SystemClock.now() >= before);
    }
}
