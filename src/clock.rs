use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use std::fmt::Debug;

/// Source of the current time for the time-dependent constraints and the evaluation results.
pub trait Clock: Debug + Send + Sync {
    fn now(&self) -> DateTime<Utc>;
}

/// The wall clock.
#[derive(Clone, Copy, Debug, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    #[inline]
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

/// A clock that always returns the time it was last set to.
#[derive(Debug)]
pub struct FixedClock(RwLock<DateTime<Utc>>);

impl FixedClock {
    pub fn new(now: DateTime<Utc>) -> Self {
        Self(RwLock::new(now))
    }

    pub fn set(&self, now: DateTime<Utc>) {
        *self.0.write() = now;
    }
}

impl Clock for FixedClock {
    #[inline]
    fn now(&self) -> DateTime<Utc> {
        *self.0.read()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn return_the_time_that_was_set() {
        let a_time = Utc.with_ymd_and_hms(2024, 5, 1, 12, 30, 0).unwrap();
        let another_time = Utc.with_ymd_and_hms(2024, 5, 2, 8, 0, 0).unwrap();
        let clock = FixedClock::new(a_time);

        assert_eq!(a_time, clock.now());
        clock.set(another_time);
        assert_eq!(another_time, clock.now());
    }
}
