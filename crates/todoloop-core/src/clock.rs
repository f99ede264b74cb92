//! Wall-clock abstraction so timestamps can be pinned in tests.

use chrono::{DateTime, Utc};

pub trait Clock: Send + Sync {
    fn now(&self) -> DateTime<Utc>;
}

/// The real UTC clock.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

/// A clock that advances by a fixed step on every reading.
///
/// Gives strictly increasing timestamps without depending on wall time.
#[derive(Debug)]
pub struct SteppingClock {
    start: DateTime<Utc>,
    step: chrono::Duration,
    ticks: std::sync::atomic::AtomicI32,
}

impl SteppingClock {
    pub fn new(start: DateTime<Utc>, step: chrono::Duration) -> Self {
        Self {
            start,
            step,
            ticks: std::sync::atomic::AtomicI32::new(0),
        }
    }
}

impl Clock for SteppingClock {
    fn now(&self) -> DateTime<Utc> {
        let tick = self
            .ticks
            .fetch_add(1, std::sync::atomic::Ordering::Relaxed);
        self.start + self.step * tick
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn stepping_clock_is_strictly_increasing() {
        let clock = SteppingClock::new(Utc::now(), chrono::Duration::milliseconds(1));
        let a = clock.now();
        let b = clock.now();
        let c = clock.now();
        assert!(a < b && b < c);
        assert_eq!(c - a, chrono::Duration::milliseconds(2));
    }
}
