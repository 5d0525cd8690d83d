//! Clocks.

use chrono::Utc;
use std::{thread, time};
use std::time::Instant;

/// Seconds since the epoch, wall clock.
pub fn now() -> i64 {
    Utc::now().timestamp()
}

/// A fixed-period schedule that does not drift with the work done per period.
pub struct Interval {
    period: time::Duration,
    next: Instant,
}

impl Interval {
    /// Create an interval whose first deadline is one period from now.
    pub fn new(period: time::Duration) -> Interval {
        Interval {
            period: period,
            next: Instant::now() + period,
        }
    }

    /// Sleep until the next deadline.
    ///
    /// If the deadline already passed because the previous period overran,
    /// no sleep happens and the schedule restarts from now.
    pub fn wait(&mut self) {
        let now = Instant::now();
        if self.next > now {
            thread::sleep(self.next - now);
            self.next += self.period;
        } else {
            self.next = now + self.period;
        }
    }
}
