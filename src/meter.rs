//! Exponentially-weighted rate meters.
//!
//! A `Meter` counts events and keeps three exponentially-weighted moving
//! averages of the event rate, one each for 1, 5 and 15 minute windows. The
//! averages are advanced in fixed five second ticks. There is no background
//! thread doing the ticking: a meter catches up on every tick it owes whenever
//! it is marked or read.

use std::time::{Duration, Instant};

/// Seconds between two ticks of a meter.
pub const TICK_INTERVAL_SECS: u64 = 5;

/// An exponentially-weighted moving average of a per-second rate.
#[derive(Debug, Clone)]
pub struct Ewma {
    alpha: f64,
    rate: f64,
    uncounted: u64,
    initialized: bool,
}

impl Ewma {
    /// Create an average with the given smoothing constant.
    pub fn new(alpha: f64) -> Ewma {
        Ewma {
            alpha: alpha,
            rate: 0.0,
            uncounted: 0,
            initialized: false,
        }
    }

    /// Create an average which decays over `minutes`, ticked every
    /// `TICK_INTERVAL_SECS`.
    pub fn with_window(minutes: f64) -> Ewma {
        let ticks_per_minute = 60.0 / TICK_INTERVAL_SECS as f64;
        Ewma::new(1.0 - (-1.0 / ticks_per_minute / minutes).exp())
    }

    /// Record `n` events since the last tick.
    pub fn update(&mut self, n: u64) {
        self.uncounted = self.uncounted.saturating_add(n);
    }

    /// Fold the events recorded since the last tick into the average.
    ///
    /// The first tick seeds the average with the instant rate.
    pub fn tick(&mut self) {
        let instant = self.uncounted as f64 / TICK_INTERVAL_SECS as f64;
        self.uncounted = 0;
        if self.initialized {
            self.rate += self.alpha * (instant - self.rate);
        } else {
            self.rate = instant;
            self.initialized = true;
        }
    }

    /// The average, in events per second.
    pub fn rate(&self) -> f64 {
        self.rate
    }
}

/// A point-in-time read of a `Meter`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct MeterSnapshot {
    /// Total events marked.
    pub count: u64,
    /// One minute rate, events per second.
    pub rate1: f64,
    /// Five minute rate, events per second.
    pub rate5: f64,
    /// Fifteen minute rate, events per second.
    pub rate15: f64,
}

/// Counts events and estimates their 1, 5 and 15 minute rates.
#[derive(Debug, Clone)]
pub struct Meter {
    count: u64,
    m1: Ewma,
    m5: Ewma,
    m15: Ewma,
    last_tick: Instant,
}

impl Default for Meter {
    fn default() -> Meter {
        Meter::starting_at(Instant::now())
    }
}

impl Meter {
    /// Create a meter whose clock starts at `now`.
    pub fn starting_at(now: Instant) -> Meter {
        Meter {
            count: 0,
            m1: Ewma::with_window(1.0),
            m5: Ewma::with_window(5.0),
            m15: Ewma::with_window(15.0),
            last_tick: now,
        }
    }

    /// Record `n` events now.
    pub fn mark(&mut self, n: u64) {
        self.mark_at(n, Instant::now())
    }

    /// Record `n` events at `now`.
    pub fn mark_at(&mut self, n: u64, now: Instant) {
        self.tick_to(now);
        self.count = self.count.saturating_add(n);
        self.m1.update(n);
        self.m5.update(n);
        self.m15.update(n);
    }

    /// Total events marked.
    pub fn count(&self) -> u64 {
        self.count
    }

    /// Advance all three averages by one tick.
    pub fn tick(&mut self) {
        self.m1.tick();
        self.m5.tick();
        self.m15.tick();
    }

    fn tick_to(&mut self, now: Instant) {
        if now <= self.last_tick {
            return;
        }
        let owed = (now - self.last_tick).as_secs() / TICK_INTERVAL_SECS;
        for _ in 0..owed {
            self.tick();
        }
        self.last_tick += Duration::from_secs(owed * TICK_INTERVAL_SECS);
    }

    /// Read the meter now.
    pub fn snapshot(&mut self) -> MeterSnapshot {
        self.snapshot_at(Instant::now())
    }

    /// Read the meter at `now`, first catching up on owed ticks.
    pub fn snapshot_at(&mut self, now: Instant) -> MeterSnapshot {
        self.tick_to(now);
        MeterSnapshot {
            count: self.count,
            rate1: self.m1.rate(),
            rate5: self.m5.rate(),
            rate15: self.m15.rate(),
        }
    }

    /// Forget everything, restarting the clock at `now`.
    pub fn reset_at(&mut self, now: Instant) {
        *self = Meter::starting_at(now);
    }
}
