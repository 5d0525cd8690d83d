//! A fixed-capacity reservoir for approximate quantiles.
//!
//! `Sample` keeps at most `capacity` values out of an unbounded stream. Each
//! value is given the priority `exp(alpha * age) / u`, `u` uniform in (0, 1]
//! and `age` the seconds between the start of the reservoir and the update,
//! and only the highest priorities are kept. Later values are exponentially
//! more likely to survive, so quantiles are biased toward the recent past.
//! Priorities are rescaled once an hour to stay within floating point range.

use rand::{self, Rng, XorShiftRng};
use std::cmp::Ordering;
use std::collections::BinaryHeap;
use std::time::{Duration, Instant};

/// The default reservoir capacity.
pub const DEFAULT_CAPACITY: usize = 1028;
/// The default decay constant, per second.
pub const DEFAULT_ALPHA: f64 = 0.015;

const RESCALE_THRESHOLD_SECS: u64 = 60 * 60;

#[derive(Debug, Clone, Copy)]
struct Weighted {
    priority: f64,
    value: i64,
}

impl PartialEq for Weighted {
    fn eq(&self, other: &Weighted) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl Eq for Weighted {}

impl PartialOrd for Weighted {
    fn partial_cmp(&self, other: &Weighted) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

// Reversed, so that the heap's top is the lowest priority.
impl Ord for Weighted {
    fn cmp(&self, other: &Weighted) -> Ordering {
        other
            .priority
            .partial_cmp(&self.priority)
            .unwrap_or(Ordering::Equal)
    }
}

/// An exponentially-decaying weighted random sample.
pub struct Sample {
    capacity: usize,
    alpha: f64,
    count: u64,
    start: Instant,
    next_rescale: Instant,
    heap: BinaryHeap<Weighted>,
    rng: XorShiftRng,
}

impl Default for Sample {
    fn default() -> Sample {
        Sample::new(DEFAULT_CAPACITY, DEFAULT_ALPHA)
    }
}

impl Sample {
    /// Create a sample holding at most `capacity` values, decaying at `alpha`.
    pub fn new(capacity: usize, alpha: f64) -> Sample {
        let now = Instant::now();
        Sample {
            capacity: capacity,
            alpha: alpha,
            count: 0,
            start: now,
            next_rescale: now + Duration::from_secs(RESCALE_THRESHOLD_SECS),
            heap: BinaryHeap::with_capacity(capacity),
            rng: rand::weak_rng(),
        }
    }

    /// Insert a value now.
    pub fn update(&mut self, value: i64) {
        self.update_at(value, Instant::now())
    }

    /// Insert a value at `now`.
    pub fn update_at(&mut self, value: i64, now: Instant) {
        if now >= self.next_rescale {
            self.rescale(now);
        }
        self.count = self.count.saturating_add(1);
        if self.capacity == 0 {
            return;
        }
        let age = seconds_between(self.start, now);
        // gen yields [0, 1), priorities must not divide by zero
        let u = 1.0 - self.rng.gen::<f64>();
        let item = Weighted {
            priority: (self.alpha * age).exp() / u,
            value: value,
        };
        if self.heap.len() < self.capacity {
            self.heap.push(item);
        } else if let Some(lowest) = self.heap.peek().map(|w| w.priority) {
            if item.priority > lowest {
                self.heap.pop();
                self.heap.push(item);
            }
        }
    }

    fn rescale(&mut self, now: Instant) {
        let old_start = self.start;
        self.start = now;
        self.next_rescale = now + Duration::from_secs(RESCALE_THRESHOLD_SECS);
        let factor = (-self.alpha * seconds_between(old_start, now)).exp();
        let rescaled: Vec<Weighted> = self.heap
            .drain()
            .map(|w| Weighted {
                priority: w.priority * factor,
                value: w.value,
            })
            .collect();
        self.heap.extend(rescaled);
    }

    /// Drop every value and restart the decay clock.
    pub fn clear(&mut self) {
        let now = Instant::now();
        self.count = 0;
        self.heap.clear();
        self.start = now;
        self.next_rescale = now + Duration::from_secs(RESCALE_THRESHOLD_SECS);
    }

    /// The number of values inserted since the last clear, retained or not.
    pub fn count(&self) -> u64 {
        self.count
    }

    /// The number of values currently retained.
    pub fn size(&self) -> usize {
        self.heap.len()
    }

    /// Freeze the retained values for querying.
    pub fn snapshot(&self) -> SampleSnapshot {
        let mut values: Vec<i64> = self.heap.iter().map(|w| w.value).collect();
        values.sort();
        SampleSnapshot {
            count: self.count,
            values: values,
        }
    }
}

fn seconds_between(earlier: Instant, later: Instant) -> f64 {
    if later > earlier {
        let d = later - earlier;
        d.as_secs() as f64 + f64::from(d.subsec_nanos()) / 1e9
    } else {
        0.0
    }
}

/// The sorted values of a `Sample` at one point in time.
///
/// Every query of an empty snapshot answers zero.
#[derive(Debug, Clone, PartialEq)]
pub struct SampleSnapshot {
    count: u64,
    values: Vec<i64>,
}

impl SampleSnapshot {
    /// The number of values inserted into the sample, retained or not.
    pub fn count(&self) -> u64 {
        self.count
    }

    /// The retained values, ascending.
    pub fn values(&self) -> &[i64] {
        &self.values
    }

    /// The smallest retained value.
    pub fn min(&self) -> i64 {
        self.values.first().cloned().unwrap_or(0)
    }

    /// The largest retained value.
    pub fn max(&self) -> i64 {
        self.values.last().cloned().unwrap_or(0)
    }

    /// The arithmetic mean of the retained values.
    pub fn mean(&self) -> f64 {
        if self.values.is_empty() {
            return 0.0;
        }
        let sum: f64 = self.values.iter().map(|v| *v as f64).sum();
        sum / self.values.len() as f64
    }

    /// Estimate the `q` quantile, `q` in [0, 1].
    ///
    /// The estimate interpolates linearly between the two retained values
    /// closest to rank `q * (n + 1)`. A `q` that is NaN reads as 0.
    pub fn quantile(&self, q: f64) -> f64 {
        let n = self.values.len();
        if n == 0 {
            return 0.0;
        }
        let pos = q * (n as f64 + 1.0);
        if !(pos >= 1.0) {
            self.values[0] as f64
        } else if pos >= n as f64 {
            self.values[n - 1] as f64
        } else {
            let lower = self.values[pos as usize - 1] as f64;
            let upper = self.values[pos as usize] as f64;
            lower + (pos - pos.floor()) * (upper - lower)
        }
    }

    /// Estimate several quantiles at once.
    pub fn quantiles(&self, qs: &[f64]) -> Vec<f64> {
        qs.iter().map(|q| self.quantile(*q)).collect()
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use quickcheck::{QuickCheck, TestResult};

    #[test]
    fn keeps_everything_below_capacity() {
        let mut sample = Sample::new(100, DEFAULT_ALPHA);
        for i in 0..10 {
            sample.update(i);
        }
        assert_eq!(10, sample.count());
        assert_eq!(10, sample.size());
        assert_eq!(&[0, 1, 2, 3, 4, 5, 6, 7, 8, 9], sample.snapshot().values());
    }

    #[test]
    fn bounded_by_capacity() {
        let mut sample = Sample::new(100, 0.99);
        for i in 0..1000 {
            sample.update(i);
        }
        assert_eq!(1000, sample.count());
        assert_eq!(100, sample.size());
        let snap = sample.snapshot();
        assert!(snap.values().iter().all(|v| *v >= 0 && *v < 1000));
    }

    #[test]
    fn recent_values_win() {
        let start = Instant::now();
        let mut sample = Sample::new(10, DEFAULT_ALPHA);
        for i in 0..10 {
            sample.update_at(i, start);
        }
        // fifty minutes on, at alpha 0.015, old priorities are hopeless
        let later = start + Duration::from_secs(50 * 60);
        for i in 100..110 {
            sample.update_at(i, later);
        }
        assert_eq!(&[100, 101, 102, 103, 104, 105, 106, 107, 108, 109],
                   sample.snapshot().values());
    }

    #[test]
    fn survives_rescale() {
        let start = Instant::now();
        let mut sample = Sample::new(10, DEFAULT_ALPHA);
        sample.update_at(1, start);
        sample.update_at(2, start + Duration::from_secs(2 * 60 * 60));
        assert_eq!(2, sample.size());
        assert_eq!(&[1, 2], sample.snapshot().values());
    }

    #[test]
    fn clear_empties() {
        let mut sample = Sample::default();
        sample.update(10_000);
        sample.update(10_000);
        sample.clear();
        assert_eq!(0, sample.count());
        let snap = sample.snapshot();
        assert_eq!(0, snap.min());
        assert_eq!(0, snap.max());
        assert_eq!(0.0, snap.mean());
        assert_eq!(0.0, snap.quantile(0.99));
    }

    #[test]
    fn nan_quantile_reads_as_minimum() {
        let mut sample = Sample::default();
        for v in &[30, 10, 20] {
            sample.update(*v);
        }
        let snap = sample.snapshot();
        assert_eq!(10.0, snap.quantile(::std::f64::NAN));
        assert_eq!(10.0, snap.quantile(-1.0));
        assert_eq!(30.0, snap.quantile(2.0));
    }

    #[test]
    fn point_queries() {
        let mut sample = Sample::default();
        for v in &[10_000, 10_000] {
            sample.update(*v);
        }
        let snap = sample.snapshot();
        assert_eq!(10_000, snap.min());
        assert_eq!(10_000, snap.max());
        assert_eq!(10_000.0, snap.mean());
        assert_eq!(10_000.0, snap.quantile(0.5));
    }

    #[test]
    fn interpolated_quantiles() {
        let mut sample = Sample::default();
        for v in 1..101 {
            sample.update(v);
        }
        let snap = sample.snapshot();
        let expected = [25.25, 50.5, 75.75, 95.95, 98.98, 99.99, 100.0];
        let actual = snap.quantiles(&[0.25, 0.5, 0.75, 0.95, 0.98, 0.99, 0.999]);
        for (e, a) in expected.iter().zip(actual.iter()) {
            assert!((e - a).abs() < 1e-9, "{} != {}", e, a);
        }
        assert_eq!(50.5, snap.mean());
    }

    #[test]
    fn quantiles_within_bounds() {
        fn inner(vals: Vec<i32>, q: u8) -> TestResult {
            if vals.is_empty() {
                return TestResult::discard();
            }
            let q = f64::from(q) / 255.0;
            let mut sample = Sample::new(64, DEFAULT_ALPHA);
            for v in &vals {
                sample.update(i64::from(*v));
            }
            let snap = sample.snapshot();
            let est = snap.quantile(q);
            assert!(snap.min() as f64 <= est && est <= snap.max() as f64);
            assert!(snap.min() as f64 <= snap.mean() && snap.mean() <= snap.max() as f64);
            TestResult::passed()
        }
        QuickCheck::new()
            .tests(1000)
            .max_tests(10000)
            .quickcheck(inner as fn(Vec<i32>, u8) -> TestResult);
    }
}
