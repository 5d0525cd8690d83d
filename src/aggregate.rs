//! Aggregates are the primary internal storage type.
//!
//! Every distinct metric name and tag set seen in the inbound `Record` stream
//! gets one `Aggregate`. An aggregate counts requests and errors, estimates
//! their rates, keeps a latency reservoir and sums request and response bytes.
//! On flush each aggregate is summarized into one `Report`.

use error::Error;
use meter::{Meter, MeterSnapshot};
use metric::{Record, Report, TagMap};
use sample::{self, Sample, SampleSnapshot};
use seahash::SeaHasher;
use sink::Sink;
use std::collections::HashMap;
use std::hash::BuildHasherDefault;
use std::sync::{Mutex, MutexGuard};
use std::time::Instant;

type HashMapSea<K, V> = HashMap<K, V, BuildHasherDefault<SeaHasher>>;

/// The field holding the HTTP status of a request.
pub const STATUS_CODE: &str = "status_code";
/// The field holding the time taken to serve a request.
pub const REQUEST_TIME: &str = "request_time";
/// The field holding the request size in bytes.
pub const REQUEST_SIZE: &str = "request_size";
/// The field holding the response size in bytes.
pub const RESPONSE_SIZE: &str = "response_size";

/// Status codes above this are errors.
pub const ERROR_STATUS_THRESHOLD: i64 = 400;

const QUANTILES: [(&str, f64); 7] = [
    ("p25", 0.25),
    ("p50", 0.5),
    ("p75", 0.75),
    ("p95", 0.95),
    ("p98", 0.98),
    ("p99", 0.99),
    ("p999", 0.999),
];

// Reservoir values are reported divided by this, whatever the ingest unit.
const NANOS_PER_MILLI: f64 = 1_000_000.0;

/// What survives a flush.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResetPolicy {
    /// Only the latency reservoir is cleared. Counts, byte totals and rates
    /// accumulate from the creation of the aggregate.
    Cumulative,
    /// Everything is reset, each report covers one interval only.
    Interval,
}

impl ResetPolicy {
    /// Parse a policy from its configuration name.
    pub fn from_name(name: &str) -> Option<ResetPolicy> {
        match name {
            "cumulative" => Some(ResetPolicy::Cumulative),
            "interval" => Some(ResetPolicy::Interval),
            _ => None,
        }
    }
}

/// Configuration for `AggregationTable`.
#[derive(Debug, Clone, PartialEq)]
pub struct AggregationConfig {
    /// The unit glued onto `request_time` values, `"s"` by default.
    pub request_time_unit: String,
    /// What to reset on flush.
    pub reset_policy: ResetPolicy,
    /// Capacity of each latency reservoir.
    pub reservoir_size: usize,
    /// Decay constant of each latency reservoir.
    pub reservoir_alpha: f64,
}

impl Default for AggregationConfig {
    fn default() -> AggregationConfig {
        AggregationConfig {
            request_time_unit: "s".to_string(),
            reset_policy: ResetPolicy::Cumulative,
            reservoir_size: sample::DEFAULT_CAPACITY,
            reservoir_alpha: sample::DEFAULT_ALPHA,
        }
    }
}

/// The converted fields of one record.
///
/// Every field is converted before any aggregate is touched, so a record with
/// one bad field is rejected as a whole.
#[derive(Debug, Clone, Copy, PartialEq)]
struct Observation {
    error: bool,
    latency_ms: Option<i64>,
    request_bytes: Option<u64>,
    response_bytes: Option<u64>,
}

impl Observation {
    fn from_record(record: &Record, unit: &str) -> Result<Observation, Error> {
        let error = match record.get(STATUS_CODE) {
            Some(code) => code.as_integer(STATUS_CODE)? > ERROR_STATUS_THRESHOLD,
            None => false,
        };
        let latency_ms = match record.get(REQUEST_TIME) {
            Some(time) => Some(time.as_millis(REQUEST_TIME, unit)?),
            None => None,
        };
        let request_bytes = match record.get(REQUEST_SIZE) {
            Some(size) => Some(size.as_size(REQUEST_SIZE)?),
            None => None,
        };
        let response_bytes = match record.get(RESPONSE_SIZE) {
            Some(size) => Some(size.as_size(RESPONSE_SIZE)?),
            None => None,
        };
        Ok(Observation {
            error: error,
            latency_ms: latency_ms,
            request_bytes: request_bytes,
            response_bytes: response_bytes,
        })
    }
}

/// The accumulated state of one metric series.
pub struct Aggregate {
    name: String,
    tags: TagMap,
    requests: Meter,
    errors: Meter,
    latency: Sample,
    count: u64,
    request_bytes: u64,
    response_bytes: u64,
}

impl Aggregate {
    fn new(name: String, tags: TagMap, config: &AggregationConfig, now: Instant) -> Aggregate {
        Aggregate {
            name: name,
            tags: tags,
            requests: Meter::starting_at(now),
            errors: Meter::starting_at(now),
            latency: Sample::new(config.reservoir_size, config.reservoir_alpha),
            count: 0,
            request_bytes: 0,
            response_bytes: 0,
        }
    }

    fn apply(&mut self, obs: &Observation, now: Instant) {
        self.requests.mark_at(1, now);
        self.count = self.count.saturating_add(1);
        if obs.error {
            self.errors.mark_at(1, now);
        }
        if let Some(ms) = obs.latency_ms {
            self.latency.update_at(ms, now);
        }
        if let Some(bytes) = obs.request_bytes {
            self.request_bytes = self.request_bytes.saturating_add(bytes);
        }
        if let Some(bytes) = obs.response_bytes {
            self.response_bytes = self.response_bytes.saturating_add(bytes);
        }
    }

    /// The metric name of the series.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// The tags of the series.
    pub fn tags(&self) -> &TagMap {
        &self.tags
    }

    /// Requests counted.
    pub fn count(&self) -> u64 {
        self.count
    }

    /// Requests counted as errors.
    pub fn error_count(&self) -> u64 {
        self.errors.count()
    }

    /// Total request bytes.
    pub fn request_bytes(&self) -> u64 {
        self.request_bytes
    }

    /// Total response bytes.
    pub fn response_bytes(&self) -> u64 {
        self.response_bytes
    }

    /// The latency reservoir, in milliseconds.
    pub fn latency(&self) -> SampleSnapshot {
        self.latency.snapshot()
    }

    fn report(&mut self, now: Instant) -> Report {
        let requests = self.requests.snapshot_at(now);
        let errors = self.errors.snapshot_at(now);
        let latency = self.latency.snapshot();

        let mut report = Report::new(self.name.clone(), self.tags.clone());
        report.insert("count", self.count);
        report.insert("m1", requests.rate1);
        report.insert("m5", requests.rate5);
        report.insert("m15", requests.rate15);
        report.insert("errCount", errors.count);
        report.insert("m1err", errors.rate1);
        report.insert("m5err", errors.rate5);
        report.insert("m15err", errors.rate15);
        let (r1, r5, r15) = error_ratios(&requests, &errors);
        report.insert("m1ErrPercent", r1);
        report.insert("m5ErrPercent", r5);
        report.insert("m15ErrPercent", r15);
        for &(field, q) in &QUANTILES {
            report.insert(field, latency.quantile(q) / NANOS_PER_MILLI);
        }
        report.insert("min", latency.min() as f64 / NANOS_PER_MILLI);
        report.insert("mean", latency.mean() / NANOS_PER_MILLI);
        report.insert("max", latency.max() as f64 / NANOS_PER_MILLI);
        report.insert("reqSize", self.request_bytes);
        report.insert("respSize", self.response_bytes);
        report
    }

    fn reset(&mut self, policy: ResetPolicy, now: Instant) {
        self.latency.clear();
        if policy == ResetPolicy::Interval {
            self.requests.reset_at(now);
            self.errors.reset_at(now);
            self.count = 0;
            self.request_bytes = 0;
            self.response_bytes = 0;
        }
    }
}

fn ratio(part: f64, whole: f64) -> f64 {
    if whole > 0.0 {
        part / whole
    } else {
        0.0
    }
}

fn error_ratios(requests: &MeterSnapshot, errors: &MeterSnapshot) -> (f64, f64, f64) {
    (
        ratio(errors.rate1, requests.rate1),
        ratio(errors.rate5, requests.rate5),
        ratio(errors.rate15, requests.rate15),
    )
}

/// The table of all aggregates, keyed by metric identity.
///
/// `add` and `flush` may be called from different threads; both take the
/// table's lock for their whole duration, so a flush never sees an aggregate
/// halfway through an update.
pub struct AggregationTable {
    config: AggregationConfig,
    aggrs: Mutex<HashMapSea<u64, Aggregate>>,
}

impl Default for AggregationTable {
    fn default() -> AggregationTable {
        AggregationTable::new(AggregationConfig::default())
    }
}

impl AggregationTable {
    /// Create an empty table.
    pub fn new(config: AggregationConfig) -> AggregationTable {
        AggregationTable {
            config: config,
            aggrs: Mutex::new(HashMapSea::default()),
        }
    }

    /// The configuration of the table.
    pub fn config(&self) -> &AggregationConfig {
        &self.config
    }

    fn lock(&self) -> MutexGuard<HashMapSea<u64, Aggregate>> {
        match self.aggrs.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }

    /// Add a record to the aggregate of its series
    ///
    /// The aggregate is created on first sight of the series. A record whose
    /// fields do not convert is rejected with `Error::Validation` and leaves
    /// the table untouched.
    ///
    /// # Examples
    ///
    /// ```
    /// use tallier::aggregate::AggregationTable;
    /// use tallier::metric::Record;
    ///
    /// let table = AggregationTable::default();
    /// let record = Record::new("m1").field("status_code", "200");
    ///
    /// assert!(table.add(&record).is_ok());
    /// assert!(table.add(&Record::new("m1").field("status_code", "OK")).is_err());
    /// assert_eq!(1, table.len());
    /// ```
    pub fn add(&self, record: &Record) -> Result<(), Error> {
        self.add_at(record, Instant::now())
    }

    fn add_at(&self, record: &Record, now: Instant) -> Result<(), Error> {
        let unit = if self.config.request_time_unit.is_empty() {
            "s"
        } else {
            self.config.request_time_unit.as_str()
        };
        let obs = Observation::from_record(record, unit)?;
        let config = &self.config;
        let mut aggrs = self.lock();
        let aggr = aggrs.entry(record.identity()).or_insert_with(|| {
            trace!("new aggregate {} {:?}", record.name, record.tags);
            Aggregate::new(record.name.clone(), record.tags.clone(), config, now)
        });
        aggr.apply(&obs, now);
        Ok(())
    }

    /// Summarize every aggregate into `sink` and reset per the reset policy.
    ///
    /// Returns the number of reports delivered.
    pub fn flush<S>(&self, sink: &mut S) -> usize
    where
        S: Sink + ?Sized,
    {
        let reports = self.drain_reports(Instant::now());
        let total = reports.len();
        for report in reports {
            sink.deliver(report);
        }
        sink.flush();
        debug!("flushed {} aggregates", total);
        total
    }

    fn drain_reports(&self, now: Instant) -> Vec<Report> {
        let policy = self.config.reset_policy;
        let mut aggrs = self.lock();
        let mut reports = Vec::with_capacity(aggrs.len());
        for aggr in aggrs.values_mut() {
            reports.push(aggr.report(now));
            aggr.reset(policy, now);
        }
        reports
    }

    /// Inspect the aggregate of a series, if it exists.
    pub fn get<F, T>(&self, name: &str, tags: &TagMap, f: F) -> Option<T>
    where
        F: FnOnce(&Aggregate) -> T,
    {
        let aggrs = self.lock();
        aggrs.get(&::metric::identity(name, tags)).map(f)
    }

    /// The number of aggregates in the table.
    pub fn len(&self) -> usize {
        self.lock().len()
    }

    /// Determine if the table is empty.
    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use metric::Value;
    use quickcheck::{QuickCheck, TestResult};
    use sink::Buffer;
    use std::sync::Arc;
    use std::thread;
    use std::time::Duration;

    fn foo_bar() -> TagMap {
        vec![("foo", "bar")].into_iter().collect()
    }

    fn m1() -> Record {
        Record::new("m1")
            .overlay_tag("foo", "bar")
            .field("status_code", "200")
            .field("request_time", "10")
            .field("request_size", "1024")
            .field("response_size", "1024")
    }

    fn float(report: &Report, field: &str) -> f64 {
        report.get(field).map(|v| v.as_f64()).expect(field)
    }

    #[test]
    fn access_log_end_to_end() {
        let table = AggregationTable::default();
        table.add(&m1()).unwrap();
        table.add(&m1()).unwrap();

        let latency = table.get("m1", &foo_bar(), |a| a.latency()).unwrap();
        assert_eq!(10_000, latency.min());
        assert_eq!(10_000.0, latency.mean());
        assert_eq!(10_000, latency.max());

        let mut buffer = Buffer::default();
        assert_eq!(1, table.flush(&mut buffer));
        let report = &buffer.reports()[0];
        assert_eq!("m1", report.name);
        assert_eq!(foo_bar(), report.tags);
        assert_eq!(Some(Value::UInt(2)), report.get("count"));
        assert_eq!(Some(Value::UInt(0)), report.get("errCount"));
        assert_eq!(Some(Value::UInt(2048)), report.get("reqSize"));
        assert_eq!(Some(Value::UInt(2048)), report.get("respSize"));
        assert_eq!(0.01, float(report, "p50"));
        assert_eq!(0.01, float(report, "min"));
        assert_eq!(0.01, float(report, "mean"));
        assert_eq!(0.01, float(report, "max"));
        assert_eq!(23, report.fields.len());
    }

    #[test]
    fn second_flush_clears_latency_only() {
        let table = AggregationTable::default();
        table.add(&m1().field("status_code", "503")).unwrap();

        let mut first = Buffer::default();
        table.flush(&mut first);
        let mut second = Buffer::default();
        table.flush(&mut second);

        let report = &second.reports()[0];
        for field in &["p25", "p50", "p75", "p95", "p98", "p99", "p999", "min", "mean", "max"] {
            assert_eq!(0.0, float(report, field), "{}", field);
        }
        assert_eq!(Some(Value::UInt(1)), report.get("count"));
        assert_eq!(Some(Value::UInt(1)), report.get("errCount"));
        assert_eq!(Some(Value::UInt(1024)), report.get("reqSize"));
        assert_eq!(Some(Value::UInt(1024)), report.get("respSize"));
    }

    #[test]
    fn interval_policy_resets_everything() {
        let mut config = AggregationConfig::default();
        config.reset_policy = ResetPolicy::Interval;
        let table = AggregationTable::new(config);
        table.add(&m1()).unwrap();
        table.flush(&mut Buffer::default());

        let mut buffer = Buffer::default();
        table.flush(&mut buffer);
        let report = &buffer.reports()[0];
        assert_eq!(Some(Value::UInt(0)), report.get("count"));
        assert_eq!(Some(Value::UInt(0)), report.get("reqSize"));
        assert_eq!(Some(Value::UInt(0)), report.get("respSize"));
    }

    #[test]
    fn invalid_record_leaves_table_untouched() {
        let table = AggregationTable::default();
        let bad = m1().field("request_size", "lots");
        match table.add(&bad) {
            Err(Error::Validation { field, .. }) => assert_eq!("request_size", field),
            other => panic!("unexpected {:?}", other),
        }
        assert!(table.is_empty());

        table.add(&m1()).unwrap();
        assert!(table.add(&m1().field("request_time", "soon")).is_err());
        assert_eq!(Some(1), table.get("m1", &foo_bar(), |a| a.count()));
    }

    #[test]
    fn request_without_fields_still_counts() {
        let table = AggregationTable::default();
        table.add(&Record::new("bare")).unwrap();
        let (count, errs, size) = table
            .get("bare", &TagMap::default(), |a| {
                (a.count(), a.error_count(), a.latency().values().len())
            })
            .unwrap();
        assert_eq!((1, 0, 0), (count, errs, size));
    }

    #[test]
    fn status_400_is_not_an_error() {
        let table = AggregationTable::default();
        table.add(&Record::new("m").field("status_code", 400i64)).unwrap();
        table.add(&Record::new("m").field("status_code", 401i64)).unwrap();
        table.add(&Record::new("m").field("status_code", "500")).unwrap();
        assert_eq!(
            Some(2),
            table.get("m", &TagMap::default(), |a| a.error_count())
        );
    }

    #[test]
    fn request_time_unit_is_configurable() {
        let mut config = AggregationConfig::default();
        config.request_time_unit = "ms".to_string();
        let table = AggregationTable::new(config);
        table.add(&Record::new("m").field("request_time", 250i64)).unwrap();
        let latency = table.get("m", &TagMap::default(), |a| a.latency()).unwrap();
        assert_eq!(&[250], latency.values());
    }

    #[test]
    fn tags_separate_series() {
        let table = AggregationTable::default();
        table.add(&Record::new("m").overlay_tag("a", "1").overlay_tag("b", "2")).unwrap();
        table.add(&Record::new("m").overlay_tag("b", "2").overlay_tag("a", "1")).unwrap();
        table.add(&Record::new("m").overlay_tag("a", "1")).unwrap();
        table.add(&Record::new("n").overlay_tag("a", "1")).unwrap();
        assert_eq!(3, table.len());
    }

    #[test]
    fn error_ratios_per_window() {
        let start = Instant::now();
        let config = AggregationConfig::default();
        let mut aggr = Aggregate::new("m".into(), TagMap::default(), &config, start);
        let ok = Observation {
            error: false,
            latency_ms: None,
            request_bytes: None,
            response_bytes: None,
        };
        let err = Observation { error: true, ..ok };
        for _ in 0..3 {
            aggr.apply(&ok, start);
        }
        aggr.apply(&err, start);
        let later = start + Duration::from_secs(5);
        for _ in 0..4 {
            aggr.apply(&err, later);
        }

        let report = aggr.report(start + Duration::from_secs(10));
        for &(total, errs, ratio) in &[
            ("m1", "m1err", "m1ErrPercent"),
            ("m5", "m5err", "m5ErrPercent"),
            ("m15", "m15err", "m15ErrPercent"),
        ] {
            let expected = float(&report, errs) / float(&report, total);
            assert!((expected - float(&report, ratio)).abs() < 1e-12, "{}", ratio);
        }
        assert!(float(&report, "m1ErrPercent") > float(&report, "m5ErrPercent"));
        assert!(float(&report, "m5ErrPercent") > float(&report, "m15ErrPercent"));
        assert!(float(&report, "m15ErrPercent") > 0.25);
    }

    #[test]
    fn no_traffic_no_ratio() {
        let start = Instant::now();
        let config = AggregationConfig::default();
        let mut aggr = Aggregate::new("m".into(), TagMap::default(), &config, start);
        let report = aggr.report(start);
        assert_eq!(0.0, float(&report, "m1ErrPercent"));
        assert_eq!(0.0, float(&report, "m15ErrPercent"));
    }

    #[test]
    fn count_equals_adds() {
        fn inner(adds: u8, name: String) -> TestResult {
            let table = AggregationTable::default();
            let record = Record::new(name.clone()).overlay_tag("host", "h");
            for _ in 0..adds {
                table.add(&record).unwrap();
            }
            let tags: TagMap = vec![("host", "h")].into_iter().collect();
            let count = table.get(&name, &tags, |a| a.count());
            if adds == 0 {
                assert_eq!(None, count);
            } else {
                assert_eq!(Some(u64::from(adds)), count);
            }
            TestResult::passed()
        }
        QuickCheck::new()
            .tests(200)
            .max_tests(2000)
            .quickcheck(inner as fn(u8, String) -> TestResult);
    }

    #[test]
    fn errors_only_above_threshold() {
        fn inner(codes: Vec<u16>) -> TestResult {
            let table = AggregationTable::default();
            for code in &codes {
                table
                    .add(&Record::new("m").field("status_code", code.to_string()))
                    .unwrap();
            }
            let expected = codes.iter().filter(|c| **c > 400).count() as u64;
            let (count, errs) = table
                .get("m", &TagMap::default(), |a| (a.count(), a.error_count()))
                .unwrap_or((0, 0));
            assert_eq!(codes.len() as u64, count);
            assert_eq!(expected, errs);
            assert!(errs <= count);
            TestResult::passed()
        }
        QuickCheck::new()
            .tests(500)
            .max_tests(5000)
            .quickcheck(inner as fn(Vec<u16>) -> TestResult);
    }

    #[test]
    fn concurrent_adds_and_flushes() {
        let table = Arc::new(AggregationTable::default());
        let mut workers = Vec::new();
        for t in 0..4 {
            let table = Arc::clone(&table);
            workers.push(thread::spawn(move || {
                let record = Record::new("m").overlay_tag("worker", t.to_string());
                for _ in 0..250 {
                    table.add(&record).unwrap();
                }
            }));
        }
        let flusher = {
            let table = Arc::clone(&table);
            thread::spawn(move || {
                for _ in 0..10 {
                    table.flush(&mut Buffer::default());
                }
            })
        };
        for worker in workers {
            worker.join().unwrap();
        }
        flusher.join().unwrap();

        let mut buffer = Buffer::default();
        assert_eq!(4, table.flush(&mut buffer));
        for report in buffer.reports() {
            assert_eq!(Some(Value::UInt(250)), report.get("count"));
        }
    }
}
