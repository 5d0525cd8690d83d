use aggregate::AggregationTable;
use sink::Sink;
use source::Source;
use std::sync::Arc;
use std::time::Duration;
use time::Interval;

/// The source of all flush pulses. See `FlushTimer::run` for more details.
pub struct FlushTimer {
    table: Arc<AggregationTable>,
    sinks: Vec<Box<Sink + Send>>,
    interval: Duration,
}

impl FlushTimer {
    /// Create a new FlushTimer. This will not produce a new thread, that must
    /// be managed by the end-user.
    pub fn new(
        table: Arc<AggregationTable>,
        sinks: Vec<Box<Sink + Send>>,
        interval: Duration,
    ) -> FlushTimer {
        FlushTimer {
            table: table,
            sinks: sinks,
            interval: interval,
        }
    }

    /// Flush the table into every sink once.
    ///
    /// Each sink gets the same reports. Returns the number of reports made.
    pub fn flush_once(&mut self) -> usize {
        let mut buffer = ::sink::Buffer::default();
        let total = self.table.flush(&mut buffer);
        let reports = buffer.drain();
        for sink in &mut self.sinks {
            for report in &reports {
                sink.deliver(report.clone());
            }
            sink.flush();
        }
        total
    }

    /// Give back the sinks.
    pub fn into_sinks(self) -> Vec<Box<Sink + Send>> {
        self.sinks
    }
}

impl Source for FlushTimer {
    /// Flush every `interval`, forever.
    ///
    /// The schedule does not drift: a slow flush shortens the following sleep.
    fn run(&mut self) {
        let mut interval = Interval::new(self.interval);
        loop {
            interval.wait();
            let total = self.flush_once();
            trace!("flush pulse, {} reports", total);
        }
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use metric::Record;
    use sink::{Buffer, Null, NullConfig};
    use std::sync::Mutex;
    use metric::Report;

    struct Shared(Arc<Mutex<Vec<Report>>>);

    impl Sink for Shared {
        fn deliver(&mut self, report: Report) {
            self.0.lock().unwrap().push(report);
        }

        fn flush(&mut self) {}
    }

    #[test]
    fn every_sink_sees_every_report() {
        let table = Arc::new(AggregationTable::default());
        table.add(&Record::new("a")).unwrap();
        table.add(&Record::new("b")).unwrap();

        let seen = Arc::new(Mutex::new(Vec::new()));
        let sinks: Vec<Box<Sink + Send>> = vec![
            Box::new(Shared(Arc::clone(&seen))),
            Box::new(Null::new(&NullConfig::new())),
            Box::new(Buffer::default()),
        ];
        let mut timer = FlushTimer::new(Arc::clone(&table), sinks, Duration::from_secs(60));
        assert_eq!(2, timer.flush_once());
        assert_eq!(2, seen.lock().unwrap().len());

        assert_eq!(2, timer.flush_once());
        assert_eq!(4, seen.lock().unwrap().len());
        assert_eq!(3, timer.into_sinks().len());
    }
}
