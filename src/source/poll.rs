use gather::Gatherer;
use sink::Sink;
use source::Source;
use status::StatusProvider;
use std::mem;
use std::time::Duration;
use time::Interval;

/// A boxed provider, as the `Poller` keeps them.
pub type BoxedProvider = Box<StatusProvider + Send>;

/// Polls every configured resource on a fixed interval.
pub struct Poller {
    gatherer: Gatherer,
    resources: Vec<(String, BoxedProvider)>,
    sinks: Vec<Box<Sink + Send>>,
    interval: Duration,
}

impl Poller {
    /// Create a new Poller. This will not produce a new thread, that must be
    /// managed by the end-user.
    pub fn new(
        gatherer: Gatherer,
        resources: Vec<(String, BoxedProvider)>,
        sinks: Vec<Box<Sink + Send>>,
        interval: Duration,
    ) -> Poller {
        Poller {
            gatherer: gatherer,
            resources: resources,
            sinks: sinks,
            interval: interval,
        }
    }

    /// The number of resources still being polled.
    pub fn resources(&self) -> usize {
        self.resources.len()
    }

    /// Poll every resource once and deliver the group reports.
    ///
    /// Returns the number of reports delivered to each sink.
    pub fn poll_once(&mut self) -> usize {
        let resources = mem::replace(&mut self.resources, Vec::new());
        let (gathered, resources) = self.gatherer.gather(resources);
        self.resources = resources;
        let total = gathered.reports.len();
        for sink in &mut self.sinks {
            for report in &gathered.reports {
                sink.deliver(report.clone());
            }
            sink.flush();
        }
        debug!(
            "polled {} resources: {} reports, {} failures",
            self.resources.len(),
            total,
            gathered.errors.len()
        );
        total
    }
}

impl Source for Poller {
    fn run(&mut self) {
        let mut interval = Interval::new(self.interval);
        loop {
            interval.wait();
            self.poll_once();
        }
    }
}
