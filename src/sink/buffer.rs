use metric::Report;
use sink::Sink;

/// Keeps every delivered `Report` in memory.
#[derive(Debug, Default)]
pub struct Buffer {
    reports: Vec<Report>,
    flushes: usize,
}

impl Buffer {
    /// The reports delivered so far, oldest first.
    pub fn reports(&self) -> &[Report] {
        &self.reports
    }

    /// The number of times the buffer was flushed.
    pub fn flushes(&self) -> usize {
        self.flushes
    }

    /// Take every report out of the buffer.
    pub fn drain(&mut self) -> Vec<Report> {
        ::std::mem::replace(&mut self.reports, Vec::new())
    }

    /// Find the first report with the given name.
    pub fn find(&self, name: &str) -> Option<&Report> {
        self.reports.iter().find(|r| r.name == name)
    }
}

impl Sink for Buffer {
    fn deliver(&mut self, report: Report) {
        self.reports.push(report);
    }

    fn flush(&mut self) {
        self.flushes += 1;
    }
}
