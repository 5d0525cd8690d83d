//! A 'sink' is a final destination for `Report`s.
//!
//! Both the aggregation table and the status gatherer push their summaries
//! into a sink, one `deliver` per report and one `flush` per interval.

use metric::Report;

mod buffer;
mod console;
mod null;

pub use self::buffer::Buffer;
pub use self::console::{Console, ConsoleConfig};
pub use self::null::{Null, NullConfig};

/// A destination for reports.
pub trait Sink {
    /// Accept one report.
    fn deliver(&mut self, report: Report);
    /// Make every report delivered so far durable or visible.
    fn flush(&mut self);
}

impl<'a, S: Sink + ?Sized> Sink for &'a mut S {
    fn deliver(&mut self, report: Report) {
        (**self).deliver(report)
    }

    fn flush(&mut self) {
        (**self).flush()
    }
}

impl<S: Sink + ?Sized> Sink for Box<S> {
    fn deliver(&mut self, report: Report) {
        (**self).deliver(report)
    }

    fn flush(&mut self) {
        (**self).flush()
    }
}

/// The sinks that may be configured.
#[derive(Debug, Clone, PartialEq)]
pub enum SinkConfig {
    /// See `Console`.
    Console(ConsoleConfig),
    /// See `Null`.
    Null(NullConfig),
}

impl SinkConfig {
    /// Construct the sink described by this configuration.
    pub fn build(&self) -> Box<Sink + Send> {
        match *self {
            SinkConfig::Console(ref config) => Box::new(Console::new(config)),
            SinkConfig::Null(ref config) => Box::new(Null::new(config)),
        }
    }
}
