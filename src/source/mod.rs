//! Sources drive the library: they feed records into the aggregation table,
//! or wake up on a timer to flush it and to poll resources.
//!
//! Every source is meant to be `run` on a thread of its own.

mod flush;
mod poll;
mod reader;

pub use self::flush::FlushTimer;
pub use self::poll::{BoxedProvider, Poller};
pub use self::reader::RecordReader;

/// A long-running producer of work.
pub trait Source {
    /// Run until the input is exhausted, or forever for timed sources.
    fn run(&mut self);
}
