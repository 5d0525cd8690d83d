use metric::Report;
use sink::Sink;

/// Null sink
///
/// This sink is intended for testing and demonstration. Every `Report` it
/// receives will be deallocated.
pub struct Null {}

impl Null {
    /// Create a new Null sink
    pub fn new(_config: &NullConfig) -> Null {
        Null {}
    }
}

/// Configuration for the `Null` sink
#[derive(Debug, Clone, PartialEq, Default)]
pub struct NullConfig {}

impl NullConfig {
    /// Create a new `NullConfig`
    pub fn new() -> NullConfig {
        NullConfig {}
    }
}

impl Sink for Null {
    fn deliver(&mut self, _: Report) {
        // discard report
    }

    fn flush(&mut self) {
        // do nothing
    }
}
