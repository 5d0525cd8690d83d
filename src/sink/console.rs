//! Print reports as JSON, one per line.

use metric::Report;
use serde_json;
use sink::Sink;
use std::io::{self, Write};

/// The console sink
///
/// Each delivered report is written to the underlying writer, standard out by
/// default, as JSON. Write failures are logged and the report dropped.
pub struct Console<W: Write = io::Stdout> {
    out: W,
    pretty: bool,
    written: u64,
}

/// Configuration for the `Console` sink
#[derive(Debug, Clone, PartialEq, Default)]
pub struct ConsoleConfig {
    /// Pretty-print each report over several lines.
    pub pretty: bool,
}

impl Console<io::Stdout> {
    /// Create a console sink writing to standard out.
    pub fn new(config: &ConsoleConfig) -> Console<io::Stdout> {
        let mut console = Console::with_writer(io::stdout());
        console.pretty = config.pretty;
        console
    }
}

impl<W: Write> Console<W> {
    /// Create a console sink writing compact lines to `out`.
    pub fn with_writer(out: W) -> Console<W> {
        Console {
            out: out,
            pretty: false,
            written: 0,
        }
    }

    /// The number of reports successfully written.
    pub fn written(&self) -> u64 {
        self.written
    }

    /// Give back the underlying writer.
    pub fn into_inner(self) -> W {
        self.out
    }

    fn write(&mut self, report: &Report) -> io::Result<()> {
        let res = if self.pretty {
            serde_json::to_writer_pretty(&mut self.out, report)
        } else {
            serde_json::to_writer(&mut self.out, report)
        };
        res.map_err(|e| io::Error::new(io::ErrorKind::Other, e))?;
        self.out.write_all(b"\n")
    }
}

impl<W: Write> Sink for Console<W> {
    fn deliver(&mut self, report: Report) {
        match self.write(&report) {
            Ok(()) => self.written += 1,
            Err(e) => error!("console sink could not write {}: {}", report.name, e),
        }
    }

    fn flush(&mut self) {
        if let Err(e) = self.out.flush() {
            error!("console sink could not flush: {}", e);
        }
    }
}
