use aggregate::AggregationTable;
use metric::Record;
use serde_json;
use source::Source;
use std::io::BufRead;
use std::sync::Arc;

/// Reads JSON records, one per line, into an `AggregationTable`.
///
/// A line that is not a record, or a record the table rejects, is logged and
/// skipped. Reading stops at end of input.
pub struct RecordReader<R> {
    input: R,
    table: Arc<AggregationTable>,
    accepted: u64,
    rejected: u64,
}

impl<R: BufRead> RecordReader<R> {
    /// Create a reader feeding `table` from `input`.
    pub fn new(input: R, table: Arc<AggregationTable>) -> RecordReader<R> {
        RecordReader {
            input: input,
            table: table,
            accepted: 0,
            rejected: 0,
        }
    }

    /// Lines turned into table updates so far.
    pub fn accepted(&self) -> u64 {
        self.accepted
    }

    /// Lines skipped so far.
    pub fn rejected(&self) -> u64 {
        self.rejected
    }

    fn handle(&mut self, lineno: u64, line: &str) {
        let record: Record = match serde_json::from_str(line) {
            Ok(record) => record,
            Err(e) => {
                warn!("line {}: not a record: {}", lineno, e);
                self.rejected += 1;
                return;
            }
        };
        match self.table.add(&record) {
            Ok(()) => self.accepted += 1,
            Err(e) => {
                warn!("line {}: record {} rejected: {}", lineno, record.name, e);
                self.rejected += 1;
            }
        }
    }
}

impl<R: BufRead> Source for RecordReader<R> {
    fn run(&mut self) {
        let mut lineno = 0;
        let mut line = String::new();
        loop {
            line.clear();
            match self.input.read_line(&mut line) {
                Ok(0) => break,
                Ok(_) => {
                    lineno += 1;
                    if !line.trim().is_empty() {
                        self.handle(lineno, line.trim());
                    }
                }
                Err(e) => {
                    error!("could not read records: {}", e);
                    break;
                }
            }
        }
        info!(
            "input exhausted: {} records accepted, {} rejected",
            self.accepted, self.rejected
        );
    }
}
