//! Derived metrics: from a `StatusHistory` to per-group `Report`s.
//!
//! Each `Group` is a static table mapping status properties onto output
//! fields. A property is read either as a delta between the two generations
//! of the history or as an instantaneous gauge of the current one. Any lookup
//! failure aborts the whole group, there is no partial emission.

use error::Error;
use metric::{Report, TagMap, Value};
use status::StatusHistory;
use std::fmt;

/// The tag carrying the resource identity on every group report.
pub const SERVER_TAG: &str = "server";

/// How a property is read.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Kind {
    Delta,
    Gauge,
}

use self::Kind::{Delta, Gauge};

type Mapping = (&'static str, &'static str, Kind);

const THROUGHPUT: &[Mapping] = &[
    ("Com_insert", "com_insert", Delta),
    ("Com_select", "com_select", Delta),
    ("Com_insert_select", "com_insert_select", Delta),
    ("Com_replace", "com_replace", Delta),
    ("Com_replace_select", "com_replace_select", Delta),
    ("Com_update", "com_update", Delta),
    ("Com_update_multi", "com_update_multi", Delta),
    ("Com_delete", "com_delete", Delta),
    ("Com_delete_multi", "com_delete_multi", Delta),
    ("Com_commit", "com_commit", Delta),
    ("Com_rollback", "com_rollback", Delta),
    ("Com_stmt_execute", "com_stmt_execute", Delta),
    ("Com_call_procedure", "com_call_procedure", Delta),
    ("Slow_queries", "slow_queries", Delta),
];

const CONNECTION: &[Mapping] = &[
    ("Threads_connected", "threads_connected", Gauge),
    ("Threads_running", "threads_running", Gauge),
    ("Aborted_clients", "aborted_clients", Delta),
    ("Aborted_connects", "aborted_connects", Delta),
    ("Locked_connects", "locked_connects", Delta),
];

const INNODB: &[Mapping] = &[
    ("Innodb_rows_read", "innodb_rows_read", Delta),
    ("Innodb_rows_deleted", "innodb_rows_deleted", Delta),
    ("Innodb_rows_inserted", "innodb_rows_inserted", Delta),
    ("Innodb_rows_updated", "innodb_rows_updated", Delta),
    ("Innodb_buffer_pool_reads", "innodb_buffer_pool_reads", Delta),
    ("Innodb_buffer_pool_read_requests", "innodb_buffer_pool_read_requests", Delta),
    ("Innodb_buffer_pool_write_requests", "innodb_buffer_pool_write_requests", Delta),
    ("Innodb_buffer_pool_pages_flushed", "innodb_buffer_pool_pages_flushed", Delta),
    ("Innodb_buffer_pool_wait_free", "innodb_buffer_pool_wait_free", Delta),
    ("Innodb_row_lock_current_waits", "innodb_row_lock_current_waits", Gauge),
];

// (numerator, denominator, field)
const INNODB_RATIOS: &[(&str, &str, &str)] = &[
    ("Innodb_rows_read", "Com_select", "innodb_rows_read_ratio"),
    ("Innodb_rows_deleted", "Com_delete", "innodb_rows_deleted_ratio"),
    ("Innodb_rows_inserted", "Com_insert", "innodb_rows_inserted_ratio"),
    ("Innodb_rows_updated", "Com_update", "innodb_rows_updated_ratio"),
    (
        "Innodb_buffer_pool_reads",
        "Innodb_buffer_pool_read_requests",
        "innodb_buffer_pool_reads_ratio",
    ),
];

const DB_SIZE: &[Mapping] = &[
    ("Binlog_cache_disk_use", "binlog_cache_disk_use", Gauge),
    ("Binlog_stmt_cache_disk_use", "binlog_stmt_cache_disk_use", Gauge),
    ("Created_tmp_disk_tables", "created_tmp_disk_tables", Gauge),
    ("Table_data_size", "table_data_size", Gauge),
    ("Table_index_size", "table_index_size", Gauge),
    ("Binary_log_size", "binary_log_size", Gauge),
];

const REPLICATION: &[Mapping] = &[
    ("Slave_IO_Running", "slave_io_running", Gauge),
    ("Slave_SQL_Running", "slave_sql_running", Gauge),
    ("Seconds_Behind_Master", "seconds_behind_master", Gauge),
    ("Read_Master_Log_Pos", "read_master_log_pos", Gauge),
    ("Exec_Master_Log_Pos", "exec_master_log_pos", Gauge),
    ("SQL_Delay", "sql_delay", Gauge),
    ("Last_SQL_Errno", "last_sql_errno", Gauge),
    ("Last_IO_Errno", "last_io_errno", Gauge),
];

const SNAPSHOT: &[Mapping] = &[
    ("Slow_query_count", "slow_query_count", Gauge),
    ("Long_trx_count", "long_trx_count", Gauge),
];

/// A family of derived metrics, emitted as one report.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Group {
    /// Statement counters.
    Throughput,
    /// Client connections.
    Connection,
    /// InnoDB row and buffer pool activity, with read ratios.
    Innodb,
    /// Binary log, temporary table and data sizes.
    DbSize,
    /// Replica health.
    Replication,
    /// Slow query and long transaction counts.
    Snapshot,
}

impl Group {
    /// Every group, in emission order.
    pub const ALL: [Group; 6] = [
        Group::Throughput,
        Group::Connection,
        Group::Innodb,
        Group::DbSize,
        Group::Replication,
        Group::Snapshot,
    ];

    /// The report name of the group.
    pub fn schema(&self) -> &'static str {
        match *self {
            Group::Throughput => "mysql-throughput",
            Group::Connection => "mysql-connection",
            Group::Innodb => "mysql-innodb",
            Group::DbSize => "mysql-dbsize",
            Group::Replication => "mysql-replication",
            Group::Snapshot => "mysql-snapshot",
        }
    }

    fn mappings(&self) -> &'static [Mapping] {
        match *self {
            Group::Throughput => THROUGHPUT,
            Group::Connection => CONNECTION,
            Group::Innodb => INNODB,
            Group::DbSize => DB_SIZE,
            Group::Replication => REPLICATION,
            Group::Snapshot => SNAPSHOT,
        }
    }

    fn ratios(&self) -> &'static [(&'static str, &'static str, &'static str)] {
        match *self {
            Group::Innodb => INNODB_RATIOS,
            _ => &[],
        }
    }
}

impl fmt::Display for Group {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.write_str(self.schema())
    }
}

/// `100 * numerator / denominator`, truncated toward zero
///
/// A zero denominator yields zero.
///
/// # Examples
///
/// ```
/// use tallier::derive::ratio;
///
/// assert_eq!(0, ratio(0, 0));
/// assert_eq!(25, ratio(50, 200));
/// assert_eq!(-33, ratio(-1, 3));
/// ```
pub fn ratio(numerator: i64, denominator: i64) -> i64 {
    if denominator == 0 {
        return 0;
    }
    100i64
        .saturating_mul(numerator)
        .checked_div(denominator)
        .unwrap_or(0)
}

/// Read an instantaneous status value
///
/// Integers are taken as they are, `Yes`/`ON` and `No`/`OFF` become 1 and 0,
/// anything else must be a finite float.
pub fn parse_gauge(resource: &str, key: &str, raw: &str) -> Result<Value, Error> {
    if let Ok(i) = raw.parse::<i64>() {
        return Ok(Value::Int(i));
    }
    match raw {
        "Yes" | "ON" => Ok(Value::Int(1)),
        "No" | "OFF" => Ok(Value::Int(0)),
        _ => match raw.parse::<f64>() {
            Ok(f) if f.is_finite() => Ok(Value::Float(f)),
            _ => Err(Error::Parse {
                resource: resource.to_string(),
                key: key.to_string(),
                value: raw.to_string(),
            }),
        },
    }
}

/// Compute the report of `group` from `history`.
pub fn compute(group: Group, history: &StatusHistory) -> Result<Report, Error> {
    let resource = history.resource();
    let mut tags = TagMap::default();
    tags.insert(SERVER_TAG, resource);
    let mut report = Report::new(group.schema(), tags);

    for &(key, field, kind) in group.mappings() {
        let value = match kind {
            Delta => Value::Int(history.get_property_delta(key)?),
            Gauge => parse_gauge(resource, key, &history.get_property(key)?)?,
        };
        report.insert(field, value);
    }
    for &(numerator, denominator, field) in group.ratios() {
        let num = history.get_property_delta(numerator)?;
        let den = history.get_property_delta(denominator)?;
        report.insert(field, ratio(num, den));
    }
    Ok(report)
}
