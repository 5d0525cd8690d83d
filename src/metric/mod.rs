//! The records that cross the boundary of tallier.
//!
//! A `Record` comes in from the log-parsing front end, one per access log
//! line. A `Report` goes out to the sinks, one per aggregate or metric group
//! per interval.

use error::Error;
use std::collections::{BTreeMap, HashMap};
use std::fmt;
use time;

pub mod duration;
mod tagmap;

pub use self::tagmap::{identity, TagMap};

/// A single field of an inbound `Record`.
///
/// Parsers hand over numbers either natively or as the decimal string they
/// found in the log line. `FieldValue` keeps that distinction explicit; the
/// conversion methods are total and fail with `Error::Validation` rather than
/// guessing.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum FieldValue {
    /// A native integer.
    Int(i64),
    /// A native float.
    Float(f64),
    /// A string, typically a decimal number lifted from a log line.
    Str(String),
}

impl FieldValue {
    /// Convert to an integer
    ///
    /// Strings must be base-10 integers, floats must be integral.
    pub fn as_integer(&self, field: &str) -> Result<i64, Error> {
        match *self {
            FieldValue::Int(i) => Ok(i),
            FieldValue::Str(ref s) => s.parse::<i64>().map_err(|e| {
                Error::validation(field, s.as_str(), format!("not an integer: {}", e))
            }),
            FieldValue::Float(f) => {
                if f.is_finite() && f.fract() == 0.0 && f.abs() < 9.2e18 {
                    Ok(f as i64)
                } else {
                    Err(Error::validation(
                        field,
                        self.to_string(),
                        "not an integral number",
                    ))
                }
            }
        }
    }

    /// Convert to a non-negative integer, as byte counts must be.
    pub fn as_size(&self, field: &str) -> Result<u64, Error> {
        let val = self.as_integer(field)?;
        if val < 0 {
            Err(Error::validation(field, self.to_string(), "must not be negative"))
        } else {
            Ok(val as u64)
        }
    }

    /// Convert to whole milliseconds
    ///
    /// The value is glued to `unit` to form a duration literal, so `"10"` and
    /// `"s"` make `"10s"`, which is then parsed and truncated to milliseconds.
    pub fn as_millis(&self, field: &str, unit: &str) -> Result<i64, Error> {
        let literal = format!("{}{}", self, unit);
        duration::parse_millis(&literal).map_err(|e| Error::validation(field, literal.as_str(), e))
    }
}

impl fmt::Display for FieldValue {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match *self {
            FieldValue::Int(i) => write!(f, "{}", i),
            FieldValue::Float(x) => write!(f, "{}", x),
            FieldValue::Str(ref s) => write!(f, "{}", s),
        }
    }
}

impl From<i64> for FieldValue {
    fn from(i: i64) -> FieldValue {
        FieldValue::Int(i)
    }
}

impl From<f64> for FieldValue {
    fn from(f: f64) -> FieldValue {
        FieldValue::Float(f)
    }
}

impl<'a> From<&'a str> for FieldValue {
    fn from(s: &'a str) -> FieldValue {
        FieldValue::Str(s.to_string())
    }
}

impl From<String> for FieldValue {
    fn from(s: String) -> FieldValue {
        FieldValue::Str(s)
    }
}

/// An inbound measurement, one access log line worth.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Record {
    /// The metric name.
    pub name: String,
    /// The tags distinguishing this series from others of the same name.
    #[serde(default)]
    pub tags: TagMap,
    /// The named fields of the line.
    #[serde(default)]
    pub fields: HashMap<String, FieldValue>,
}

impl Record {
    /// Make a builder for records
    ///
    /// # Examples
    ///
    /// ```
    /// use tallier::metric::{FieldValue, Record};
    ///
    /// let r = Record::new("nginx")
    ///     .overlay_tag("host", "web-1")
    ///     .field("status_code", "200")
    ///     .field("request_time", 0.25);
    ///
    /// assert_eq!(r.name, "nginx");
    /// assert_eq!(r.get("status_code"), Some(&FieldValue::Str("200".into())));
    /// ```
    pub fn new<S>(name: S) -> Record
    where
        S: Into<String>,
    {
        Record {
            name: name.into(),
            tags: TagMap::default(),
            fields: HashMap::default(),
        }
    }

    /// Set a tag, replacing any previous value under the same key.
    pub fn overlay_tag<K, V>(mut self, key: K, val: V) -> Record
    where
        K: Into<String>,
        V: Into<String>,
    {
        self.tags.insert(key, val);
        self
    }

    /// Set a field, replacing any previous value under the same name.
    pub fn field<K, V>(mut self, key: K, val: V) -> Record
    where
        K: Into<String>,
        V: Into<FieldValue>,
    {
        self.fields.insert(key.into(), val.into());
        self
    }

    /// Look up a field by name.
    pub fn get(&self, key: &str) -> Option<&FieldValue> {
        self.fields.get(key)
    }

    /// The identity fingerprint of this record's series.
    pub fn identity(&self) -> u64 {
        identity(&self.name, &self.tags)
    }
}

/// A single field of an outbound `Report`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
#[serde(untagged)]
pub enum Value {
    /// A signed integer, such as a delta.
    Int(i64),
    /// An unsigned integer, such as a byte total.
    UInt(u64),
    /// A float, such as a rate or a quantile.
    Float(f64),
}

impl Value {
    /// The value as a float, whatever it is.
    pub fn as_f64(&self) -> f64 {
        match *self {
            Value::Int(i) => i as f64,
            Value::UInt(u) => u as f64,
            Value::Float(f) => f,
        }
    }
}

impl From<i64> for Value {
    fn from(i: i64) -> Value {
        Value::Int(i)
    }
}

impl From<u64> for Value {
    fn from(u: u64) -> Value {
        Value::UInt(u)
    }
}

impl From<f64> for Value {
    fn from(f: f64) -> Value {
        Value::Float(f)
    }
}

/// An outbound summary: one named, tagged set of numeric fields.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Report {
    /// The metric or schema name.
    pub name: String,
    /// The tags of the series.
    pub tags: TagMap,
    /// The summary fields, ordered by name.
    pub fields: BTreeMap<String, Value>,
    /// Seconds since the epoch at which the report was made.
    pub timestamp: i64,
}

impl Report {
    /// Make an empty report stamped with the current time.
    pub fn new<S>(name: S, tags: TagMap) -> Report
    where
        S: Into<String>,
    {
        Report {
            name: name.into(),
            tags: tags,
            fields: BTreeMap::new(),
            timestamp: time::now(),
        }
    }

    /// Set a field, replacing any previous value under the same name.
    pub fn insert<K, V>(&mut self, key: K, val: V)
    where
        K: Into<String>,
        V: Into<Value>,
    {
        self.fields.insert(key.into(), val.into());
    }

    /// Look up a field by name.
    pub fn get(&self, key: &str) -> Option<Value> {
        self.fields.get(key).cloned()
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use serde_json;

    #[test]
    fn integer_from_string_and_native() {
        assert_eq!(Ok(200), FieldValue::from("200").as_integer("status_code"));
        assert_eq!(Ok(404), FieldValue::Int(404).as_integer("status_code"));
        assert_eq!(Ok(10), FieldValue::Float(10.0).as_integer("status_code"));
    }

    #[test]
    fn integer_rejects_garbage() {
        match FieldValue::from("-").as_integer("status_code") {
            Err(Error::Validation { field, value, .. }) => {
                assert_eq!("status_code", field);
                assert_eq!("-", value);
            }
            other => panic!("unexpected {:?}", other),
        }
        assert!(FieldValue::from("").as_integer("f").is_err());
        assert!(FieldValue::from("1.5").as_integer("f").is_err());
        assert!(FieldValue::from(" 12").as_integer("f").is_err());
        assert!(FieldValue::Float(1.5).as_integer("f").is_err());
        assert!(FieldValue::Float(::std::f64::NAN).as_integer("f").is_err());
    }

    #[test]
    fn size_must_be_non_negative() {
        assert_eq!(Ok(1024), FieldValue::from("1024").as_size("request_size"));
        assert!(FieldValue::Int(-1).as_size("request_size").is_err());
    }

    #[test]
    fn millis_in_configured_unit() {
        assert_eq!(Ok(10_000), FieldValue::from("10").as_millis("request_time", "s"));
        assert_eq!(Ok(10_000), FieldValue::Int(10).as_millis("request_time", "s"));
        assert_eq!(Ok(10_000), FieldValue::Float(10.0).as_millis("request_time", "s"));
        assert_eq!(Ok(123), FieldValue::Float(0.123).as_millis("request_time", "s"));
        assert_eq!(Ok(10), FieldValue::from("10").as_millis("request_time", "ms"));
        assert!(FieldValue::from("abc").as_millis("request_time", "s").is_err());
        assert!(FieldValue::from("10").as_millis("request_time", "fortnights").is_err());
    }

    #[test]
    fn record_from_json() {
        let line = r#"{"name":"m1","tags":{"foo":"bar"},"fields":{"status_code":"200","request_time":0.5,"request_size":1024}}"#;
        let record: Record = serde_json::from_str(line).unwrap();
        assert_eq!("m1", record.name);
        assert_eq!(Some(&"bar".to_string()), record.tags.get("foo"));
        assert_eq!(Some(&FieldValue::Str("200".into())), record.get("status_code"));
        assert_eq!(Some(&FieldValue::Float(0.5)), record.get("request_time"));
        assert_eq!(Some(&FieldValue::Int(1024)), record.get("request_size"));
    }

    #[test]
    fn record_tags_and_fields_default() {
        let record: Record = serde_json::from_str(r#"{"name":"bare"}"#).unwrap();
        assert!(record.tags.is_empty());
        assert!(record.fields.is_empty());
    }

    #[test]
    fn identity_follows_name_and_tags() {
        let a = Record::new("m").overlay_tag("x", "1").overlay_tag("y", "2");
        let b = Record::new("m")
            .overlay_tag("y", "2")
            .overlay_tag("x", "1")
            .field("status_code", 500i64);
        assert_eq!(a.identity(), b.identity());
        assert_ne!(a.identity(), Record::new("m").identity());
    }

    #[test]
    fn report_serializes_flat() {
        let tags: TagMap = vec![("server", "db1")].into_iter().collect();
        let mut report = Report::new("mysql-throughput", tags);
        report.timestamp = 7;
        report.insert("com_select", 30i64);
        report.insert("reqSize", 2048u64);
        report.insert("m1", 0.5);
        assert_eq!(
            r#"{"name":"mysql-throughput","tags":{"server":"db1"},"fields":{"com_select":30,"m1":0.5,"reqSize":2048},"timestamp":7}"#,
            serde_json::to_string(&report).unwrap()
        );
        assert_eq!(Some(Value::Int(30)), report.get("com_select"));
    }
}
