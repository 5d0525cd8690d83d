//! Provides the CLI option parser
//!
//! Used to parse the argv/config file into a struct that
//! the agent can consume and use as configuration data.

use aggregate::{AggregationConfig, ResetPolicy};
use clap::{App, Arg};
use derive::Group;
use gather::GroupConfig;
use metric::duration;
use sink::{ConsoleConfig, NullConfig, SinkConfig};
use std::error;
use std::fmt;
use std::fs::File;
use std::io::Read;
use std::path::{Path, PathBuf};
use toml;

const VERSION: Option<&'static str> = option_env!("CARGO_PKG_VERSION");

/// The configuration could not be turned into `Args`.
#[derive(Debug, Clone, PartialEq)]
pub enum ConfigError {
    /// The configuration file could not be read.
    Io {
        /// The file in question.
        path: String,
        /// What went wrong.
        reason: String,
    },
    /// The configuration file is not valid TOML.
    Toml(String),
    /// A key has the wrong type or an unacceptable value.
    Invalid {
        /// The dotted path of the key.
        key: String,
        /// What was expected.
        reason: String,
    },
}

impl ConfigError {
    fn invalid<K, R>(key: K, reason: R) -> ConfigError
    where
        K: Into<String>,
        R: Into<String>,
    {
        ConfigError::Invalid {
            key: key.into(),
            reason: reason.into(),
        }
    }
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match *self {
            ConfigError::Io { ref path, ref reason } => {
                write!(f, "could not read {}: {}", path, reason)
            }
            ConfigError::Toml(ref reason) => write!(f, "could not parse config file: {}", reason),
            ConfigError::Invalid { ref key, ref reason } => write!(f, "{}: {}", key, reason),
        }
    }
}

impl error::Error for ConfigError {}

/// A polled resource
#[derive(Debug, Clone, PartialEq)]
pub struct ResourceConfig {
    /// The table name of the resource in the configuration file.
    pub name: String,
    /// The tag identifying the resource on every report, the name by default.
    pub tag: String,
    /// The status dump read on every poll. See `status::StatusFile`.
    pub path: PathBuf,
}

/// Big configuration struct for the tallier executable
///
/// This struct is what we construct from parsing the tallier configuration.
/// Please see documentation on `parse_args` in this module for more details.
#[derive(Debug, Clone, PartialEq)]
pub struct Args {
    /// Seconds between flushes of the aggregation table.
    pub flush_interval: u64,
    /// The verbosity setting of tallier. The higher the value the more chatty
    /// tallier gets.
    pub verbose: u64,
    /// tallier version string. This is set automatically.
    pub version: String,
    /// Where records are read from, standard in when `None`.
    pub input: Option<PathBuf>,
    /// See `aggregate::AggregationTable` for more.
    pub aggregation: AggregationConfig,
    /// Seconds between polls of the status resources.
    pub poll_interval: u64,
    /// The derived metric groups computed on every poll.
    pub groups: GroupConfig,
    /// The resources to poll, ordered by name.
    pub resources: Vec<ResourceConfig>,
    /// See `sink::Console` for more.
    pub console: Option<ConsoleConfig>,
    /// See `sink::Null` for more.
    pub null: Option<NullConfig>,
}

impl Default for Args {
    fn default() -> Self {
        Args {
            flush_interval: 60,
            verbose: 0,
            version: VERSION.unwrap_or("unknown").to_string(),
            input: None,
            aggregation: AggregationConfig::default(),
            poll_interval: 60,
            groups: GroupConfig::default(),
            resources: Vec::new(),
            console: None,
            null: None,
        }
    }
}

impl Args {
    /// The configured sinks.
    pub fn sinks(&self) -> Vec<SinkConfig> {
        let mut sinks = Vec::new();
        if let Some(ref console) = self.console {
            sinks.push(SinkConfig::Console(console.clone()));
        }
        if let Some(ref null) = self.null {
            sinks.push(SinkConfig::Null(null.clone()));
        }
        sinks
    }
}

/// Parse the tallier configuration arguments
///
/// This function will read the environment arguments and construct an
/// `Args`. Most configuration will be stored in an on-disk file. See
/// `tallier --help` for more information.
pub fn parse_args() -> Result<Args, ConfigError> {
    let args = App::new("tallier")
        .version(VERSION.unwrap_or("unknown"))
        .author("Brian L. Troutwine <blt@postmates.com>")
        .about("access log aggregation and database status deltas")
        .arg(
            Arg::with_name("config-file")
                .long("config")
                .short("C")
                .value_name("config")
                .help("The config file to feed in.")
                .takes_value(true),
        )
        .arg(
            Arg::with_name("input")
                .long("input")
                .short("i")
                .value_name("input")
                .help("Read records from this file instead of stdin.")
                .takes_value(true),
        )
        .arg(
            Arg::with_name("verbose")
                .short("v")
                .multiple(true)
                .help("Turn on verbose output."),
        )
        .get_matches();

    let verb = if args.is_present("verbose") {
        args.occurrences_of("verbose")
    } else {
        0
    };

    let mut parsed = match args.value_of("config-file") {
        Some(filename) => {
            let mut fp = File::open(filename).map_err(|e| ConfigError::Io {
                path: filename.to_string(),
                reason: e.to_string(),
            })?;
            let mut buffer = String::new();
            fp.read_to_string(&mut buffer)
                .map_err(|e| ConfigError::Io {
                    path: filename.to_string(),
                    reason: e.to_string(),
                })?;
            parse_config_file(&buffer, verb)?
        }
        None => {
            let mut args = Args::default();
            args.verbose = verb;
            args.console = Some(ConsoleConfig::default());
            args
        }
    };
    if let Some(input) = args.value_of("input") {
        parsed.input = Some(Path::new(input).to_path_buf());
    }
    Ok(parsed)
}

fn get_integer(tbl: &toml::Value, key: &str, path: &str) -> Result<Option<i64>, ConfigError> {
    match tbl.get(key) {
        None => Ok(None),
        Some(v) => v
            .as_integer()
            .map(Some)
            .ok_or_else(|| ConfigError::invalid(path, "must be an integer")),
    }
}

fn get_positive(tbl: &toml::Value, key: &str, path: &str) -> Result<Option<u64>, ConfigError> {
    match get_integer(tbl, key, path)? {
        Some(i) if i <= 0 => Err(ConfigError::invalid(path, "must be positive")),
        Some(i) => Ok(Some(i as u64)),
        None => Ok(None),
    }
}

fn get_float(tbl: &toml::Value, key: &str, path: &str) -> Result<Option<f64>, ConfigError> {
    match tbl.get(key) {
        None => Ok(None),
        Some(v) => v
            .as_float()
            .or_else(|| v.as_integer().map(|i| i as f64))
            .map(Some)
            .ok_or_else(|| ConfigError::invalid(path, "must be a number")),
    }
}

fn get_bool(tbl: &toml::Value, key: &str, path: &str) -> Result<Option<bool>, ConfigError> {
    match tbl.get(key) {
        None => Ok(None),
        Some(v) => v
            .as_bool()
            .map(Some)
            .ok_or_else(|| ConfigError::invalid(path, "must be a boolean")),
    }
}

fn get_str<'a>(
    tbl: &'a toml::Value,
    key: &str,
    path: &str,
) -> Result<Option<&'a str>, ConfigError> {
    match tbl.get(key) {
        None => Ok(None),
        Some(v) => v
            .as_str()
            .map(Some)
            .ok_or_else(|| ConfigError::invalid(path, "must be a string")),
    }
}

fn parse_aggregation(tbl: &toml::Value, args: &mut Args) -> Result<(), ConfigError> {
    let config = &mut args.aggregation;
    if let Some(unit) = get_str(tbl, "request-time-unit", "aggregation.request-time-unit")? {
        let unit = if unit.is_empty() { "s" } else { unit };
        if !duration::is_unit(unit) {
            return Err(ConfigError::invalid(
                "aggregation.request-time-unit",
                "must be one of ns, us, ms, s, m, h",
            ));
        }
        config.request_time_unit = unit.to_string();
    }
    if let Some(policy) = get_str(tbl, "reset-policy", "aggregation.reset-policy")? {
        config.reset_policy = ResetPolicy::from_name(policy).ok_or_else(|| {
            ConfigError::invalid(
                "aggregation.reset-policy",
                "must be \"cumulative\" or \"interval\"",
            )
        })?;
    }
    if let Some(size) = get_positive(tbl, "reservoir-size", "aggregation.reservoir-size")? {
        config.reservoir_size = size as usize;
    }
    if let Some(alpha) = get_float(tbl, "reservoir-alpha", "aggregation.reservoir-alpha")? {
        if !(alpha.is_finite() && alpha > 0.0) {
            return Err(ConfigError::invalid(
                "aggregation.reservoir-alpha",
                "must be a positive number",
            ));
        }
        config.reservoir_alpha = alpha;
    }
    Ok(())
}

fn parse_status(tbl: &toml::Value, args: &mut Args) -> Result<(), ConfigError> {
    if let Some(interval) = get_positive(tbl, "poll-interval", "status.poll-interval")? {
        args.poll_interval = interval;
    }
    for &(key, group) in &[
        ("throughput", Group::Throughput),
        ("connection", Group::Connection),
        ("innodb", Group::Innodb),
        ("db-size", Group::DbSize),
        ("replication", Group::Replication),
        ("snapshot", Group::Snapshot),
    ] {
        let path = format!("status.{}", key);
        if let Some(enabled) = get_bool(tbl, key, &path)? {
            args.groups.set(group, enabled);
        }
    }
    if let Some(resources) = tbl.get("resources") {
        let resources = resources
            .as_table()
            .ok_or_else(|| ConfigError::invalid("status.resources", "must be a table"))?;
        for (name, res) in resources.iter() {
            let prefix = format!("status.resources.{}", name);
            if !res.is_table() {
                return Err(ConfigError::invalid(prefix, "must be a table"));
            }
            let tag = get_str(res, "tag", &format!("{}.tag", prefix))?
                .unwrap_or(name.as_str())
                .to_string();
            let path = get_str(res, "path", &format!("{}.path", prefix))?
                .ok_or_else(|| ConfigError::invalid(format!("{}.path", prefix), "is required"))?;
            if args.resources.iter().any(|r| r.tag == tag) {
                return Err(ConfigError::invalid(
                    format!("{}.tag", prefix),
                    format!("{:?} is already the tag of another resource", tag),
                ));
            }
            args.resources.push(ResourceConfig {
                name: name.clone(),
                tag: tag,
                path: Path::new(path).to_path_buf(),
            });
        }
    }
    Ok(())
}

fn parse_sinks(tbl: &toml::Value, args: &mut Args) -> Result<(), ConfigError> {
    if let Some(console) = tbl.get("console") {
        let mut config = ConsoleConfig::default();
        if let Some(pretty) = get_bool(console, "pretty", "sinks.console.pretty")? {
            config.pretty = pretty;
        }
        args.console = Some(config);
    }
    if tbl.get("null").is_some() {
        args.null = Some(NullConfig::new());
    }
    Ok(())
}

/// Parse the tallier configuration file.
///
/// Every key is optional. Unknown keys are ignored.
pub fn parse_config_file(buffer: &str, verbosity: u64) -> Result<Args, ConfigError> {
    let mut args = Args::default();
    let value: toml::Value =
        toml::from_str(buffer).map_err(|e| ConfigError::Toml(e.to_string()))?;

    args.verbose = verbosity;

    if let Some(interval) = get_positive(&value, "flush-interval", "flush-interval")? {
        args.flush_interval = interval;
    }
    // polls follow flushes unless told otherwise
    args.poll_interval = args.flush_interval;

    if let Some(input) = get_str(&value, "input", "input")? {
        args.input = Some(Path::new(input).to_path_buf());
    }
    if let Some(aggregation) = value.get("aggregation") {
        parse_aggregation(aggregation, &mut args)?;
    }
    if let Some(status) = value.get("status") {
        parse_status(status, &mut args)?;
    }
    if let Some(sinks) = value.get("sinks") {
        parse_sinks(sinks, &mut args)?;
    }
    Ok(args)
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn config_file_empty() {
        let args = parse_config_file("", 4).unwrap();
        assert_eq!(4, args.verbose);
        assert_eq!(60, args.flush_interval);
        assert_eq!(60, args.poll_interval);
        assert_eq!(AggregationConfig::default(), args.aggregation);
        assert_eq!(GroupConfig::default(), args.groups);
        assert!(args.resources.is_empty());
        assert!(args.sinks().is_empty());
        assert!(args.input.is_none());
    }

    #[test]
    fn config_file_flush_interval() {
        let args = parse_config_file("flush-interval = 30", 0).unwrap();
        assert_eq!(30, args.flush_interval);
        assert_eq!(30, args.poll_interval);
    }

    #[test]
    fn config_file_aggregation() {
        let config = r#"
input = "/var/log/nginx/access.json"

[aggregation]
request-time-unit = "ms"
reset-policy = "interval"
reservoir-size = 512
reservoir-alpha = 0.03
"#;
        let args = parse_config_file(config, 0).unwrap();
        assert_eq!(Some(PathBuf::from("/var/log/nginx/access.json")), args.input);
        assert_eq!("ms", args.aggregation.request_time_unit);
        assert_eq!(ResetPolicy::Interval, args.aggregation.reset_policy);
        assert_eq!(512, args.aggregation.reservoir_size);
        assert_eq!(0.03, args.aggregation.reservoir_alpha);
    }

    #[test]
    fn config_file_request_time_unit() {
        let unit = |u: &str| {
            let config = format!("[aggregation]\nrequest-time-unit = {:?}\n", u);
            parse_config_file(&config, 0).map(|args| args.aggregation.request_time_unit)
        };
        assert_eq!("s", unit("").unwrap());
        assert_eq!("us", unit("us").unwrap());
        assert_eq!("h", unit("h").unwrap());
        for bad in &["s5s", "5s", "sec", " ms"] {
            match unit(bad) {
                Err(ConfigError::Invalid { key, .. }) => {
                    assert_eq!("aggregation.request-time-unit", key)
                }
                other => panic!("{:?} accepted: {:?}", bad, other),
            }
        }
    }

    #[test]
    fn config_file_duplicate_resource_tag() {
        let config = r#"
[status.resources.db1]
tag = "127.0.0.1:3306"
path = "/var/run/tallier/db1.status"

[status.resources.primary]
tag = "127.0.0.1:3306"
path = "/var/run/tallier/primary.status"
"#;
        match parse_config_file(config, 0) {
            Err(ConfigError::Invalid { key, .. }) => {
                assert_eq!("status.resources.primary.tag", key)
            }
            other => panic!("duplicate tag accepted: {:?}", other),
        }

        // a name is the default tag, and collides just the same
        let config = r#"
[status.resources.db1]
path = "/var/run/tallier/db1.status"

[status.resources.db2]
tag = "db1"
path = "/var/run/tallier/db2.status"
"#;
        assert!(parse_config_file(config, 0).is_err());
    }

    #[test]
    fn config_file_integer_alpha() {
        let config = "[aggregation]\nreservoir-alpha = 1\n";
        let args = parse_config_file(config, 0).unwrap();
        assert_eq!(1.0, args.aggregation.reservoir_alpha);
    }

    #[test]
    fn config_file_status() {
        let config = r#"
flush-interval = 30

[status]
poll-interval = 10
innodb = false
replication = true

  [status.resources.db1]
  tag = "127.0.0.1:3306"
  path = "/var/run/tallier/db1.status"

  [status.resources.db2]
  path = "/var/run/tallier/db2.status"
"#;
        let args = parse_config_file(config, 0).unwrap();
        assert_eq!(10, args.poll_interval);
        assert_eq!(
            vec![Group::Throughput, Group::Connection, Group::Replication],
            args.groups.enabled()
        );
        assert_eq!(
            vec![
                ResourceConfig {
                    name: "db1".into(),
                    tag: "127.0.0.1:3306".into(),
                    path: PathBuf::from("/var/run/tallier/db1.status"),
                },
                ResourceConfig {
                    name: "db2".into(),
                    tag: "db2".into(),
                    path: PathBuf::from("/var/run/tallier/db2.status"),
                },
            ],
            args.resources
        );
    }

    #[test]
    fn config_file_sinks() {
        let config = r#"
    [sinks]
      [sinks.console]
      pretty = true
      [sinks.null]
    "#;
        let args = parse_config_file(config, 0).unwrap();
        assert_eq!(Some(ConsoleConfig { pretty: true }), args.console);
        assert!(args.null.is_some());
        assert_eq!(2, args.sinks().len());
    }

    #[test]
    fn config_file_rejects_wrong_types() {
        match parse_config_file("flush-interval = \"soon\"", 0) {
            Err(ConfigError::Invalid { key, .. }) => assert_eq!("flush-interval", key),
            other => panic!("unexpected {:?}", other),
        }
        assert!(parse_config_file("flush-interval = 0", 0).is_err());
        assert!(parse_config_file("[status]\ninnodb = \"yes\"\n", 0).is_err());
        assert!(parse_config_file("[aggregation]\nreservoir-alpha = -1.0\n", 0).is_err());
        assert!(parse_config_file("[aggregation]\nreservoir-size = 0\n", 0).is_err());
    }

    #[test]
    fn config_file_rejects_bad_values() {
        let err = parse_config_file("[aggregation]\nreset-policy = \"never\"\n", 0).unwrap_err();
        assert_eq!(
            "aggregation.reset-policy: must be \"cumulative\" or \"interval\"",
            err.to_string()
        );
        assert!(parse_config_file("[aggregation]\nrequest-time-unit = \"weeks\"\n", 0).is_err());
        let err = parse_config_file("[status.resources.db1]\ntag = \"x\"\n", 0).unwrap_err();
        assert_eq!("status.resources.db1.path: is required", err.to_string());
    }

    #[test]
    fn config_file_not_toml() {
        match parse_config_file("flush-interval = = 1", 0) {
            Err(ConfigError::Toml(_)) => {}
            other => panic!("unexpected {:?}", other),
        }
    }
}
