//! Tallier turns two kinds of raw input into interval statistics. Access log
//! records are aggregated per metric name and tag set into request and error
//! rates, latency quantiles and byte totals. Database status counters are
//! polled, kept for two generations, and turned into per-interval deltas,
//! gauges and ratios.
//!
//! Why you might choose to use tallier:
//!
//!  * You parse access logs and want request rates and latency quantiles.
//!  * You poll MySQL-style status counters and want deltas, not totals.
//!  * A failed poll of one server must not cost you the rest.
//!
//! The library has no I/O of its own beyond the `status::StatusFile` provider
//! and the `sink::Console` sink. The `tallier` binary wires it together.
#![allow(unknown_lints)]
#![deny(trivial_numeric_casts, missing_docs, unstable_features, unused_import_braces)]
extern crate chrono;
extern crate clap;
extern crate rand;
extern crate seahash;
extern crate serde;
extern crate serde_json;
extern crate toml;

#[macro_use]
extern crate log;

#[macro_use]
extern crate serde_derive;

#[cfg(test)]
extern crate quickcheck;
#[cfg(test)]
extern crate tempdir;

pub mod aggregate;
pub mod config;
pub mod derive;
pub mod error;
pub mod gather;
pub mod meter;
pub mod metric;
pub mod sample;
pub mod sink;
pub mod source;
pub mod status;
pub mod time;
