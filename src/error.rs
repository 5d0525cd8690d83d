//! Errors surfaced by the aggregation and status engines.
//!
//! None of these are fatal. A `Validation` error rejects one record, a
//! `NotAvailable` or `Parse` error drops one metric group for one interval and
//! an `Upstream` error poisons the history of one resource.

use std::error;
use std::fmt;

/// The error type of this crate.
#[derive(Debug, Clone, PartialEq)]
pub enum Error {
    /// A record field could not be converted into the type it must have.
    Validation {
        /// The name of the offending field.
        field: String,
        /// The raw value, rendered as a string.
        value: String,
        /// Why the conversion failed.
        reason: String,
    },
    /// A status property, or its delta, has no data yet.
    NotAvailable {
        /// The resource the property was requested from.
        resource: String,
        /// The requested property.
        key: String,
        /// Why there is no data.
        reason: &'static str,
    },
    /// A status property exists but is not the number it must be.
    Parse {
        /// The resource the property was requested from.
        resource: String,
        /// The requested property.
        key: String,
        /// The raw value of the property.
        value: String,
    },
    /// The poll collaborator failed to produce a snapshot.
    Upstream {
        /// The resource being polled.
        resource: String,
        /// What went wrong.
        reason: String,
    },
}

impl Error {
    /// Make a `Validation` error.
    pub fn validation<F, V, R>(field: F, value: V, reason: R) -> Error
    where
        F: Into<String>,
        V: Into<String>,
        R: Into<String>,
    {
        Error::Validation {
            field: field.into(),
            value: value.into(),
            reason: reason.into(),
        }
    }

    /// Make an `Upstream` error.
    pub fn upstream<S, R>(resource: S, reason: R) -> Error
    where
        S: Into<String>,
        R: Into<String>,
    {
        Error::Upstream {
            resource: resource.into(),
            reason: reason.into(),
        }
    }

    /// True if the caller should simply wait for the next interval.
    pub fn is_not_available(&self) -> bool {
        match *self {
            Error::NotAvailable { .. } => true,
            _ => false,
        }
    }
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match *self {
            Error::Validation {
                ref field,
                ref value,
                ref reason,
            } => write!(f, "invalid field {} = {:?}: {}", field, value, reason),
            Error::NotAvailable {
                ref resource,
                ref key,
                reason,
            } => write!(f, "[{}] property {} not available: {}", resource, key, reason),
            Error::Parse {
                ref resource,
                ref key,
                ref value,
            } => write!(f, "[{}] property {} is not a number: {:?}", resource, key, value),
            Error::Upstream {
                ref resource,
                ref reason,
            } => write!(f, "[{}] poll failed: {}", resource, reason),
        }
    }
}

impl error::Error for Error {}

/// A metric group of one resource failed to emit this interval.
///
/// Sibling groups and other resources are unaffected.
#[derive(Debug, Clone, PartialEq)]
pub struct GroupError {
    /// The resource tag.
    pub resource: String,
    /// The group schema name, or `None` when the whole poll failed.
    pub group: Option<&'static str>,
    /// The underlying failure.
    pub error: Error,
}

impl fmt::Display for GroupError {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self.group {
            Some(group) => write!(f, "[{}] group {} skipped: {}", self.resource, group, self.error),
            None => write!(f, "[{}] skipped: {}", self.resource, self.error),
        }
    }
}

impl error::Error for GroupError {}
