//! Two-generation history of a polled resource's status counters.
//!
//! Servers such as MySQL expose monotonically increasing counters. What is
//! interesting is how much each counter moved between two polls, so every
//! resource keeps its latest two snapshots in a `StatusHistory` and answers
//! delta queries from them. A failed poll poisons both generations: the next
//! delta must not silently span several intervals.

use error::Error;
use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard};
use time;

mod file;

pub use self::file::StatusFile;

/// A flat key to string-value read of a resource's state.
pub type Snapshot = HashMap<String, String>;

/// Produces fresh snapshots of one resource.
pub trait StatusProvider {
    /// Read the current state of the resource.
    fn fetch(&mut self) -> Result<Snapshot, Error>;
}

impl<F> StatusProvider for F
where
    F: FnMut() -> Result<Snapshot, Error>,
{
    fn fetch(&mut self) -> Result<Snapshot, Error> {
        self()
    }
}

impl<'a> StatusProvider for Box<StatusProvider + Send + 'a> {
    fn fetch(&mut self) -> Result<Snapshot, Error> {
        (**self).fetch()
    }
}

#[derive(Debug, Default)]
struct Generations {
    current: Option<Snapshot>,
    previous: Option<Snapshot>,
    current_time: Option<i64>,
    previous_time: Option<i64>,
}

/// The current and previous snapshots of one resource.
///
/// Every method takes the history's lock for its whole duration. Histories of
/// different resources share nothing.
#[derive(Debug)]
pub struct StatusHistory {
    resource: String,
    generations: Mutex<Generations>,
}

impl StatusHistory {
    /// Create an empty history for `resource`.
    pub fn new<S>(resource: S) -> StatusHistory
    where
        S: Into<String>,
    {
        StatusHistory {
            resource: resource.into(),
            generations: Mutex::new(Generations::default()),
        }
    }

    /// The tag of the resource.
    pub fn resource(&self) -> &str {
        &self.resource
    }

    fn lock(&self) -> MutexGuard<Generations> {
        match self.generations.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }

    /// Poll `provider` and make its snapshot the current generation
    ///
    /// The old current generation becomes the previous one. If the provider
    /// fails both generations are dropped and the error is returned.
    pub fn fill<P>(&self, provider: &mut P) -> Result<(), Error>
    where
        P: StatusProvider + ?Sized,
    {
        let mut gens = self.lock();
        gens.previous = gens.current.take();
        gens.previous_time = gens.current_time.take();
        match provider.fetch() {
            Ok(snapshot) => {
                trace!("[{}] filled {} properties", self.resource, snapshot.len());
                gens.current = Some(snapshot);
                gens.current_time = Some(time::now());
                Ok(())
            }
            Err(e) => {
                gens.previous = None;
                gens.previous_time = None;
                Err(e)
            }
        }
    }

    fn not_available(&self, key: &str, reason: &'static str) -> Error {
        Error::NotAvailable {
            resource: self.resource.clone(),
            key: key.to_string(),
            reason: reason,
        }
    }

    fn parse(&self, key: &str, value: &str) -> Result<i64, Error> {
        value.parse::<i64>().map_err(|_| Error::Parse {
            resource: self.resource.clone(),
            key: key.to_string(),
            value: value.to_string(),
        })
    }

    /// The raw value of `key` in the current generation.
    pub fn get_property(&self, key: &str) -> Result<String, Error> {
        let gens = self.lock();
        match gens.current {
            None => Err(self.not_available(key, "no current status")),
            Some(ref current) => current
                .get(key)
                .cloned()
                .ok_or_else(|| self.not_available(key, "no such property")),
        }
    }

    /// How far `key` moved between the previous and current generation
    ///
    /// Both values must be base-10 integers. The delta is not clamped: a
    /// counter reset on the resource shows up as a negative delta.
    pub fn get_property_delta(&self, key: &str) -> Result<i64, Error> {
        let gens = self.lock();
        let previous = match gens.previous {
            Some(ref previous) => previous,
            None => return Err(self.not_available(key, "no history yet")),
        };
        let current = match gens.current {
            Some(ref current) => current,
            None => return Err(self.not_available(key, "no current status")),
        };
        let last = previous
            .get(key)
            .ok_or_else(|| self.not_available(key, "not in history"))?;
        let curr = current
            .get(key)
            .ok_or_else(|| self.not_available(key, "no such property"))?;
        let last = self.parse(key, last)?;
        let curr = self.parse(key, curr)?;
        Ok(curr.wrapping_sub(last))
    }

    /// Seconds since the epoch at which the current generation was filled.
    pub fn current_time(&self) -> Option<i64> {
        self.lock().current_time
    }

    /// Seconds since the epoch at which the previous generation was filled.
    pub fn previous_time(&self) -> Option<i64> {
        self.lock().previous_time
    }
}

/// Every `StatusHistory` known to one agent, by resource tag.
#[derive(Debug, Default)]
pub struct StatusRegistry {
    histories: Mutex<HashMap<String, Arc<StatusHistory>>>,
}

impl StatusRegistry {
    /// Create an empty registry.
    pub fn new() -> StatusRegistry {
        StatusRegistry::default()
    }

    fn lock(&self) -> MutexGuard<HashMap<String, Arc<StatusHistory>>> {
        match self.histories.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }

    /// The history of `resource`, created empty on first request.
    pub fn history(&self, resource: &str) -> Arc<StatusHistory> {
        let mut histories = self.lock();
        Arc::clone(
            histories
                .entry(resource.to_string())
                .or_insert_with(|| Arc::new(StatusHistory::new(resource))),
        )
    }

    /// The history of `resource`, if it was ever requested.
    pub fn get(&self, resource: &str) -> Option<Arc<StatusHistory>> {
        self.lock().get(resource).cloned()
    }

    /// Forget `resource`.
    pub fn remove(&self, resource: &str) -> Option<Arc<StatusHistory>> {
        self.lock().remove(resource)
    }

    /// The number of known resources.
    pub fn len(&self) -> usize {
        self.lock().len()
    }

    /// Determine if no resource is known.
    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }
}
