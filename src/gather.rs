//! The poll path: refresh each resource's history, then derive its groups.
//!
//! Resources are independent. Each one is polled on its own thread and a
//! failure, whether of the poll or of a single group, is reported against
//! that resource only.

use derive::{self, Group};
use error::{Error, GroupError};
use metric::Report;
use status::{StatusHistory, StatusProvider, StatusRegistry};
use std::collections::HashSet;
use std::io;
use std::sync::Arc;
use std::thread::{self, JoinHandle};

/// Which derived metric groups are computed on every poll.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct GroupConfig {
    /// Emit `mysql-throughput`.
    pub throughput: bool,
    /// Emit `mysql-connection`.
    pub connection: bool,
    /// Emit `mysql-innodb`.
    pub innodb: bool,
    /// Emit `mysql-dbsize`.
    pub db_size: bool,
    /// Emit `mysql-replication`.
    pub replication: bool,
    /// Emit `mysql-snapshot`.
    pub snapshot: bool,
}

impl Default for GroupConfig {
    fn default() -> GroupConfig {
        GroupConfig {
            throughput: true,
            connection: true,
            innodb: true,
            db_size: false,
            replication: false,
            snapshot: false,
        }
    }
}

impl GroupConfig {
    /// No group enabled.
    pub fn none() -> GroupConfig {
        GroupConfig {
            throughput: false,
            connection: false,
            innodb: false,
            db_size: false,
            replication: false,
            snapshot: false,
        }
    }

    /// Determine if `group` is enabled.
    pub fn is_enabled(&self, group: Group) -> bool {
        match group {
            Group::Throughput => self.throughput,
            Group::Connection => self.connection,
            Group::Innodb => self.innodb,
            Group::DbSize => self.db_size,
            Group::Replication => self.replication,
            Group::Snapshot => self.snapshot,
        }
    }

    /// Turn `group` on or off.
    pub fn set(&mut self, group: Group, enabled: bool) {
        let flag = match group {
            Group::Throughput => &mut self.throughput,
            Group::Connection => &mut self.connection,
            Group::Innodb => &mut self.innodb,
            Group::DbSize => &mut self.db_size,
            Group::Replication => &mut self.replication,
            Group::Snapshot => &mut self.snapshot,
        };
        *flag = enabled;
    }

    /// The enabled groups, in emission order.
    pub fn enabled(&self) -> Vec<Group> {
        Group::ALL
            .iter()
            .cloned()
            .filter(|g| self.is_enabled(*g))
            .collect()
    }
}

/// The outcome of one poll.
#[derive(Debug, Default)]
pub struct Gathered {
    /// Every group report that could be computed.
    pub reports: Vec<Report>,
    /// Every group, or whole resource, that could not.
    pub errors: Vec<GroupError>,
}

impl Gathered {
    fn extend(&mut self, other: Gathered) {
        self.reports.extend(other.reports);
        self.errors.extend(other.errors);
    }

    fn failed(resource: &str, group: Option<&'static str>, error: Error) -> Gathered {
        let err = GroupError {
            resource: resource.to_string(),
            group: group,
            error: error,
        };
        warn!("{}", err);
        Gathered {
            reports: Vec::new(),
            errors: vec![err],
        }
    }
}

/// Fill `history` from `provider` and compute every enabled group.
pub fn gather_resource<P>(history: &StatusHistory, groups: &GroupConfig, provider: &mut P) -> Gathered
where
    P: StatusProvider + ?Sized,
{
    let resource = history.resource();
    if let Err(e) = history.fill(provider) {
        return Gathered::failed(resource, None, e);
    }
    let mut gathered = Gathered::default();
    for group in groups.enabled() {
        match derive::compute(group, history) {
            Ok(report) => gathered.reports.push(report),
            Err(ref e) if e.is_not_available() && history.previous_time().is_none() => {
                // first poll after start or after a failure, deltas come next time
                trace!("[{}] group {} waiting on history: {}", resource, group, e);
            }
            Err(e) => gathered.extend(Gathered::failed(resource, Some(group.schema()), e)),
        }
    }
    debug!(
        "[{}] gathered {} groups, {} failed",
        resource,
        gathered.reports.len(),
        gathered.errors.len()
    );
    gathered
}

/// Polls resources concurrently against a shared `StatusRegistry`.
pub struct Gatherer {
    groups: GroupConfig,
    registry: Arc<StatusRegistry>,
}

impl Gatherer {
    /// Create a gatherer computing `groups` and keeping histories in
    /// `registry`.
    pub fn new(groups: GroupConfig, registry: Arc<StatusRegistry>) -> Gatherer {
        Gatherer {
            groups: groups,
            registry: registry,
        }
    }

    /// The groups computed on every poll.
    pub fn groups(&self) -> &GroupConfig {
        &self.groups
    }

    /// The registry holding every resource's history.
    pub fn registry(&self) -> &Arc<StatusRegistry> {
        &self.registry
    }

    /// Poll one resource on the calling thread.
    pub fn gather_one<P>(&self, resource: &str, provider: &mut P) -> Gathered
    where
        P: StatusProvider + ?Sized,
    {
        let history = self.registry.history(resource);
        gather_resource(&history, &self.groups, provider)
    }

    /// Poll every resource, one thread each, and wait for all of them.
    ///
    /// Results come back in the order of `resources`. Providers are handed
    /// back alongside so that callers may keep state across polls. A history
    /// is filled at most once per poll: a resource named more than once is
    /// polled for its first entry only, the others are reported as failed.
    pub fn gather<P>(&self, resources: Vec<(String, P)>) -> (Gathered, Vec<(String, P)>)
    where
        P: StatusProvider + Send + 'static,
    {
        let mut seen = HashSet::with_capacity(resources.len());
        let mut joins = Vec::with_capacity(resources.len());
        for (resource, mut provider) in resources {
            if !seen.insert(resource.clone()) {
                joins.push((resource, Poll::Duplicate(provider)));
                continue;
            }
            let history = self.registry.history(&resource);
            let groups = self.groups;
            let name = format!("gather-{}", resource);
            let res = thread::Builder::new().name(name).spawn(move || {
                let gathered = gather_resource(&history, &groups, &mut provider);
                (gathered, provider)
            });
            joins.push((resource, Poll::Spawned(res)));
        }

        let mut gathered = Gathered::default();
        let mut providers = Vec::with_capacity(joins.len());
        for (resource, poll) in joins {
            let outcome = match poll {
                Poll::Spawned(Ok(handle)) => {
                    handle.join().map_err(|_| "poll thread panicked".to_string())
                }
                Poll::Spawned(Err(e)) => Err(format!("could not spawn poll thread: {}", e)),
                Poll::Duplicate(provider) => {
                    let err = Error::upstream(
                        resource.as_str(),
                        "resource listed more than once, polled once",
                    );
                    gathered.extend(Gathered::failed(&resource, None, err));
                    providers.push((resource, provider));
                    continue;
                }
            };
            match outcome {
                Ok((g, provider)) => {
                    gathered.extend(g);
                    providers.push((resource, provider));
                }
                Err(reason) => {
                    let err = Error::upstream(resource.as_str(), reason);
                    gathered.extend(Gathered::failed(&resource, None, err));
                }
            }
        }
        (gathered, providers)
    }
}

enum Poll<P> {
    Spawned(io::Result<JoinHandle<(Gathered, P)>>),
    Duplicate(P),
}
