//! tagmap is the map of key, value pairs that sits inside each `Record` and
//! `Report`. Think of it as a specialized hashmap. Together with the metric
//! name the tags decide which `Aggregate` a record lands in, so the map is kept
//! sorted by key: two maps holding the same pairs are equal, hash equally and
//! fingerprint equally no matter the order the pairs were inserted in.

use seahash::SeaHasher;
use serde::de::{Deserialize, Deserializer};
use serde::ser::{Serialize, Serializer};
use std::collections::BTreeMap;
use std::hash::{Hash, Hasher};
use std::iter::FromIterator;
use std::slice::Iter;

/// The tagmap key, value collection. Behaves similarly to
/// `std::collections::HashMap` but with a specialized implementation for fast
/// searching over a small collection.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct TagMap {
    inner: Vec<(String, String)>,
}

impl TagMap {
    /// Create a `tagmap::Iter`, in key order.
    pub fn iter(&self) -> Iter<(String, String)> {
        self.inner.iter()
    }

    /// Get a value from the tagmap, if it exists.
    pub fn get(&self, key: &str) -> Option<&String> {
        match self.inner.binary_search_by(|pair| pair.0.as_str().cmp(key)) {
            Ok(idx) => Some(&self.inner[idx].1),
            Err(_) => None,
        }
    }

    /// Insert a key / value into self
    ///
    /// This method will return the value previously stored under the given key,
    /// if there was such a value.
    pub fn insert<K, V>(&mut self, key: K, val: V) -> Option<String>
    where
        K: Into<String>,
        V: Into<String>,
    {
        let key = key.into();
        let val = val.into();
        match self.inner.binary_search_by(|pair| pair.0.cmp(&key)) {
            Ok(idx) => {
                let old = ::std::mem::replace(&mut self.inner[idx].1, val);
                Some(old)
            }
            Err(idx) => {
                self.inner.insert(idx, (key, val));
                None
            }
        }
    }

    /// Determine if the tagmap is empty.
    pub fn is_empty(&self) -> bool {
        self.inner.is_empty()
    }

    /// Return the length of the tagmap. This is the total number of key /
    /// values stored in the map.
    pub fn len(&self) -> usize {
        self.inner.len()
    }
}

impl Default for TagMap {
    fn default() -> TagMap {
        TagMap {
            inner: Vec::with_capacity(8),
        }
    }
}

impl<K, V> FromIterator<(K, V)> for TagMap
where
    K: Into<String>,
    V: Into<String>,
{
    fn from_iter<I>(iter: I) -> TagMap
    where
        I: IntoIterator<Item = (K, V)>,
    {
        let mut tags = TagMap::default();
        for (k, v) in iter {
            tags.insert(k, v);
        }
        tags
    }
}

impl<'a> IntoIterator for &'a TagMap {
    type Item = &'a (String, String);
    type IntoIter = Iter<'a, (String, String)>;

    fn into_iter(self) -> Self::IntoIter {
        self.inner.iter()
    }
}

impl Serialize for TagMap {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.collect_map(self.inner.iter().map(|&(ref k, ref v)| (k, v)))
    }
}

impl<'de> Deserialize<'de> for TagMap {
    fn deserialize<D>(deserializer: D) -> Result<TagMap, D::Error>
    where
        D: Deserializer<'de>,
    {
        let map: BTreeMap<String, String> = BTreeMap::deserialize(deserializer)?;
        Ok(map.into_iter().collect())
    }
}

/// Fingerprint a metric name and its tags
///
/// This is the identity of an `Aggregate`. The fingerprint is deterministic
/// across runs and processes.
pub fn identity(name: &str, tags: &TagMap) -> u64 {
    let mut hasher = SeaHasher::default();
    name.hash(&mut hasher);
    for &(ref k, ref v) in tags.iter() {
        k.hash(&mut hasher);
        v.hash(&mut hasher);
    }
    hasher.finish()
}
