//! Work attribution sets
//!
//! A [`WorkSource`] records which callers are responsible for keeping the
//! link awake. Lock holders carry one each; the service unions them into
//! the wakelock attribution while the device is idle.

use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};

use super::newtypes::Uid;

/// A set of attributed owner ids
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct WorkSource(BTreeSet<Uid>);

impl WorkSource {
    /// Creates an empty work source
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a work source attributed to a single uid
    pub fn single(uid: Uid) -> Self {
        let mut set = BTreeSet::new();
        set.insert(uid);
        Self(set)
    }

    /// Treats an empty set as "no explicit attribution"
    pub fn non_empty(ws: Option<WorkSource>) -> Option<WorkSource> {
        ws.filter(|w| !w.is_empty())
    }

    /// Adds every uid of `other`; returns true if anything was added
    pub fn add(&mut self, other: &WorkSource) -> bool {
        let before = self.0.len();
        self.0.extend(other.0.iter().copied());
        self.0.len() != before
    }

    /// Removes every uid
    pub fn clear(&mut self) {
        self.0.clear();
    }

    /// Returns true if no uid is attributed
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Number of attributed uids
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// Returns true if `uid` is attributed
    pub fn contains(&self, uid: Uid) -> bool {
        self.0.contains(&uid)
    }

    /// Iterates the attributed uids in ascending order
    pub fn iter(&self) -> impl Iterator<Item = Uid> + '_ {
        self.0.iter().copied()
    }
}

impl FromIterator<Uid> for WorkSource {
    fn from_iter<T: IntoIterator<Item = Uid>>(iter: T) -> Self {
        Self(iter.into_iter().collect())
    }
}

impl std::fmt::Display for WorkSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let uids: Vec<String> = self.0.iter().map(|u| u.to_string()).collect();
        write!(f, "[{}]", uids.join(","))
    }
}
