//! Per-field ownership snapshots

use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};

/// Field path -> name of the field manager that owns it
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct FieldOwnershipMap {
    owners: BTreeMap<String, String>,
}

/// A managed field that changed hands between two snapshots
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OwnershipTransition {
    pub path: String,
    /// Owner in the earlier snapshot
    pub from: String,
    /// Owner in the later snapshot, `None` when nobody owns it anymore
    pub to: Option<String>,
}

impl FieldOwnershipMap {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record `manager` as the owner of `path`
    pub fn insert(&mut self, path: impl Into<String>, manager: impl Into<String>) {
        self.owners.insert(path.into(), manager.into());
    }

    pub fn owner(&self, path: &str) -> Option<&str> {
        self.owners.get(path).map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.owners.len()
    }

    pub fn is_empty(&self) -> bool {
        self.owners.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.owners.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }

    /// Paths owned by `manager`
    pub fn paths_owned_by<'a>(&'a self, manager: &'a str) -> impl Iterator<Item = &'a str> + 'a {
        self.owners
            .iter()
            .filter(move |(_, owner)| owner.as_str() == manager)
            .map(|(path, _)| path.as_str())
    }

    /// Distinct manager names, sorted
    pub fn managers(&self) -> BTreeSet<&str> {
        self.owners.values().map(String::as_str).collect()
    }

    /// Restrict the map to the given paths
    pub fn restricted_to<'a, I>(&self, paths: I) -> Self
    where
        I: IntoIterator<Item = &'a str>,
    {
        let owners = paths
            .into_iter()
            .filter_map(|p| self.owners.get(p).map(|o| (p.to_string(), o.clone())))
            .collect();
        Self { owners }
    }

    /// Fields `manager` owned here that are owned by someone else (or nobody) in `now`
    pub fn lost_by(&self, manager: &str, now: &FieldOwnershipMap) -> Vec<OwnershipTransition> {
        self.paths_owned_by(manager)
            .filter_map(|path| {
                let current = now.owner(path);
                if current == Some(manager) {
                    None
                } else {
                    Some(OwnershipTransition {
                        path: path.to_string(),
                        from: manager.to_string(),
                        to: current.map(str::to_string),
                    })
                }
            })
            .collect()
    }
}

impl FromIterator<(String, String)> for FieldOwnershipMap {
    fn from_iter<T: IntoIterator<Item = (String, String)>>(iter: T) -> Self {
        Self {
            owners: iter.into_iter().collect(),
        }
    }
}
