//! Paths that must never be claimed or projected

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::{CoreError, Result};
use crate::path::{FieldPath, Segment};
use crate::projection::canonical_value;

/// Explicit set of field paths excluded from apply and projection
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct IgnoreSet {
    paths: Vec<FieldPath>,
}

impl IgnoreSet {
    /// An empty ignore set
    pub fn empty() -> Self {
        Self::default()
    }

    /// Parse and validate ignore paths
    ///
    /// A path is rejected when it overlaps any of `reserved` (the tool's own
    /// bookkeeping fields): ignoring a parent of a reserved path would hide
    /// the bookkeeping, ignoring a child of it would be meaningless.
    pub fn parse<I, S>(raw: I, reserved: &[FieldPath]) -> Result<Self>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut paths = Vec::new();
        for entry in raw {
            let path: FieldPath = entry.as_ref().parse()?;
            if let Some(conflict) = reserved.iter().find(|r| r.overlaps(&path)) {
                return Err(CoreError::ReservedPath {
                    path: path.to_string(),
                    reserved: conflict.to_string(),
                });
            }
            paths.push(path);
        }
        paths.sort();
        paths.dedup();
        Ok(Self { paths })
    }

    pub fn paths(&self) -> &[FieldPath] {
        &self.paths
    }

    pub fn is_empty(&self) -> bool {
        self.paths.is_empty()
    }

    /// Check if `path` is equal to or nested under an ignored path
    pub fn covers(&self, path: &FieldPath) -> bool {
        self.paths.iter().any(|ignored| ignored.covers(path))
    }

    /// Remove every ignored path from a document
    pub fn strip(&self, document: &mut Value) {
        for path in &self.paths {
            remove_path(document, path.segments());
        }
    }
}

fn remove_path(value: &mut Value, segments: &[Segment]) {
    let Some((head, rest)) = segments.split_first() else {
        return;
    };

    match (head, value) {
        (Segment::Field(name), Value::Object(map)) => {
            if rest.is_empty() {
                map.remove(name);
            } else if let Some(child) = map.get_mut(name) {
                remove_path(child, rest);
            }
        }
        (Segment::Index(index), Value::Array(items)) => {
            if rest.is_empty() {
                if *index < items.len() {
                    items.remove(*index);
                }
            } else if let Some(child) = items.get_mut(*index) {
                remove_path(child, rest);
            }
        }
        (Segment::Key(pairs), Value::Array(items)) => {
            if rest.is_empty() {
                items.retain(|item| !matches_key(item, pairs));
            } else {
                for item in items.iter_mut().filter(|item| matches_key(item, pairs)) {
                    remove_path(item, rest);
                }
            }
        }
        (Segment::Value(expected), Value::Array(items)) if rest.is_empty() => {
            items.retain(|item| canonical_value(item) != *expected);
        }
        _ => {}
    }
}

/// Check if a list item carries all the given merge key values
pub fn matches_key(item: &Value, pairs: &[(String, String)]) -> bool {
    pairs.iter().all(|(key, expected)| {
        item.get(key)
            .map(|v| canonical_value(v) == *expected)
            .unwrap_or(false)
    })
}
