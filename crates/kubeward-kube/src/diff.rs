//! Drift reports
//!
//! Compares two comparable states of the same object (typically the
//! persisted one and the one a Read just produced):
//! - fields added, modified or removed from the projection
//! - fields whose owner changed
//! - line diffs of modified values

use kubeward_core::{ComparableState, FieldOwnershipMap, ObjectRef};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use similar::{ChangeTag, TextDiff};
use std::collections::BTreeSet;

/// Builds [`DriftReport`]s
pub struct DiffEngine {
    /// Include line diffs for modified values
    pub value_diffs: bool,
}

impl DiffEngine {
    pub fn new() -> Self {
        Self { value_diffs: true }
    }

    /// Skip line diffs, only report which fields changed
    pub fn without_value_diffs(mut self) -> Self {
        self.value_diffs = false;
        self
    }

    /// Compare the `before` and `after` states of `object`
    pub fn diff_states(
        &self,
        object: &ObjectRef,
        before: &ComparableState,
        after: &ComparableState,
    ) -> DriftReport {
        let paths: BTreeSet<&str> = before
            .projection
            .paths()
            .chain(after.projection.paths())
            .collect();

        let mut changes = Vec::new();
        for path in paths {
            let old = before.projection.get(path);
            let new = after.projection.get(path);
            let old_owner = before.field_owners.owner(path).map(str::to_string);
            let new_owner = after.field_owners.owner(path).map(str::to_string);

            let change_type = match (old, new) {
                (None, Some(_)) => ChangeType::Added,
                (Some(_), None) => ChangeType::Removed,
                (Some(o), Some(n)) if o != n => ChangeType::Modified,
                (Some(_), Some(_)) if old_owner != new_owner => ChangeType::OwnerChanged,
                _ => continue,
            };

            let diff = match (change_type, old, new) {
                (ChangeType::Modified, Some(o), Some(n)) if self.value_diffs => {
                    Some(DiffContent::between(o, n))
                }
                _ => None,
            };

            changes.push(FieldChange {
                path: path.to_string(),
                change_type,
                old_value: old.map(str::to_string),
                new_value: new.map(str::to_string),
                old_owner,
                new_owner,
                diff,
            });
        }

        DriftReport {
            object: object.to_string(),
            identity_changed: before.identity != after.identity,
            changes,
        }
    }

    /// Generate a human-readable summary
    pub fn summary(&self, report: &DriftReport) -> String {
        let mut parts = Vec::new();
        for change_type in [
            ChangeType::Added,
            ChangeType::Modified,
            ChangeType::Removed,
            ChangeType::OwnerChanged,
        ] {
            let count = report.changes_by_type(change_type).len();
            if count > 0 {
                parts.push(format!("{} {}", count, change_type));
            }
        }
        if report.identity_changed {
            parts.push("identity changed".to_string());
        }

        if parts.is_empty() {
            "No drift".to_string()
        } else {
            parts.join(", ")
        }
    }
}

impl Default for DiffEngine {
    fn default() -> Self {
        Self::new()
    }
}

/// Differences between two states of one object
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DriftReport {
    /// Display form of the object reference
    pub object: String,

    /// The identity marker differs between the two states
    pub identity_changed: bool,

    pub changes: Vec<FieldChange>,
}

impl DriftReport {
    pub fn has_drift(&self) -> bool {
        self.identity_changed || !self.changes.is_empty()
    }

    pub fn changes_by_type(&self, change_type: ChangeType) -> Vec<&FieldChange> {
        self.changes
            .iter()
            .filter(|c| c.change_type == change_type)
            .collect()
    }

    /// Fields now owned by a manager other than `manager`
    pub fn taken_by_others(&self, manager: &str) -> Vec<&FieldChange> {
        self.changes
            .iter()
            .filter(|c| c.new_owner.as_deref().is_some_and(|o| o != manager))
            .filter(|c| c.old_owner.as_deref() != c.new_owner.as_deref())
            .collect()
    }
}

/// A change to a single field
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FieldChange {
    pub path: String,
    pub change_type: ChangeType,
    pub old_value: Option<String>,
    pub new_value: Option<String>,
    pub old_owner: Option<String>,
    pub new_owner: Option<String>,
    pub diff: Option<DiffContent>,
}

/// Type of field change
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ChangeType {
    Added,
    Modified,
    Removed,
    /// Same value, different field manager
    OwnerChanged,
}

impl std::fmt::Display for ChangeType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ChangeType::Added => write!(f, "added"),
            ChangeType::Modified => write!(f, "modified"),
            ChangeType::Removed => write!(f, "removed"),
            ChangeType::OwnerChanged => write!(f, "owner changed"),
        }
    }
}

/// Line diff of two field values
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DiffContent {
    pub lines: Vec<DiffLine>,
}

impl DiffContent {
    /// Diff two canonical values, pretty-printing JSON so nested values diff by line
    fn between(old: &str, new: &str) -> Self {
        let old = pretty(old);
        let new = pretty(new);
        let diff = TextDiff::from_lines(&old, &new);

        let lines = diff
            .iter_all_changes()
            .map(|change| DiffLine {
                line_type: match change.tag() {
                    ChangeTag::Delete => LineType::Removed,
                    ChangeTag::Insert => LineType::Added,
                    ChangeTag::Equal => LineType::Context,
                },
                content: change.value().trim_end().to_string(),
            })
            .collect();

        Self { lines }
    }

    /// Generate a unified diff string
    pub fn to_unified_diff(&self) -> String {
        let mut output = String::new();
        for line in &self.lines {
            let prefix = match line.line_type {
                LineType::Added => "+",
                LineType::Removed => "-",
                LineType::Context => " ",
            };
            output.push_str(prefix);
            output.push_str(&line.content);
            output.push('\n');
        }
        output
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DiffLine {
    pub line_type: LineType,
    pub content: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LineType {
    Added,
    Removed,
    Context,
}

fn pretty(canonical: &str) -> String {
    match serde_json::from_str::<Value>(canonical) {
        Ok(value @ (Value::Object(_) | Value::Array(_))) => {
            serde_json::to_string_pretty(&value).unwrap_or_else(|_| canonical.to_string())
        }
        _ => canonical.to_string(),
    }
}

/// Owners that differ between two ownership maps, as `(path, before, after)`
pub fn owner_changes<'a>(
    before: &'a FieldOwnershipMap,
    after: &'a FieldOwnershipMap,
) -> Vec<(&'a str, Option<&'a str>, Option<&'a str>)> {
    let paths: BTreeSet<&str> = before
        .iter()
        .chain(after.iter())
        .map(|(path, _)| path)
        .collect();
    paths
        .into_iter()
        .filter_map(|path| {
            let (old, new) = (before.owner(path), after.owner(path));
            (old != new).then_some((path, old, new))
        })
        .collect()
}
