//! Reading `metadata.managedFields`
//!
//! Each managed-fields entry carries a `fieldsV1` trie whose keys are
//! prefixed by their kind:
//!
//! - `f:<name>` - object member
//! - `k:<json>` - list item selected by merge keys
//! - `v:<json>` - set item selected by value
//! - `i:<index>` - list item selected by position
//! - `.` - the node itself
//!
//! Only leaves of the trie become [`FieldPath`]s: a node is a leaf when it
//! has no children other than `.`.

use chrono::{DateTime, Utc};
use k8s_openapi::apimachinery::pkg::apis::meta::v1::ManagedFieldsEntry;
use kube::api::DynamicObject;
use kubeward_core::{FieldOwnershipMap, FieldPath, Segment, canonical_value};
use serde_json::{Map, Value};
use std::collections::{BTreeMap, BTreeSet};
use thiserror::Error;

/// Malformed managed-fields metadata
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum FieldsError {
    #[error("fieldsV1 node at '{path}' is not an object")]
    NotAnObject { path: String },

    #[error("unknown fieldsV1 key '{key}' at '{path}'")]
    UnknownKey { path: String, key: String },

    #[error("invalid fieldsV1 key '{key}' at '{path}': {message}")]
    InvalidKey {
        path: String,
        key: String,
        message: String,
    },
}

/// Leaf paths described by a `fieldsV1` trie
pub fn field_paths(fields_v1: &Value) -> Result<Vec<FieldPath>, FieldsError> {
    let mut out = Vec::new();
    walk(fields_v1, &FieldPath::root(), &mut out)?;
    Ok(out)
}

fn walk(node: &Value, path: &FieldPath, out: &mut Vec<FieldPath>) -> Result<(), FieldsError> {
    let map = node.as_object().ok_or_else(|| FieldsError::NotAnObject {
        path: path.to_string(),
    })?;

    let children: Vec<(&String, &Value)> = map.iter().filter(|(k, _)| k.as_str() != ".").collect();
    if children.is_empty() {
        if !path.is_root() {
            out.push(path.clone());
        }
        return Ok(());
    }

    for (key, child) in children {
        let segment = parse_key(key, path)?;
        walk(child, &path.child(segment), out)?;
    }
    Ok(())
}

fn parse_key(key: &str, path: &FieldPath) -> Result<Segment, FieldsError> {
    let invalid = |message: String| FieldsError::InvalidKey {
        path: path.to_string(),
        key: key.to_string(),
        message,
    };

    if let Some(name) = key.strip_prefix("f:") {
        return Ok(Segment::Field(name.to_string()));
    }
    if let Some(raw) = key.strip_prefix("k:") {
        let selector: Map<String, Value> =
            serde_json::from_str(raw).map_err(|e| invalid(e.to_string()))?;
        return Ok(Segment::key(
            selector.iter().map(|(k, v)| (k.clone(), canonical_value(v))),
        ));
    }
    if let Some(raw) = key.strip_prefix("v:") {
        let value: Value = serde_json::from_str(raw).map_err(|e| invalid(e.to_string()))?;
        return Ok(Segment::Value(canonical_value(&value)));
    }
    if let Some(raw) = key.strip_prefix("i:") {
        let index = raw.parse().map_err(|_| invalid("not an index".to_string()))?;
        return Ok(Segment::Index(index));
    }

    Err(FieldsError::UnknownKey {
        path: path.to_string(),
        key: key.to_string(),
    })
}

fn entries(object: &DynamicObject) -> &[ManagedFieldsEntry] {
    object.metadata.managed_fields.as_deref().unwrap_or_default()
}

fn entry_paths(entry: &ManagedFieldsEntry) -> Result<Vec<FieldPath>, FieldsError> {
    match &entry.fields_v1 {
        Some(fields) => field_paths(&fields.0),
        None => Ok(Vec::new()),
    }
}

/// Leaf paths owned by `manager` on a live object
///
/// A manager can have several entries (one per operation type or
/// subresource); all of them count.
pub fn owned_paths(object: &DynamicObject, manager: &str) -> Result<BTreeSet<FieldPath>, FieldsError> {
    let mut owned = BTreeSet::new();
    for entry in entries(object) {
        if entry.manager.as_deref() == Some(manager) {
            owned.extend(entry_paths(entry)?);
        }
    }
    Ok(owned)
}

/// Owner of every leaf path on a live object
///
/// When several managers share a field, the most recent writer wins; equal
/// timestamps fall back to the manager name so the result is deterministic.
pub fn ownership_map(object: &DynamicObject) -> Result<FieldOwnershipMap, FieldsError> {
    let mut owners: BTreeMap<String, (Option<DateTime<Utc>>, String)> = BTreeMap::new();

    for entry in entries(object) {
        let Some(manager) = entry.manager.as_deref() else {
            continue;
        };
        let time = entry.time.as_ref().map(|t| t.0);

        for path in entry_paths(entry)? {
            let candidate = (time, manager.to_string());
            let key = path.to_string();
            match owners.get(&key) {
                Some(current) if *current >= candidate => {}
                _ => {
                    owners.insert(key, candidate);
                }
            }
        }
    }

    Ok(owners
        .into_iter()
        .map(|(path, (_, manager))| (path, manager))
        .collect())
}

/// Leaf paths of a desired document
///
/// Scalars, arrays and empty maps are leaves. The object's coordinates
/// (`apiVersion`, `kind`, `metadata.name`, `metadata.namespace`) are left out
/// since the server never attributes them to a manager.
pub fn document_leaves(document: &Value) -> BTreeSet<FieldPath> {
    let mut out = BTreeSet::new();
    collect_leaves(document, &FieldPath::root(), &mut out);

    let coordinates = ["apiVersion", "kind", "metadata.name", "metadata.namespace"];
    out.retain(|p| !coordinates.contains(&p.to_string().as_str()));
    out
}

fn collect_leaves(value: &Value, path: &FieldPath, out: &mut BTreeSet<FieldPath>) {
    match value {
        Value::Object(map) if !map.is_empty() => {
            for (key, child) in map {
                collect_leaves(child, &path.field(key.as_str()), out);
            }
        }
        _ if path.is_root() => {}
        _ => {
            out.insert(path.clone());
        }
    }
}

/// Value at `path` inside a document
pub fn value_at<'a>(document: &'a Value, path: &FieldPath) -> Option<&'a Value> {
    let mut current = document;
    for segment in path.segments() {
        current = match (segment, current) {
            (Segment::Field(name), Value::Object(map)) => map.get(name)?,
            (Segment::Index(index), Value::Array(items)) => items.get(*index)?,
            (Segment::Key(pairs), Value::Array(items)) => items
                .iter()
                .find(|item| kubeward_core::matches_key(item, pairs))?,
            (Segment::Value(expected), Value::Array(items)) => items
                .iter()
                .find(|item| canonical_value(item) == *expected)?,
            _ => return None,
        };
    }
    Some(current)
}
