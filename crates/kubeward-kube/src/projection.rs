//! Projection engine
//!
//! [`project`] is a pure function of the live document, the owned path set
//! and the ignore set. [`compute_snapshot`] gathers those inputs from a live
//! object's `managedFields` and also reports who owns each projected field.

use kube::api::DynamicObject;
use kubeward_core::{FieldOwnershipMap, FieldPath, IgnoreSet, Projection};
use serde_json::Value;
use std::collections::BTreeSet;
use thiserror::Error;

use crate::fields::{self, FieldsError, document_leaves, value_at};
use crate::store::to_document;

/// Failure to compute a projection from a live object
#[derive(Debug, Clone, Error)]
pub enum ProjectionError {
    #[error("unreadable managedFields: {0}")]
    Fields(#[from] FieldsError),

    #[error("unreadable live object: {0}")]
    Document(String),

    #[error("could not read the object back: {0}")]
    ReadBack(String),

    #[error("invalid recorded path '{path}': {message}")]
    RecordedPath { path: String, message: String },
}

/// Projection plus ownership observed on one live object
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Snapshot {
    pub projection: Projection,
    /// Owner of every projected field right now
    pub observed: FieldOwnershipMap,
    /// Projected fields owned by the tool right now
    pub owned_now: FieldOwnershipMap,
}

/// Project the fields at `paths` out of `live`
///
/// Paths covered by `ignore` are skipped, as are paths with no value in the
/// live document.
pub fn project(live: &Value, paths: &BTreeSet<FieldPath>, ignore: &IgnoreSet) -> Projection {
    let mut projection = Projection::new();
    for path in paths {
        if ignore.covers(path) {
            continue;
        }
        if let Some(value) = value_at(live, path) {
            projection.insert(path, value);
        }
    }
    projection
}

/// Compute the projection and ownership snapshot of a live object
///
/// The projected paths are those `manager` owns now plus `extra` (fields it
/// owned at the last apply), so a field taken over by another writer keeps
/// showing up with that writer's value. Paths under `reserved` are never
/// projected.
pub fn compute_snapshot(
    live: &DynamicObject,
    manager: &str,
    ignore: &IgnoreSet,
    extra: &BTreeSet<FieldPath>,
    reserved: &[FieldPath],
) -> Result<Snapshot, ProjectionError> {
    let owned = fields::owned_paths(live, manager)?;
    let all_owners = fields::ownership_map(live)?;
    let document = to_document(live).map_err(|e| ProjectionError::Document(e.to_string()))?;

    let paths: BTreeSet<FieldPath> = owned
        .iter()
        .chain(extra.iter())
        .filter(|p| !reserved.iter().any(|r| r.covers(p)))
        .cloned()
        .collect();

    let projection = project(&document, &paths, ignore);

    let mut observed = FieldOwnershipMap::new();
    let mut owned_now = FieldOwnershipMap::new();
    for path in paths.iter().filter(|p| projection.contains(&p.to_string())) {
        let key = path.to_string();
        if owned.contains(path) {
            observed.insert(key.clone(), manager);
            owned_now.insert(key, manager);
        } else if let Some(owner) = all_owners.owner(&key) {
            observed.insert(key.clone(), owner);
        }
    }

    Ok(Snapshot {
        projection,
        observed,
        owned_now,
    })
}

/// Best-effort projection of a desired document, without a live object
///
/// Used when there is no connection to compare against: every leaf the
/// document sets counts as owned.
pub fn planned_projection(desired: &Value, ignore: &IgnoreSet, reserved: &[FieldPath]) -> Projection {
    let mut paths = document_leaves(desired);
    paths.retain(|p| !reserved.iter().any(|r| r.covers(p)));
    project(desired, &paths, ignore)
}

/// Parse rendered paths recorded in a persisted ownership map
pub fn recorded_paths(map: &FieldOwnershipMap) -> Result<BTreeSet<FieldPath>, ProjectionError> {
    map.iter()
        .map(|(path, _)| {
            path.parse().map_err(|e: kubeward_core::CoreError| ProjectionError::RecordedPath {
                path: path.to_string(),
                message: e.to_string(),
            })
        })
        .collect()
}
