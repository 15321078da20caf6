//! Persisted state of a managed object
//!
//! A record has two halves that are written together but compared
//! separately:
//!
//! - [`ComparableState`]: what the surrounding declarative tool diffs
//! - [`PrivateState`]: bookkeeping the diff must never see (ownership at the
//!   last apply, the pending-projection flag)
//!
//! `ResourceRecord` deliberately does not implement `PartialEq`; use
//! [`ResourceRecord::same_state`] to compare records.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::object::{IdentityMarker, ObjectRef};
use crate::ownership::FieldOwnershipMap;
use crate::projection::Projection;

/// Diffable part of a record
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ComparableState {
    /// Identity marker written into the live object
    pub identity: IdentityMarker,

    /// Fields owned by the tool
    pub projection: Projection,

    /// Current owners of the projected fields
    #[serde(default)]
    pub field_owners: FieldOwnershipMap,
}

/// Non-diffable bookkeeping
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PrivateState {
    /// Field owners as observed right after the last successful apply
    #[serde(default)]
    pub ownership_at_last_apply: FieldOwnershipMap,

    /// Apply succeeded but the projection could not be computed
    #[serde(default)]
    pub projection_pending: bool,

    /// The object was adopted and the identity marker has not been written yet
    #[serde(default)]
    pub identity_unwritten: bool,
}

/// Everything persisted for one managed object
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ResourceRecord {
    pub object: ObjectRef,
    pub state: ComparableState,
    #[serde(default)]
    pub private: PrivateState,
    pub updated_at: DateTime<Utc>,
}

impl ResourceRecord {
    pub fn new(object: ObjectRef, identity: IdentityMarker) -> Self {
        Self {
            object,
            state: ComparableState {
                identity,
                projection: Projection::new(),
                field_owners: FieldOwnershipMap::new(),
            },
            private: PrivateState::default(),
            updated_at: Utc::now(),
        }
    }

    pub fn identity(&self) -> &IdentityMarker {
        &self.state.identity
    }

    /// Compare only the diffable halves of two records
    pub fn same_state(&self, other: &ResourceRecord) -> bool {
        self.object == other.object && self.state == other.state
    }

    pub fn touch(&mut self) {
        self.updated_at = Utc::now();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record() -> ResourceRecord {
        ResourceRecord::new(
            ObjectRef::new("v1", "ConfigMap", Some("default"), "cfg"),
            IdentityMarker::from("id-1"),
        )
    }

    #[test]
    fn test_private_state_ignored_by_same_state() {
        let a = record();
        let mut b = a.clone();
        b.private.projection_pending = true;
        b.private
            .ownership_at_last_apply
            .insert("data.a", "kubeward");
        b.touch();

        assert!(a.same_state(&b));
    }

    #[test]
    fn test_comparable_change_detected() {
        let a = record();
        let mut b = a.clone();
        b.state.field_owners.insert("data.a", "kubectl");
        assert!(!a.same_state(&b));
    }

    #[test]
    fn test_record_round_trip_keeps_sections_apart() {
        let mut r = record();
        r.private.projection_pending = true;
        let json = serde_json::to_value(&r).unwrap();

        assert_eq!(json["private"]["projectionPending"], true);
        assert!(json["state"].get("projectionPending").is_none());

        let back: ResourceRecord = serde_json::from_value(json).unwrap();
        assert!(back.private.projection_pending);
    }
}
