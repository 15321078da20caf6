//! Ownership tracker
//!
//! Keeps "ownership at last apply" in the record's private half. Only
//! Create and Update refresh it; Read compares it against what the server
//! reports now to find managed fields other writers have taken.

use kubeward_core::{FieldOwnershipMap, FieldPath, OwnershipTransition, ResourceRecord};
use std::collections::BTreeSet;
use tracing::info;

use crate::projection::{ProjectionError, recorded_paths};

/// Tracks ownership of managed fields for one field manager
#[derive(Debug, Clone)]
pub struct OwnershipTracker<'a> {
    manager: &'a str,
}

impl<'a> OwnershipTracker<'a> {
    pub fn new(manager: &'a str) -> Self {
        Self { manager }
    }

    /// Store the fields owned right after a successful apply
    pub fn record_apply(&self, record: &mut ResourceRecord, owned_now: &FieldOwnershipMap) {
        record.private.ownership_at_last_apply = owned_now
            .paths_owned_by(self.manager)
            .map(|p| (p.to_string(), self.manager.to_string()))
            .collect();
    }

    /// Managed fields owned at the last apply that someone else owns now
    pub fn transitions(
        &self,
        record: &ResourceRecord,
        observed: &FieldOwnershipMap,
    ) -> Vec<OwnershipTransition> {
        record
            .private
            .ownership_at_last_apply
            .lost_by(self.manager, observed)
    }

    /// Lost fields the next apply will take back
    ///
    /// Only fields still present in the desired document are reclaimed;
    /// dropped ones are left to their new owner.
    pub fn reclaim_candidates(
        &self,
        record: &ResourceRecord,
        observed: &FieldOwnershipMap,
        desired: &BTreeSet<FieldPath>,
    ) -> Vec<OwnershipTransition> {
        let desired: BTreeSet<String> = desired.iter().map(ToString::to_string).collect();
        let candidates: Vec<OwnershipTransition> = self
            .transitions(record, observed)
            .into_iter()
            .filter(|t| t.to.is_some() && desired.contains(&t.path))
            .collect();

        for candidate in &candidates {
            info!(
                object = %record.object,
                path = %candidate.path,
                owner = candidate.to.as_deref().unwrap_or_default(),
                "Field owned by another manager will be reclaimed"
            );
        }
        candidates
    }

    /// Paths owned at the last apply, projected even after losing them
    pub fn recorded_paths(&self, record: &ResourceRecord) -> Result<BTreeSet<FieldPath>, ProjectionError> {
        recorded_paths(&record.private.ownership_at_last_apply)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use kubeward_core::{IdentityMarker, ObjectRef};

    fn record() -> ResourceRecord {
        ResourceRecord::new(
            ObjectRef::new("v1", "ConfigMap", Some("default"), "cfg"),
            IdentityMarker::from("abc"),
        )
    }

    fn owners(entries: &[(&str, &str)]) -> FieldOwnershipMap {
        entries
            .iter()
            .map(|(p, m)| (p.to_string(), m.to_string()))
            .collect()
    }

    #[test]
    fn test_record_apply_keeps_own_fields_only() {
        let tracker = OwnershipTracker::new("kubeward");
        let mut record = record();
        tracker.record_apply(
            &mut record,
            &owners(&[("data.a", "kubeward"), ("data.b", "kubectl")]),
        );

        assert_eq!(record.private.ownership_at_last_apply.len(), 1);
        assert_eq!(
            record.private.ownership_at_last_apply.owner("data.a"),
            Some("kubeward")
        );
        // Not part of the diffable half
        assert!(record.state.field_owners.is_empty());
    }

    #[test]
    fn test_transitions_and_reclaim() {
        let tracker = OwnershipTracker::new("kubeward");
        let mut record = record();
        tracker.record_apply(
            &mut record,
            &owners(&[("data.a", "kubeward"), ("data.b", "kubeward"), ("data.c", "kubeward")]),
        );

        let observed = owners(&[("data.a", "kubeward"), ("data.b", "kubectl")]);
        let transitions = tracker.transitions(&record, &observed);
        assert_eq!(transitions.len(), 2);
        assert_eq!(transitions[0].path, "data.b");
        assert_eq!(transitions[0].to.as_deref(), Some("kubectl"));
        assert_eq!(transitions[1].path, "data.c");
        assert_eq!(transitions[1].to, None);

        let desired: BTreeSet<FieldPath> =
            ["data.a", "data.b"].iter().map(|p| p.parse().unwrap()).collect();
        let reclaim = tracker.reclaim_candidates(&record, &observed, &desired);
        assert_eq!(reclaim.len(), 1);
        assert_eq!(reclaim[0].path, "data.b");
    }

    #[test]
    fn test_recorded_paths() {
        let tracker = OwnershipTracker::new("kubeward");
        let mut record = record();
        tracker.record_apply(&mut record, &owners(&[("data.a", "kubeward")]));

        let paths = tracker.recorded_paths(&record).unwrap();
        assert!(paths.contains(&FieldPath::fields(["data", "a"])));
    }
}
