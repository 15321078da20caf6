//! Delete and wait
//!
//! Deletion is requested once, then the object is polled until it is gone,
//! replaced by an object with another identity, or the timeout expires.
//! Finalizers still set at the timeout are reported, or stripped when the
//! caller opted into force-destroy.

use kubeward_core::{ObjectRef, ResourceRecord};
use std::time::Duration;
use tokio::time::{Instant, sleep};
use tracing::{debug, info, warn};

use super::{LifecycleState, ObjectOptions, Outcome, Reconciler};
use crate::classify::{Diagnostic, ErrorKind, Operation, classify};
use crate::finalizers::describe_blocking;
use crate::store::{ObjectStore, live_finalizers};

/// How a wait for deletion ended
#[derive(Debug, Clone, PartialEq, Eq)]
enum Wait {
    Gone,
    /// An object with another identity took the coordinates
    Replaced,
    /// Still present, with these finalizers
    TimedOut(Vec<String>),
}

impl<S: ObjectStore> Reconciler<S> {
    /// Delete the object and wait for it to disappear
    pub async fn delete(&self, record: ResourceRecord, options: &ObjectOptions) -> Outcome {
        let object = record.object.clone();

        if options.delete_protection {
            return Outcome::failed(
                Self::resting_state(&record),
                Some(record),
                Diagnostic::error(
                    ErrorKind::DeleteProtected,
                    format!("{} is protected from deletion", object),
                    "disable delete protection first, then delete again",
                ),
            );
        }

        if options.apply_only {
            info!(object = %object, "Apply-only object, forgetting without deleting");
            return Outcome::failed(
                LifecycleState::Deleted,
                None,
                Diagnostic::info(
                    ErrorKind::Generic,
                    format!("{} left in place", object),
                    "the object is apply-only; it is no longer managed but was not deleted",
                ),
            );
        }

        let live = match self.store.get(&object).await {
            Ok(Some(live)) => live,
            Ok(None) => return deleted(&object),
            Err(e) => {
                let diag = classify(&e, Operation::Delete, &object);
                return match diag.kind {
                    ErrorKind::NotFound | ErrorKind::TypeNotRegistered => deleted(&object),
                    _ => Outcome::failed(Self::resting_state(&record), Some(record), diag),
                };
            }
        };
        if !self.owns(&live, &record) {
            debug!(object = %object, "Object belongs to another instance, not deleting");
            return deleted(&object);
        }

        if let Err(e) = self.store.delete(&object, options.propagation).await {
            let diag = classify(&e, Operation::Delete, &object);
            if diag.kind == ErrorKind::NotFound {
                return deleted(&object);
            }
            return Outcome::failed(Self::resting_state(&record), Some(record), diag);
        }
        info!(object = %object, propagation = %options.propagation, "Deletion requested");

        let timeout = options
            .delete_timeout
            .unwrap_or_else(|| self.config.delete_timeouts.for_kind(&object.kind));

        let finalizers = match self.wait_for_deletion(&record, timeout).await {
            Ok(Wait::Gone) | Ok(Wait::Replaced) => return deleted(&object),
            Ok(Wait::TimedOut(finalizers)) => finalizers,
            Err(diag) => return Outcome::failed(LifecycleState::Deleting, Some(record), diag),
        };

        if !options.force_destroy {
            warn!(object = %object, ?finalizers, "Deletion still blocked at timeout");
            let detail = format!(
                "{} still exists {:?} after deletion was requested.\n{}",
                object,
                timeout,
                describe_blocking(&finalizers)
            );
            return Outcome::failed(
                LifecycleState::Deleting,
                Some(record),
                Diagnostic::error(
                    ErrorKind::DeleteBlocked { finalizers },
                    format!("Deletion of {} is blocked", object),
                    detail,
                ),
            );
        }

        self.force_destroy(record, finalizers, timeout).await
    }

    /// Strip finalizers from a stuck object and wait once more
    async fn force_destroy(
        &self,
        record: ResourceRecord,
        finalizers: Vec<String>,
        timeout: Duration,
    ) -> Outcome {
        let object = record.object.clone();
        warn!(object = %object, ?finalizers, "Removing finalizers to force deletion");

        if let Err(e) = self.store.remove_finalizers(&object).await {
            let diag = classify(&e, Operation::Delete, &object);
            if diag.kind == ErrorKind::NotFound {
                return deleted(&object);
            }
            return Outcome::failed(LifecycleState::Deleting, Some(record), diag);
        }

        match self.wait_for_deletion(&record, timeout).await {
            Ok(Wait::Gone) | Ok(Wait::Replaced) => {
                let mut outcome = deleted(&object);
                outcome.diagnostics = vec![Diagnostic::warning(
                    ErrorKind::DeleteBlocked {
                        finalizers: finalizers.clone(),
                    },
                    format!("Forced deletion of {}", object),
                    format!(
                        "finalizers were removed; cleanup they guarded may not have run.\n{}",
                        describe_blocking(&finalizers)
                    ),
                )];
                outcome
            }
            Ok(Wait::TimedOut(remaining)) => Outcome::failed(
                LifecycleState::Deleting,
                Some(record),
                Diagnostic::error(
                    ErrorKind::DeleteBlocked {
                        finalizers: remaining.clone(),
                    },
                    format!("Deletion of {} is blocked", object),
                    format!(
                        "the object survived removing its finalizers.\n{}",
                        describe_blocking(&remaining)
                    ),
                ),
            ),
            Err(diag) => Outcome::failed(LifecycleState::Deleting, Some(record), diag),
        }
    }

    /// Poll until the object is gone, replaced or `timeout` expires
    async fn wait_for_deletion(
        &self,
        record: &ResourceRecord,
        timeout: Duration,
    ) -> Result<Wait, Diagnostic> {
        let object = &record.object;
        let start = Instant::now();

        loop {
            let live = match self.store.get(object).await {
                Ok(live) => live,
                Err(e) => {
                    let diag = classify(&e, Operation::Delete, object);
                    match diag.kind {
                        ErrorKind::NotFound | ErrorKind::TypeNotRegistered => None,
                        _ => return Err(diag),
                    }
                }
            };

            let Some(live) = live else {
                return Ok(Wait::Gone);
            };
            if !self.owns(&live, record) {
                debug!(object = %object, "Object replaced while waiting for deletion");
                return Ok(Wait::Replaced);
            }
            if start.elapsed() >= timeout {
                return Ok(Wait::TimedOut(live_finalizers(&live)));
            }

            debug!(object = %object, elapsed = ?start.elapsed(), "Waiting for deletion");
            sleep(self.config.delete_poll_interval).await;
        }
    }
}

fn deleted(object: &ObjectRef) -> Outcome {
    debug!(object = %object, "Deleted");
    Outcome::new(LifecycleState::Deleted, None)
}

#[cfg(test)]
mod tests {
    use super::super::tests::{configmap, reconciler};
    use super::*;
    use crate::classify::Severity;
    use crate::lifecycle::ObjectRequest;
    use crate::store::{ApiFailure, MockObjectStore, MockOp, StoreError};
    use serde_json::json;

    async fn created(
        reconciler: &Reconciler<MockObjectStore>,
    ) -> (ResourceRecord, ObjectRef) {
        let request = ObjectRequest::new(configmap(json!({"a": "1"})));
        let record = reconciler.create(&request).await.record.unwrap();
        (record, request.object.reference().clone())
    }

    fn quick() -> ObjectOptions {
        ObjectOptions::new().with_delete_timeout(Duration::from_millis(30))
    }

    #[tokio::test]
    async fn test_delete_removes_object() {
        let (reconciler, store) = reconciler();
        let (record, object) = created(&reconciler).await;

        let outcome = reconciler.delete(record, &quick()).await;
        assert_eq!(outcome.state, LifecycleState::Deleted);
        assert!(outcome.record.is_none());
        assert!(outcome.diagnostics.is_empty());
        assert!(!store.contains(&object));
    }

    #[tokio::test]
    async fn test_delete_protection_makes_no_call() {
        let (reconciler, store) = reconciler();
        let (record, object) = created(&reconciler).await;
        store.reset_counts();

        let outcome = reconciler
            .delete(record, &quick().with_delete_protection())
            .await;
        assert!(outcome.has_errors());
        assert_eq!(outcome.diagnostics[0].kind, ErrorKind::DeleteProtected);
        assert!(outcome.record.is_some());
        assert_eq!(store.operation_counts().deletes, 0);
        assert_eq!(store.operation_counts().gets, 0);
        assert!(store.contains(&object));
    }

    #[tokio::test]
    async fn test_apply_only_forgets_without_deleting() {
        let (reconciler, store) = reconciler();
        let (record, object) = created(&reconciler).await;

        let outcome = reconciler.delete(record, &quick().with_apply_only()).await;
        assert_eq!(outcome.state, LifecycleState::Deleted);
        assert!(outcome.record.is_none());
        assert_eq!(outcome.diagnostics[0].severity, Severity::Info);
        assert_eq!(store.operation_counts().deletes, 0);
        assert!(store.contains(&object));
    }

    #[tokio::test]
    async fn test_delete_skips_foreign_object() {
        let (reconciler, store) = reconciler();
        let (record, object) = created(&reconciler).await;
        store.set_annotation(&object, "kubeward.io/instance-id", "someone-else");

        let outcome = reconciler.delete(record, &quick()).await;
        assert_eq!(outcome.state, LifecycleState::Deleted);
        assert!(outcome.record.is_none());
        assert_eq!(store.operation_counts().deletes, 0);
        assert!(store.contains(&object));
    }

    #[tokio::test]
    async fn test_adopted_record_spares_object_stamped_elsewhere() {
        let (reconciler, store) = reconciler();
        let request = ObjectRequest::new(configmap(json!({"a": "1"})));
        let object = request.object.reference().clone();
        store
            .apply_as("kubectl", request.object.document(), false)
            .unwrap();
        let record = reconciler.adopt(&request).await.record.unwrap();
        store.set_annotation(&object, "kubeward.io/instance-id", "other-instance");
        store.set_finalizers(&object, &["example.com/cleanup"]);
        store.reset_counts();

        let outcome = reconciler
            .delete(record, &quick().with_force_destroy())
            .await;
        assert_eq!(outcome.state, LifecycleState::Deleted);
        assert!(outcome.record.is_none());

        let counts = store.operation_counts();
        assert_eq!(counts.deletes, 0);
        assert_eq!(counts.finalizer_removals, 0);
        assert!(store.contains(&object));
        assert!(!store.is_deleting(&object));
    }

    #[tokio::test]
    async fn test_adopted_unmarked_object_is_deleted() {
        let (reconciler, store) = reconciler();
        let request = ObjectRequest::new(configmap(json!({"a": "1"})));
        let object = request.object.reference().clone();
        store
            .apply_as("kubectl", request.object.document(), false)
            .unwrap();
        let record = reconciler.adopt(&request).await.record.unwrap();

        let outcome = reconciler.delete(record, &quick()).await;
        assert_eq!(outcome.state, LifecycleState::Deleted);
        assert_eq!(store.operation_counts().deletes, 1);
        assert!(!store.contains(&object));
    }

    #[tokio::test]
    async fn test_delete_already_gone() {
        let (reconciler, store) = reconciler();
        let (record, object) = created(&reconciler).await;
        store.remove(&object);

        let outcome = reconciler.delete(record, &quick()).await;
        assert_eq!(outcome.state, LifecycleState::Deleted);
        assert_eq!(store.operation_counts().deletes, 0);

        // A 404 from the delete call itself also counts as done
        let (record, _) = created(&reconciler).await;
        store.fail_next(
            MockOp::Delete,
            StoreError::Api(ApiFailure::new(404, "NotFound", "configmaps \"cfg\" not found")),
        );
        let outcome = reconciler.delete(record, &quick()).await;
        assert_eq!(outcome.state, LifecycleState::Deleted);
        assert!(!outcome.has_errors());
    }

    #[tokio::test]
    async fn test_finalizer_blocks_until_timeout() {
        let (reconciler, store) = reconciler();
        let (record, object) = created(&reconciler).await;
        store.set_finalizers(&object, &["example.com/cleanup"]);

        let outcome = reconciler.delete(record, &quick()).await;
        assert_eq!(outcome.state, LifecycleState::Deleting);
        assert!(outcome.record.is_some());

        let diag = &outcome.diagnostics[0];
        assert_eq!(
            diag.kind,
            ErrorKind::DeleteBlocked {
                finalizers: vec!["example.com/cleanup".to_string()]
            }
        );
        assert!(diag.detail.contains("example.com/cleanup"));
        assert!(store.is_deleting(&object));
        assert_eq!(store.operation_counts().finalizer_removals, 0);
        // Polled more than once before giving up
        assert!(store.operation_counts().gets > 3);
    }

    #[tokio::test]
    async fn test_force_destroy_strips_finalizers() {
        let (reconciler, store) = reconciler();
        let (record, object) = created(&reconciler).await;
        store.set_finalizers(&object, &["example.com/cleanup"]);

        let outcome = reconciler
            .delete(record, &quick().with_force_destroy())
            .await;
        assert_eq!(outcome.state, LifecycleState::Deleted);
        assert!(outcome.record.is_none());
        assert!(!outcome.has_errors());
        assert_eq!(outcome.diagnostics[0].severity, Severity::Warning);
        assert_eq!(store.operation_counts().finalizer_removals, 1);
        assert!(!store.contains(&object));
    }

    #[tokio::test]
    async fn test_recreated_object_ends_the_wait() {
        let (reconciler, store) = reconciler();
        let (record, object) = created(&reconciler).await;
        store.recreate_after_delete(
            &object,
            "kubectl",
            json!({
                "apiVersion": "v1",
                "kind": "ConfigMap",
                "metadata": {"name": "cfg", "namespace": "default"},
                "data": {"a": "replacement"}
            }),
        );

        let outcome = reconciler
            .delete(record, &ObjectOptions::new().with_delete_timeout(Duration::from_secs(30)))
            .await;
        assert_eq!(outcome.state, LifecycleState::Deleted);
        assert!(outcome.record.is_none());
        assert!(store.contains(&object));
        assert_eq!(store.managers(&object), vec!["kubectl".to_string()]);
    }

    #[tokio::test]
    async fn test_kind_timeout_applies_without_override() {
        let (mut reconciler, store) = reconciler();
        reconciler.config.delete_timeouts.default = Duration::from_millis(20);
        let (record, object) = created(&reconciler).await;
        store.set_finalizers(&object, &["kubernetes"]);

        let outcome = reconciler.delete(record, &ObjectOptions::default()).await;
        assert_eq!(outcome.state, LifecycleState::Deleting);
        assert!(outcome.diagnostics[0].detail.contains("namespace controller"));
    }
}
