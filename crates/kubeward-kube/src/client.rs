//! High-level client
//!
//! Ties a [`Reconciler`] to a [`RecordStore`]: looks up the persisted
//! record, runs the lifecycle operation and persists whatever record the
//! outcome carries (or forgets it when the outcome dropped it).

use kubeward_core::{ObjectRef, ResourceRecord};
use tracing::debug;

use crate::config::EngineConfig;
use crate::diff::{DiffEngine, DriftReport};
use crate::error::{KubeError, Result};
use crate::lifecycle::{ObjectOptions, ObjectRequest, Outcome, Reconciler};
use crate::storage::RecordStore;
use crate::store::{KubeObjectStore, ObjectStore};

/// Outcome of a client call, plus drift found along the way
#[derive(Debug, Clone)]
pub struct ObjectResult {
    pub outcome: Outcome,
    /// Changes between the persisted state and the new one
    pub drift: Option<DriftReport>,
}

/// Reconciles objects and keeps their records
pub struct KubewardClient<S: ObjectStore, R: RecordStore> {
    reconciler: Reconciler<S>,
    records: R,
    diff_engine: DiffEngine,
}

impl<R: RecordStore> KubewardClient<KubeObjectStore, R> {
    /// Connect using the default kubeconfig or in-cluster configuration
    pub async fn connect(records: R, config: EngineConfig) -> Result<Self> {
        let client = kube::Client::try_default().await?;
        let store = KubeObjectStore::new(client).await?;
        Ok(Self::new(store, records, config))
    }
}

impl<S: ObjectStore, R: RecordStore> KubewardClient<S, R> {
    pub fn new(store: S, records: R, config: EngineConfig) -> Self {
        Self {
            reconciler: Reconciler::new(store, config),
            records,
            diff_engine: DiffEngine::new(),
        }
    }

    pub fn reconciler(&self) -> &Reconciler<S> {
        &self.reconciler
    }

    pub fn records(&self) -> &R {
        &self.records
    }

    async fn record(&self, object: &ObjectRef) -> Result<Option<ResourceRecord>> {
        match self.records.get(object).await {
            Ok(record) => Ok(Some(record)),
            Err(KubeError::RecordNotFound { .. }) => Ok(None),
            Err(e) => Err(e),
        }
    }

    /// Save the outcome's record, or forget the object when it has none
    async fn persist(&self, object: &ObjectRef, outcome: &Outcome) -> Result<()> {
        match &outcome.record {
            Some(record) => self.records.save(record).await,
            None => {
                if self.records.exists(object).await? {
                    debug!(object = %object, "Forgetting record");
                    self.records.delete(object).await?;
                }
                Ok(())
            }
        }
    }

    fn drift(&self, before: &ResourceRecord, outcome: &Outcome) -> Option<DriftReport> {
        let after = outcome.record.as_ref()?;
        let report = self
            .diff_engine
            .diff_states(&before.object, &before.state, &after.state);
        report.has_drift().then_some(report)
    }

    /// Create the object, or update it when a record exists
    pub async fn apply(&self, request: &ObjectRequest) -> Result<ObjectResult> {
        let object = request.object.reference();
        let (outcome, drift) = match self.record(object).await? {
            Some(record) => {
                let before = record.clone();
                let outcome = self.reconciler.update(request, record).await;
                let drift = self.drift(&before, &outcome);
                (outcome, drift)
            }
            None => (self.reconciler.create(request).await, None),
        };

        self.persist(object, &outcome).await?;
        Ok(ObjectResult { outcome, drift })
    }

    /// Refresh the record from the live object
    pub async fn refresh(&self, object: &ObjectRef, options: &ObjectOptions) -> Result<ObjectResult> {
        let record = self
            .record(object)
            .await?
            .ok_or_else(|| KubeError::RecordNotFound {
                object: object.to_string(),
            })?;

        let before = record.clone();
        let outcome = self.reconciler.read(record, options).await;
        let drift = self.drift(&before, &outcome);

        self.persist(object, &outcome).await?;
        Ok(ObjectResult { outcome, drift })
    }

    /// Delete the object and forget its record
    pub async fn destroy(&self, object: &ObjectRef, options: &ObjectOptions) -> Result<ObjectResult> {
        let record = self
            .record(object)
            .await?
            .ok_or_else(|| KubeError::RecordNotFound {
                object: object.to_string(),
            })?;

        let outcome = self.reconciler.delete(record, options).await;
        self.persist(object, &outcome).await?;
        Ok(ObjectResult {
            outcome,
            drift: None,
        })
    }

    /// Bring an existing object under management
    pub async fn adopt(&self, request: &ObjectRequest) -> Result<ObjectResult> {
        let object = request.object.reference();
        if self.records.exists(object).await? {
            return Err(KubeError::InvalidConfig(format!(
                "{} is already managed; use apply instead",
                object
            )));
        }

        let outcome = self.reconciler.adopt(request).await;
        self.persist(object, &outcome).await?;
        Ok(ObjectResult {
            outcome,
            drift: None,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::lifecycle::LifecycleState;
    use crate::storage::MockRecordStore;
    use crate::store::MockObjectStore;
    use kubeward_core::ManagedObject;
    use serde_json::json;
    use std::time::Duration;

    fn client() -> (
        KubewardClient<MockObjectStore, MockRecordStore>,
        MockObjectStore,
        MockRecordStore,
    ) {
        let store = MockObjectStore::new();
        let records = MockRecordStore::new();
        let config = EngineConfig {
            delete_poll_interval: Duration::from_millis(5),
            ..Default::default()
        };
        (
            KubewardClient::new(store.clone(), records.clone(), config),
            store,
            records,
        )
    }

    fn request(value: &str) -> ObjectRequest {
        ObjectRequest::new(
            ManagedObject::from_value(json!({
                "apiVersion": "v1",
                "kind": "ConfigMap",
                "metadata": {"name": "cfg", "namespace": "default"},
                "data": {"a": value}
            }))
            .unwrap(),
        )
    }

    #[tokio::test]
    async fn test_apply_creates_then_updates() {
        let (client, _store, records) = client();

        let result = client.apply(&request("1")).await.unwrap();
        assert_eq!(result.outcome.state, LifecycleState::LiveOwned);
        assert!(result.drift.is_none());
        assert_eq!(records.record_count(), 1);

        let result = client.apply(&request("2")).await.unwrap();
        let drift = result.drift.unwrap();
        assert_eq!(drift.changes.len(), 1);
        assert_eq!(drift.changes[0].path, "data.a");
        assert_eq!(drift.changes[0].new_value.as_deref(), Some("2"));
    }

    #[tokio::test]
    async fn test_refresh_reports_external_edit() {
        let (client, store, _records) = client();
        let request = request("1");
        client.apply(&request).await.unwrap();

        store
            .apply_as(
                "kubectl",
                &json!({
                    "apiVersion": "v1",
                    "kind": "ConfigMap",
                    "metadata": {"name": "cfg", "namespace": "default"},
                    "data": {"a": "edited"}
                }),
                true,
            )
            .unwrap();

        let result = client
            .refresh(request.object.reference(), &ObjectOptions::default())
            .await
            .unwrap();
        let drift = result.drift.unwrap();
        assert_eq!(drift.taken_by_others("kubeward").len(), 1);
        assert_eq!(result.outcome.transitions.len(), 1);
    }

    #[tokio::test]
    async fn test_destroy_forgets_record() {
        let (client, store, records) = client();
        let request = request("1");
        client.apply(&request).await.unwrap();

        let result = client
            .destroy(request.object.reference(), &ObjectOptions::default())
            .await
            .unwrap();
        assert_eq!(result.outcome.state, LifecycleState::Deleted);
        assert_eq!(records.record_count(), 0);
        assert!(!store.contains(request.object.reference()));

        assert!(client
            .destroy(request.object.reference(), &ObjectOptions::default())
            .await
            .unwrap_err()
            .is_not_found());
    }

    #[tokio::test]
    async fn test_adopt_refuses_managed_object() {
        let (client, store, records) = client();
        let request = request("1");
        store
            .apply_as("kubectl", request.object.document(), false)
            .unwrap();

        let result = client.adopt(&request).await.unwrap();
        assert_eq!(result.outcome.state, LifecycleState::LiveOwned);
        assert_eq!(records.record_count(), 1);
        assert!(client.adopt(&request).await.is_err());
    }
}
