//! Object store backed by a live API server

use async_trait::async_trait;
use kube::{
    Client,
    api::{Api, DeleteParams, DynamicObject, Patch, PatchParams},
    core::GroupVersionKind,
    discovery::{ApiCapabilities, ApiResource, Discovery, Scope},
};
use kubeward_core::ObjectRef;
use serde_json::{Value, json};
use tokio::sync::RwLock;
use tracing::debug;

use super::{ApplyOutcome, ApplyParams, ObjectStore, PropagationPolicy, StoreError, StoreResult};
use crate::error::{KubeError, Result};

/// Object store using `kube::Client` with a cached discovery
///
/// Discovery is refreshed whenever a kind cannot be resolved, so a custom
/// resource definition created after startup becomes usable once the API
/// server serves it.
pub struct KubeObjectStore {
    client: Client,
    discovery: RwLock<Discovery>,
}

impl KubeObjectStore {
    /// Create a store and run an initial discovery
    pub async fn new(client: Client) -> Result<Self> {
        let discovery = Discovery::new(client.clone())
            .run()
            .await
            .map_err(KubeError::Api)?;

        Ok(Self {
            client,
            discovery: RwLock::new(discovery),
        })
    }

    /// Create from an existing client and discovery (for reuse)
    pub fn with_discovery(client: Client, discovery: Discovery) -> Self {
        Self {
            client,
            discovery: RwLock::new(discovery),
        }
    }

    /// Get the underlying Kubernetes client
    pub fn client(&self) -> &Client {
        &self.client
    }

    async fn refresh_discovery(&self) -> StoreResult<()> {
        let discovery = Discovery::new(self.client.clone()).run().await?;
        *self.discovery.write().await = discovery;
        Ok(())
    }

    /// Resolve an object's kind, refreshing discovery once on a miss
    async fn resolve(&self, object: &ObjectRef) -> StoreResult<(ApiResource, ApiCapabilities)> {
        let gvk = GroupVersionKind::gvk(object.group(), object.version(), &object.kind);

        if let Some(found) = self.discovery.read().await.resolve_gvk(&gvk) {
            return Ok(found);
        }

        debug!(api_version = %object.api_version, kind = %object.kind, "kind not in discovery cache, refreshing");
        self.refresh_discovery().await?;

        self.discovery
            .read()
            .await
            .resolve_gvk(&gvk)
            .ok_or_else(|| StoreError::KindNotRegistered {
                api_version: object.api_version.clone(),
                kind: object.kind.clone(),
            })
    }

    async fn api_for(&self, object: &ObjectRef) -> StoreResult<Api<DynamicObject>> {
        let (resource, capabilities) = self.resolve(object).await?;
        Ok(if capabilities.scope == Scope::Namespaced {
            let ns = object.namespace.as_deref().unwrap_or("default");
            Api::namespaced_with(self.client.clone(), ns, &resource)
        } else {
            Api::all_with(self.client.clone(), &resource)
        })
    }
}

#[async_trait]
impl ObjectStore for KubeObjectStore {
    async fn get(&self, object: &ObjectRef) -> StoreResult<Option<DynamicObject>> {
        let api = self.api_for(object).await?;
        Ok(api.get_opt(&object.name).await?)
    }

    async fn apply(
        &self,
        object: &ObjectRef,
        document: &Value,
        params: ApplyParams<'_>,
    ) -> StoreResult<ApplyOutcome> {
        let api = self.api_for(object).await?;

        let mut patch_params = PatchParams::apply(params.field_manager);
        if params.force {
            patch_params = patch_params.force();
        }

        let applied = api
            .patch(&object.name, &patch_params, &Patch::Apply(document))
            .await?;

        // kube::Client does not expose response headers, so API warnings
        // cannot be surfaced from this store.
        Ok(ApplyOutcome {
            object: applied,
            warnings: Vec::new(),
        })
    }

    async fn delete(&self, object: &ObjectRef, propagation: PropagationPolicy) -> StoreResult<()> {
        let api = self.api_for(object).await?;

        let params = DeleteParams {
            propagation_policy: Some(match propagation {
                PropagationPolicy::Background => kube::api::PropagationPolicy::Background,
                PropagationPolicy::Foreground => kube::api::PropagationPolicy::Foreground,
                PropagationPolicy::Orphan => kube::api::PropagationPolicy::Orphan,
            }),
            ..Default::default()
        };

        api.delete(&object.name, &params).await?;
        Ok(())
    }

    async fn remove_finalizers(&self, object: &ObjectRef) -> StoreResult<()> {
        let api = self.api_for(object).await?;
        let patch = json!({ "metadata": { "finalizers": null } });

        api.patch(&object.name, &PatchParams::default(), &Patch::Merge(&patch))
            .await?;
        Ok(())
    }

    async fn is_registered(&self, object: &ObjectRef) -> StoreResult<bool> {
        match self.resolve(object).await {
            Ok(_) => Ok(true),
            Err(StoreError::KindNotRegistered { .. }) => Ok(false),
            Err(e) => Err(e),
        }
    }
}
