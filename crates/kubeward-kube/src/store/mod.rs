//! Object store protocol
//!
//! The engine talks to the cluster through the [`ObjectStore`] trait:
//! - **KubeObjectStore**: a real API server through `kube::Client`
//! - **MockObjectStore**: in-memory store emulating server-side apply, for tests
//!
//! Failures are returned as [`StoreError`] and classified by
//! [`crate::classify`]; API warnings travel separately in [`ApplyOutcome`].

mod kube_store;
mod mock;

pub use kube_store::KubeObjectStore;
pub use mock::{MockObjectStore, MockOp, OperationCounts};

use async_trait::async_trait;
use kube::api::DynamicObject;
use kubeward_core::ObjectRef;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;
use thiserror::Error;

/// Result type for object store calls
pub type StoreResult<T> = std::result::Result<T, StoreError>;

/// Status returned by the API server for a failed request
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ApiFailure {
    /// HTTP status code
    pub code: u16,
    /// Machine-readable reason (`NotFound`, `Conflict`, `Invalid`, ...)
    pub reason: String,
    /// Human-readable message
    pub message: String,
}

impl ApiFailure {
    pub fn new(code: u16, reason: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            code,
            reason: reason.into(),
            message: message.into(),
        }
    }
}

impl fmt::Display for ApiFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({}): {}", self.reason, self.code, self.message)
    }
}

/// Failure of an object store call
#[derive(Debug, Clone, Error)]
#[non_exhaustive]
pub enum StoreError {
    /// The API server rejected the request
    #[error("{0}")]
    Api(ApiFailure),

    /// Discovery does not (yet) know the kind
    #[error("no matches for kind \"{kind}\" in version \"{api_version}\"")]
    KindNotRegistered { api_version: String, kind: String },

    /// Connection or protocol failure
    #[error("transport error: {0}")]
    Transport(String),

    /// The store returned something that is not a valid object
    #[error("invalid object: {0}")]
    InvalidObject(String),
}

impl From<kube::Error> for StoreError {
    fn from(e: kube::Error) -> Self {
        match e {
            kube::Error::Api(resp) => StoreError::Api(ApiFailure {
                code: resp.code,
                reason: resp.reason,
                message: resp.message,
            }),
            kube::Error::SerdeError(e) => StoreError::InvalidObject(e.to_string()),
            other => StoreError::Transport(other.to_string()),
        }
    }
}

/// Parameters of a server-side apply request
#[derive(Debug, Clone, Copy)]
pub struct ApplyParams<'a> {
    /// Field manager the applied fields are attributed to
    pub field_manager: &'a str,
    /// Take ownership of fields owned by other managers
    pub force: bool,
}

/// Result of a successful apply
#[derive(Debug, Clone)]
pub struct ApplyOutcome {
    /// Object as returned by the server
    pub object: DynamicObject,
    /// Warnings the server attached to the response
    pub warnings: Vec<String>,
}

/// What happens to dependents when an object is deleted
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PropagationPolicy {
    #[default]
    Background,
    Foreground,
    Orphan,
}

impl fmt::Display for PropagationPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PropagationPolicy::Background => write!(f, "background"),
            PropagationPolicy::Foreground => write!(f, "foreground"),
            PropagationPolicy::Orphan => write!(f, "orphan"),
        }
    }
}

/// Object store the engine reconciles against
///
/// Implementations must be Send + Sync for use across async tasks.
#[async_trait]
pub trait ObjectStore: Send + Sync {
    /// Fetch an object, `None` if it does not exist
    async fn get(&self, object: &ObjectRef) -> StoreResult<Option<DynamicObject>>;

    /// Server-side apply `document` as the configured field manager
    async fn apply(
        &self,
        object: &ObjectRef,
        document: &Value,
        params: ApplyParams<'_>,
    ) -> StoreResult<ApplyOutcome>;

    /// Request deletion of an object
    async fn delete(&self, object: &ObjectRef, propagation: PropagationPolicy) -> StoreResult<()>;

    /// Clear `metadata.finalizers` so a pending deletion can complete
    async fn remove_finalizers(&self, object: &ObjectRef) -> StoreResult<()>;

    /// Check if the object's kind is currently served
    async fn is_registered(&self, object: &ObjectRef) -> StoreResult<bool>;
}

/// Convert a live object into a plain document
pub fn to_document(object: &DynamicObject) -> StoreResult<Value> {
    serde_json::to_value(object).map_err(|e| StoreError::InvalidObject(e.to_string()))
}

/// Read an annotation from a live object
pub fn live_annotation<'a>(object: &'a DynamicObject, annotation: &str) -> Option<&'a str> {
    object
        .metadata
        .annotations
        .as_ref()
        .and_then(|a| a.get(annotation))
        .map(String::as_str)
}

/// Finalizers still set on a live object
pub fn live_finalizers(object: &DynamicObject) -> Vec<String> {
    object.metadata.finalizers.clone().unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;
    use kube::core::ErrorResponse;

    #[test]
    fn test_kube_api_error_conversion() {
        let err = kube::Error::Api(ErrorResponse {
            status: "Failure".to_string(),
            message: "configmaps \"x\" not found".to_string(),
            reason: "NotFound".to_string(),
            code: 404,
        });

        match StoreError::from(err) {
            StoreError::Api(failure) => {
                assert_eq!(failure.code, 404);
                assert_eq!(failure.reason, "NotFound");
            }
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn test_api_failure_display() {
        let failure = ApiFailure::new(409, "Conflict", "Apply failed with 1 conflict");
        assert_eq!(failure.to_string(), "Conflict (409): Apply failed with 1 conflict");
    }

    #[test]
    fn test_propagation_policy_serde() {
        let policy: PropagationPolicy = serde_json::from_str("\"foreground\"").unwrap();
        assert_eq!(policy, PropagationPolicy::Foreground);
        assert_eq!(PropagationPolicy::default().to_string(), "background");
    }
}
