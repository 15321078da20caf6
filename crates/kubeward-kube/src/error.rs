//! Error types for kubeward-kube
//!
//! Reconciliation itself never returns these: lifecycle operations report
//! classified [`Diagnostic`](crate::classify::Diagnostic)s instead. `KubeError`
//! covers the plumbing around them (connecting, configuration, record storage).

use thiserror::Error;

use crate::store::StoreError;

/// Result type for kubeward-kube operations
pub type Result<T> = std::result::Result<T, KubeError>;

/// Errors that can occur outside of a reconciliation
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum KubeError {
    /// Kubernetes API error
    #[error("Kubernetes API error: {0}")]
    Api(#[from] kube::Error),

    /// Object store error
    #[error(transparent)]
    Store(#[from] StoreError),

    /// Invalid document, path or record
    #[error(transparent)]
    Core(#[from] kubeward_core::CoreError),

    /// Record not found in the record store
    #[error("no record for {object}")]
    RecordNotFound { object: String },

    /// Invalid configuration
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    /// Serialization error
    #[error("serialization error: {0}")]
    Serialization(String),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl From<serde_json::Error> for KubeError {
    fn from(e: serde_json::Error) -> Self {
        KubeError::Serialization(e.to_string())
    }
}

impl From<serde_yaml::Error> for KubeError {
    fn from(e: serde_yaml::Error) -> Self {
        KubeError::Serialization(e.to_string())
    }
}

impl KubeError {
    /// Check if this is a Kubernetes 404 Not Found error
    pub fn is_not_found(&self) -> bool {
        match self {
            KubeError::Api(kube::Error::Api(resp)) => resp.code == 404,
            KubeError::Store(StoreError::Api(failure)) => failure.code == 404,
            KubeError::RecordNotFound { .. } => true,
            _ => false,
        }
    }
}
