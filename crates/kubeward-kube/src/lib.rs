//! Kubeward Kube - field-ownership aware reconciliation against Kubernetes
//!
//! This crate provides:
//! - **Object Stores**: Server-side apply, get and delete through kube-rs, or an in-memory emulation
//! - **Apply Engine**: Forced reclaim of conflicting fields and retries while a custom kind registers
//! - **Projection Engine**: The fields this tool owns, read from `managedFields`
//! - **Ownership Tracking**: Which managed fields other writers have taken since the last apply
//! - **Lifecycle**: Create, read, update, delete and adopt with classified diagnostics
//! - **Record Stores**: Persisted records with diffable and private halves
//! - **Drift Reports**: Field-level changes between two states of an object

pub mod apply;
pub mod classify;
pub mod client;
pub mod config;
pub mod diff;
pub mod error;
pub mod fields;
pub mod finalizers;
pub mod lifecycle;
pub mod ownership;
pub mod projection;
pub mod recovery;
pub mod retry;
pub mod storage;
pub mod store;

pub use apply::{ApplyEngine, ApplyReport, Claim};
pub use classify::{Diagnostic, ErrorKind, Operation, Severity, classify};
pub use client::{KubewardClient, ObjectResult};
pub use config::{DeleteTimeouts, EngineConfig};
pub use diff::{ChangeType, DiffEngine, DriftReport, FieldChange};
pub use error::{KubeError, Result};
pub use lifecycle::{LifecycleState, ObjectOptions, ObjectRequest, Outcome, Reconciler};
pub use ownership::OwnershipTracker;
pub use projection::{ProjectionError, Snapshot, compute_snapshot, planned_projection};
pub use retry::RetryPolicy;
pub use storage::{FileRecordStore, MockRecordStore, RecordStore};
pub use store::{
    ApplyParams, KubeObjectStore, MockObjectStore, ObjectStore, PropagationPolicy, StoreError,
};
