//! Kubeward Core - data model for field-ownership aware reconciliation
//!
//! This crate provides the types shared by the engine and its callers:
//! - `FieldPath`: Addressing fields inside object documents
//! - `ManagedObject`: A desired document plus its store coordinates
//! - `Projection`: Canonical flat view of the fields the tool owns
//! - `FieldOwnershipMap`: Per-field owner snapshots
//! - `IgnoreSet`: Paths the tool never claims
//! - `ResourceRecord`: Persisted state, split into diffable and private halves

pub mod error;
pub mod ignore;
pub mod object;
pub mod ownership;
pub mod path;
pub mod projection;
pub mod record;

pub use error::{CoreError, Result};
pub use ignore::{IgnoreSet, matches_key};
pub use object::{IdentityMarker, ManagedObject, ObjectRef, annotation_path, read_annotation};
pub use ownership::{FieldOwnershipMap, OwnershipTransition};
pub use path::{FieldPath, Segment};
pub use projection::{Projection, canonical_value};
pub use record::{ComparableState, PrivateState, ResourceRecord};
