//! Record stores for persisting [`ResourceRecord`]s between runs
//!
//! - **File**: one JSON document per object under a state directory
//! - **Mock**: in memory, for tests
//!
//! A persisted record keeps its comparable state and its private state in
//! separate sections of the same document, so tools diffing the `state`
//! section never see the bookkeeping.

mod file;
mod mock;

pub use file::FileRecordStore;
pub use mock::{MockRecordStore, RecordCounts};

use async_trait::async_trait;
use kubeward_core::{ObjectRef, ResourceRecord};

use crate::error::{KubeError, Result};

/// Persistence for resource records
///
/// Implementations must be Send + Sync for use across async tasks.
#[async_trait]
pub trait RecordStore: Send + Sync {
    /// Get the record of an object
    async fn get(&self, object: &ObjectRef) -> Result<ResourceRecord>;

    /// List every stored record
    async fn list(&self) -> Result<Vec<ResourceRecord>>;

    /// Create or replace a record
    async fn save(&self, record: &ResourceRecord) -> Result<()>;

    /// Delete a record, returning it
    async fn delete(&self, object: &ObjectRef) -> Result<ResourceRecord>;

    /// Check if a record exists
    async fn exists(&self, object: &ObjectRef) -> Result<bool> {
        match self.get(object).await {
            Ok(_) => Ok(true),
            Err(KubeError::RecordNotFound { .. }) => Ok(false),
            Err(e) => Err(e),
        }
    }
}

/// Serialize a record to pretty JSON
pub fn serialize_record(record: &ResourceRecord) -> Result<Vec<u8>> {
    Ok(serde_json::to_vec_pretty(record)?)
}

/// Deserialize a record from JSON
pub fn deserialize_record(data: &[u8]) -> Result<ResourceRecord> {
    Ok(serde_json::from_slice(data)?)
}

pub(crate) fn not_found(object: &ObjectRef) -> KubeError {
    KubeError::RecordNotFound {
        object: object.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use kubeward_core::IdentityMarker;

    #[test]
    fn test_sections_are_separate() {
        let mut record = ResourceRecord::new(
            ObjectRef::new("v1", "ConfigMap", Some("default"), "cfg"),
            IdentityMarker::from("abc"),
        );
        record.private.projection_pending = true;

        let value: serde_json::Value =
            serde_json::from_slice(&serialize_record(&record).unwrap()).unwrap();
        assert_eq!(value["state"]["identity"], "abc");
        assert!(value["state"].get("projectionPending").is_none());
        assert_eq!(value["private"]["projectionPending"], true);

        let back = deserialize_record(&serialize_record(&record).unwrap()).unwrap();
        assert!(back.same_state(&record));
        assert!(back.private.projection_pending);
    }
}
