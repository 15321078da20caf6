//! Mock record store for testing
//!
//! Keeps records in memory, useful for unit tests without a state directory.

use async_trait::async_trait;
use kubeward_core::{ObjectRef, ResourceRecord};
use std::collections::BTreeMap;
use std::sync::{Arc, PoisonError, RwLock};

use super::{RecordStore, not_found};
use crate::error::Result;

/// In-memory record store for testing
#[derive(Clone, Default)]
pub struct MockRecordStore {
    records: Arc<RwLock<BTreeMap<ObjectRef, ResourceRecord>>>,
    /// Track operation counts for assertions
    operations: Arc<RwLock<RecordCounts>>,
}

/// Counts of operations performed for testing assertions
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct RecordCounts {
    pub gets: usize,
    pub lists: usize,
    pub saves: usize,
    pub deletes: usize,
}

impl MockRecordStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Create with pre-populated records
    pub fn with_records(records: impl IntoIterator<Item = ResourceRecord>) -> Self {
        let store = Self::new();
        {
            let mut map = store.records.write().unwrap_or_else(PoisonError::into_inner);
            for record in records {
                map.insert(record.object.clone(), record);
            }
        }
        store
    }

    pub fn operation_counts(&self) -> RecordCounts {
        self.operations
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    pub fn record_count(&self) -> usize {
        self.records
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    fn count(&self, update: impl FnOnce(&mut RecordCounts)) {
        update(&mut self.operations.write().unwrap_or_else(PoisonError::into_inner));
    }
}

#[async_trait]
impl RecordStore for MockRecordStore {
    async fn get(&self, object: &ObjectRef) -> Result<ResourceRecord> {
        self.count(|c| c.gets += 1);
        self.records
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(object)
            .cloned()
            .ok_or_else(|| not_found(object))
    }

    async fn list(&self) -> Result<Vec<ResourceRecord>> {
        self.count(|c| c.lists += 1);
        Ok(self
            .records
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .values()
            .cloned()
            .collect())
    }

    async fn save(&self, record: &ResourceRecord) -> Result<()> {
        self.count(|c| c.saves += 1);
        self.records
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(record.object.clone(), record.clone());
        Ok(())
    }

    async fn delete(&self, object: &ObjectRef) -> Result<ResourceRecord> {
        self.count(|c| c.deletes += 1);
        self.records
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(object)
            .ok_or_else(|| not_found(object))
    }
}
