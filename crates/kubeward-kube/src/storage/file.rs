//! File-based record store
//!
//! Layout under the state directory:
//!
//! ```text
//! <state-dir>/<namespace or _cluster>/<kind>.<group or core>/<name>.json
//! ```

use async_trait::async_trait;
use kubeward_core::{ObjectRef, ResourceRecord};
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

use super::{RecordStore, deserialize_record, not_found, serialize_record};
use crate::error::Result;

const CLUSTER_SCOPE_DIR: &str = "_cluster";

/// Stores one JSON file per object
pub struct FileRecordStore {
    base_dir: PathBuf,
}

impl FileRecordStore {
    /// Create a store, creating the state directory if needed
    pub fn new(base_dir: impl Into<PathBuf>) -> Result<Self> {
        let base_dir = base_dir.into();
        std::fs::create_dir_all(&base_dir)?;
        Ok(Self { base_dir })
    }

    pub fn base_dir(&self) -> &Path {
        &self.base_dir
    }

    /// Get the path for a record file
    fn record_path(&self, object: &ObjectRef) -> PathBuf {
        let scope = object.namespace.as_deref().unwrap_or(CLUSTER_SCOPE_DIR);
        let group = match object.group() {
            "" => "core",
            group => group,
        };
        self.base_dir
            .join(scope)
            .join(format!("{}.{}", object.kind.to_lowercase(), group))
            .join(format!("{}.json", object.name))
    }

    fn read_record(&self, path: &Path) -> Result<ResourceRecord> {
        let data = std::fs::read(path)?;
        deserialize_record(&data)
    }

    /// Remove `dir` and its parent when they became empty
    fn prune(&self, mut dir: Option<&Path>) {
        for _ in 0..2 {
            let Some(current) = dir else { return };
            if current == self.base_dir {
                return;
            }
            let empty = std::fs::read_dir(current).is_ok_and(|mut d| d.next().is_none());
            if !empty || std::fs::remove_dir(current).is_err() {
                return;
            }
            dir = current.parent();
        }
    }
}

#[async_trait]
impl RecordStore for FileRecordStore {
    async fn get(&self, object: &ObjectRef) -> Result<ResourceRecord> {
        let path = self.record_path(object);
        if !path.exists() {
            return Err(not_found(object));
        }
        self.read_record(&path)
    }

    async fn list(&self) -> Result<Vec<ResourceRecord>> {
        let mut records = Vec::new();

        let dirs = |path: &Path| -> Result<Vec<PathBuf>> {
            Ok(std::fs::read_dir(path)?
                .filter_map(|e| e.ok())
                .map(|e| e.path())
                .filter(|p| p.is_dir())
                .collect())
        };

        for scope in dirs(&self.base_dir)? {
            for kind in dirs(&scope)? {
                let files = std::fs::read_dir(&kind)?
                    .filter_map(|e| e.ok())
                    .map(|e| e.path())
                    .filter(|p| p.extension().is_some_and(|e| e == "json"));

                for file in files {
                    match self.read_record(&file) {
                        Ok(record) => records.push(record),
                        Err(e) => warn!(path = %file.display(), error = %e, "Skipping unreadable record"),
                    }
                }
            }
        }

        records.sort_by_key(|r| r.object.to_string());
        Ok(records)
    }

    async fn save(&self, record: &ResourceRecord) -> Result<()> {
        let path = self.record_path(&record.object);
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        // Write then rename so a crash never leaves a truncated record
        let tmp = path.with_extension("json.tmp");
        std::fs::write(&tmp, serialize_record(record)?)?;
        std::fs::rename(&tmp, &path)?;

        debug!(object = %record.object, path = %path.display(), "Saved record");
        Ok(())
    }

    async fn delete(&self, object: &ObjectRef) -> Result<ResourceRecord> {
        let path = self.record_path(object);
        let record = self.get(object).await?;

        std::fs::remove_file(&path)?;
        self.prune(path.parent());

        Ok(record)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::KubeError;
    use kubeward_core::IdentityMarker;
    use tempfile::TempDir;

    fn record(kind: &str, namespace: Option<&str>, name: &str) -> ResourceRecord {
        let api_version = if kind == "Deployment" { "apps/v1" } else { "v1" };
        let mut record = ResourceRecord::new(
            ObjectRef::new(api_version, kind, namespace, name),
            IdentityMarker::generate(),
        );
        record.state.projection = [("data.a".to_string(), "\"1\"".to_string())]
            .into_iter()
            .collect();
        record
            .private
            .ownership_at_last_apply
            .insert("data.a", "kubeward");
        record
    }

    #[tokio::test]
    async fn test_save_and_get() {
        let tmp = TempDir::new().unwrap();
        let store = FileRecordStore::new(tmp.path()).unwrap();

        let saved = record("ConfigMap", Some("default"), "cfg");
        store.save(&saved).await.unwrap();

        assert!(tmp.path().join("default/configmap.core/cfg.json").exists());
        let loaded = store.get(&saved.object).await.unwrap();
        assert!(loaded.same_state(&saved));
        assert_eq!(loaded.private, saved.private);
    }

    #[tokio::test]
    async fn test_save_replaces() {
        let tmp = TempDir::new().unwrap();
        let store = FileRecordStore::new(tmp.path()).unwrap();

        let mut saved = record("ConfigMap", Some("default"), "cfg");
        store.save(&saved).await.unwrap();
        saved.private.projection_pending = true;
        store.save(&saved).await.unwrap();

        let loaded = store.get(&saved.object).await.unwrap();
        assert!(loaded.private.projection_pending);
        assert_eq!(store.list().await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_list_across_scopes() {
        let tmp = TempDir::new().unwrap();
        let store = FileRecordStore::new(tmp.path()).unwrap();

        store.save(&record("ConfigMap", Some("default"), "b")).await.unwrap();
        store.save(&record("Deployment", Some("apps"), "web")).await.unwrap();
        store.save(&record("Namespace", None, "apps")).await.unwrap();
        std::fs::write(tmp.path().join("default/configmap.core/junk.json"), "{").unwrap();

        let records = store.list().await.unwrap();
        let names: Vec<String> = records.iter().map(|r| r.object.to_string()).collect();
        assert_eq!(names.len(), 3);
        assert!(tmp.path().join("_cluster/namespace.core/apps.json").exists());
        assert!(tmp.path().join("apps/deployment.apps/web.json").exists());
    }

    #[tokio::test]
    async fn test_delete() {
        let tmp = TempDir::new().unwrap();
        let store = FileRecordStore::new(tmp.path()).unwrap();

        let saved = record("ConfigMap", Some("default"), "cfg");
        store.save(&saved).await.unwrap();
        store.delete(&saved.object).await.unwrap();

        assert!(!store.exists(&saved.object).await.unwrap());
        assert!(matches!(
            store.get(&saved.object).await,
            Err(KubeError::RecordNotFound { .. })
        ));
        // Empty directories are cleaned up
        assert!(!tmp.path().join("default").exists());
        assert!(tmp.path().exists());
    }
}
