//! Mock object store for testing
//!
//! Keeps objects in memory and emulates the parts of server-side apply the
//! engine depends on: per-manager field sets, conflicts between managers,
//! forced takeover, finalizers blocking deletion and custom kinds that only
//! become servable after a while. Arrays are treated as atomic fields.

use async_trait::async_trait;
use chrono::{DateTime, SecondsFormat, Utc};
use kube::api::DynamicObject;
use kubeward_core::{FieldPath, ObjectRef, Segment};
use serde_json::{Map, Value, json};
use std::collections::{BTreeMap, BTreeSet, VecDeque};
use std::sync::{Arc, PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};

use super::{
    ApiFailure, ApplyOutcome, ApplyParams, ObjectStore, PropagationPolicy, StoreError, StoreResult,
};
use crate::fields::{document_leaves, value_at};

/// Managed-field timestamps start here and advance one second per write
const EPOCH_SECONDS: i64 = 1_700_000_000;

/// Store calls that can be counted or made to fail
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum MockOp {
    Get,
    Apply,
    Delete,
    RemoveFinalizers,
    IsRegistered,
}

/// Counts of operations performed for testing assertions
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct OperationCounts {
    pub gets: usize,
    pub applies: usize,
    pub forced_applies: usize,
    pub deletes: usize,
    pub finalizer_removals: usize,
    pub registration_checks: usize,
}

#[derive(Debug, Clone)]
struct ManagerEntry {
    fields: BTreeSet<FieldPath>,
    time: i64,
}

#[derive(Debug, Clone)]
struct StoredObject {
    document: Value,
    managers: BTreeMap<String, ManagerEntry>,
    deleting: bool,
    uid: String,
    resource_version: u64,
}

#[derive(Debug, Clone)]
struct Replacement {
    manager: String,
    document: Value,
}

#[derive(Debug, Default)]
struct MockState {
    objects: BTreeMap<ObjectRef, StoredObject>,
    /// Custom kinds currently served, as (apiVersion, kind)
    registered: BTreeSet<(String, String)>,
    /// Custom kinds that start being served after this many failed applies
    pending_registration: BTreeMap<(String, String), u32>,
    failures: BTreeMap<MockOp, VecDeque<StoreError>>,
    immutable: Vec<FieldPath>,
    warnings: Vec<String>,
    replacements: BTreeMap<ObjectRef, Replacement>,
    corrupt_managed_fields: bool,
    clock: i64,
    next_uid: u64,
}

/// In-memory object store for testing
#[derive(Clone, Default)]
pub struct MockObjectStore {
    state: Arc<RwLock<MockState>>,
    /// Track operation counts for assertions
    operations: Arc<RwLock<OperationCounts>>,
}

impl MockObjectStore {
    /// Create a new empty mock store
    pub fn new() -> Self {
        Self::default()
    }

    fn read_state(&self) -> RwLockReadGuard<'_, MockState> {
        self.state.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write_state(&self) -> RwLockWriteGuard<'_, MockState> {
        self.state.write().unwrap_or_else(PoisonError::into_inner)
    }

    fn count(&self, op: MockOp, forced: bool) {
        let mut ops = self
            .operations
            .write()
            .unwrap_or_else(PoisonError::into_inner);
        match op {
            MockOp::Get => ops.gets += 1,
            MockOp::Apply => {
                ops.applies += 1;
                if forced {
                    ops.forced_applies += 1;
                }
            }
            MockOp::Delete => ops.deletes += 1,
            MockOp::RemoveFinalizers => ops.finalizer_removals += 1,
            MockOp::IsRegistered => ops.registration_checks += 1,
        }
    }

    /// Get operation counts for assertions
    pub fn operation_counts(&self) -> OperationCounts {
        self.operations
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Reset operation counts
    pub fn reset_counts(&self) {
        *self
            .operations
            .write()
            .unwrap_or_else(PoisonError::into_inner) = OperationCounts::default();
    }

    /// Serve a custom kind from now on
    pub fn register_kind(&self, api_version: &str, kind: &str) {
        let mut state = self.write_state();
        let key = (api_version.to_string(), kind.to_string());
        state.pending_registration.remove(&key);
        state.registered.insert(key);
    }

    /// Serve a custom kind once `failed_applies` applies have been rejected
    pub fn register_kind_after(&self, api_version: &str, kind: &str, failed_applies: u32) {
        self.write_state()
            .pending_registration
            .insert((api_version.to_string(), kind.to_string()), failed_applies);
    }

    /// Make the next call of `op` fail with `error`
    pub fn fail_next(&self, op: MockOp, error: StoreError) {
        self.write_state()
            .failures
            .entry(op)
            .or_default()
            .push_back(error);
    }

    /// Reject applies that change the value at `path` on an existing object
    pub fn immutable_field(&self, path: &str) -> StoreResult<()> {
        let path: FieldPath = path
            .parse()
            .map_err(|e: kubeward_core::CoreError| StoreError::InvalidObject(e.to_string()))?;
        self.write_state().immutable.push(path);
        Ok(())
    }

    /// Attach a warning to every successful apply response
    pub fn warn_on_apply(&self, warning: impl Into<String>) {
        self.write_state().warnings.push(warning.into());
    }

    /// Have another writer re-create `object` as soon as it is gone
    pub fn recreate_after_delete(&self, object: &ObjectRef, manager: &str, document: Value) {
        self.write_state().replacements.insert(
            object.clone(),
            Replacement {
                manager: manager.to_string(),
                document,
            },
        );
    }

    /// Apply as another field manager (not counted)
    pub fn apply_as(&self, manager: &str, document: &Value, force: bool) -> StoreResult<DynamicObject> {
        let object = ObjectRef::from_document(document)
            .map_err(|e| StoreError::InvalidObject(e.to_string()))?;
        let mut state = self.write_state();
        state.apply(&object, document, manager, force)?;
        state.render(&object)
    }

    /// Render unreadable `managedFields` until switched off again
    pub fn corrupt_managed_fields(&self, corrupt: bool) {
        self.write_state().corrupt_managed_fields = corrupt;
    }

    /// Set finalizers directly, bypassing field ownership
    pub fn set_finalizers(&self, object: &ObjectRef, finalizers: &[&str]) {
        let mut state = self.write_state();
        if let Some(stored) = state.objects.get_mut(object) {
            stored.document["metadata"]["finalizers"] = json!(finalizers);
        }
    }

    /// Overwrite an annotation directly, bypassing field ownership
    pub fn set_annotation(&self, object: &ObjectRef, key: &str, value: &str) {
        let mut state = self.write_state();
        if let Some(stored) = state.objects.get_mut(object) {
            stored.document["metadata"]["annotations"][key] = json!(value);
        }
    }

    /// Remove an object out-of-band
    pub fn remove(&self, object: &ObjectRef) {
        self.write_state().objects.remove(object);
    }

    /// Raw document of a stored object, without server-populated metadata
    pub fn document(&self, object: &ObjectRef) -> Option<Value> {
        self.read_state()
            .objects
            .get(object)
            .map(|s| s.document.clone())
    }

    pub fn contains(&self, object: &ObjectRef) -> bool {
        self.read_state().objects.contains_key(object)
    }

    /// Check if deletion was requested but is blocked by finalizers
    pub fn is_deleting(&self, object: &ObjectRef) -> bool {
        self.read_state()
            .objects
            .get(object)
            .is_some_and(|s| s.deleting)
    }

    /// Field managers with at least one field on the object
    pub fn managers(&self, object: &ObjectRef) -> Vec<String> {
        self.read_state()
            .objects
            .get(object)
            .map(|s| s.managers.keys().cloned().collect())
            .unwrap_or_default()
    }
}

impl MockState {
    fn injected_failure(&mut self, op: MockOp) -> StoreResult<()> {
        match self.failures.get_mut(&op).and_then(VecDeque::pop_front) {
            Some(error) => Err(error),
            None => Ok(()),
        }
    }

    /// Check if the kind is served; `consume` counts a rejected apply
    fn served(&mut self, object: &ObjectRef, consume: bool) -> bool {
        if !object.is_custom_kind() {
            return true;
        }
        let key = (object.api_version.clone(), object.kind.clone());
        if self.registered.contains(&key) {
            return true;
        }
        if consume {
            if let Some(remaining) = self.pending_registration.get_mut(&key) {
                if *remaining == 0 {
                    self.pending_registration.remove(&key);
                    self.registered.insert(key);
                    return true;
                }
                *remaining -= 1;
            }
        }
        false
    }

    fn tick(&mut self) -> i64 {
        self.clock += 1;
        self.clock
    }

    fn apply(
        &mut self,
        object: &ObjectRef,
        document: &Value,
        manager: &str,
        force: bool,
    ) -> StoreResult<()> {
        let applied = document_leaves(document);

        let mut conflicting = Vec::new();
        if let Some(stored) = self.objects.get(object) {
            check_immutable(&self.immutable, object, stored, document)?;

            conflicting = conflicts(stored, manager, &applied, document);
            if !conflicting.is_empty() && !force {
                return Err(StoreError::Api(conflict_failure(
                    &object.api_version,
                    &conflicting,
                )));
            }
        }

        let time = self.tick();
        let is_new = !self.objects.contains_key(object);
        if is_new {
            self.next_uid += 1;
        }
        let uid = format!("00000000-0000-0000-0000-{:012x}", self.next_uid);

        let stored = self.objects.entry(object.clone()).or_insert_with(|| StoredObject {
            document: skeleton(object),
            managers: BTreeMap::new(),
            deleting: false,
            uid,
            resource_version: 0,
        });

        // Forced fields move to this manager, agreeing managers keep co-ownership
        for (other, path) in &conflicting {
            if let Some(entry) = stored.managers.get_mut(other) {
                entry.fields.remove(path);
            }
        }

        let previously = stored
            .managers
            .get(manager)
            .map(|e| e.fields.clone())
            .unwrap_or_default();
        for dropped in previously.difference(&applied) {
            let shared = stored
                .managers
                .iter()
                .any(|(m, e)| m != manager && e.fields.iter().any(|q| q.overlaps(dropped)));
            if !shared {
                remove_at(&mut stored.document, dropped);
            }
        }

        for path in &applied {
            if let Some(value) = value_at(document, path) {
                set_at(&mut stored.document, path, value.clone());
            }
        }

        stored.managers.insert(
            manager.to_string(),
            ManagerEntry {
                fields: applied,
                time,
            },
        );
        stored.managers.retain(|_, e| !e.fields.is_empty());
        stored.resource_version += 1;
        Ok(())
    }

    /// Remove an object and let a queued replacement take its place
    fn finish_delete(&mut self, object: &ObjectRef) -> StoreResult<()> {
        self.objects.remove(object);
        if let Some(replacement) = self.replacements.remove(object) {
            self.apply(object, &replacement.document, &replacement.manager, true)?;
        }
        Ok(())
    }

    fn render(&self, object: &ObjectRef) -> StoreResult<DynamicObject> {
        let stored = self
            .objects
            .get(object)
            .ok_or_else(|| StoreError::Api(not_found(object)))?;

        let managed: Vec<Value> = stored
            .managers
            .iter()
            .map(|(manager, entry)| {
                json!({
                    "manager": manager,
                    "operation": "Apply",
                    "apiVersion": object.api_version,
                    "fieldsType": "FieldsV1",
                    "fieldsV1": if self.corrupt_managed_fields {
                        json!({"x:corrupt": {}})
                    } else {
                        fields_v1(&entry.fields)
                    },
                    "time": timestamp(entry.time),
                })
            })
            .collect();

        let mut document = stored.document.clone();
        let metadata = &mut document["metadata"];
        metadata["managedFields"] = Value::Array(managed);
        metadata["uid"] = json!(stored.uid);
        metadata["resourceVersion"] = json!(stored.resource_version.to_string());
        if stored.deleting {
            metadata["deletionTimestamp"] = json!(timestamp(self.clock));
        }

        serde_json::from_value(document).map_err(|e| StoreError::InvalidObject(e.to_string()))
    }
}

#[async_trait]
impl ObjectStore for MockObjectStore {
    async fn get(&self, object: &ObjectRef) -> StoreResult<Option<DynamicObject>> {
        self.count(MockOp::Get, false);
        let mut state = self.write_state();
        state.injected_failure(MockOp::Get)?;

        if !state.served(object, false) {
            return Err(not_registered(object));
        }
        if !state.objects.contains_key(object) {
            return Ok(None);
        }
        state.render(object).map(Some)
    }

    async fn apply(
        &self,
        object: &ObjectRef,
        document: &Value,
        params: ApplyParams<'_>,
    ) -> StoreResult<ApplyOutcome> {
        self.count(MockOp::Apply, params.force);
        let mut state = self.write_state();
        state.injected_failure(MockOp::Apply)?;

        if !state.served(object, true) {
            return Err(StoreError::Api(ApiFailure::new(
                404,
                "NotFound",
                "the server could not find the requested resource",
            )));
        }

        state.apply(object, document, params.field_manager, params.force)?;
        Ok(ApplyOutcome {
            object: state.render(object)?,
            warnings: state.warnings.clone(),
        })
    }

    async fn delete(&self, object: &ObjectRef, _propagation: PropagationPolicy) -> StoreResult<()> {
        self.count(MockOp::Delete, false);
        let mut state = self.write_state();
        state.injected_failure(MockOp::Delete)?;

        if !state.served(object, false) {
            return Err(not_registered(object));
        }
        let Some(stored) = state.objects.get_mut(object) else {
            return Err(StoreError::Api(not_found(object)));
        };

        let blocked = stored.document["metadata"]["finalizers"]
            .as_array()
            .is_some_and(|f| !f.is_empty());
        if blocked {
            stored.deleting = true;
            return Ok(());
        }
        state.finish_delete(object)
    }

    async fn remove_finalizers(&self, object: &ObjectRef) -> StoreResult<()> {
        self.count(MockOp::RemoveFinalizers, false);
        let mut state = self.write_state();
        state.injected_failure(MockOp::RemoveFinalizers)?;

        let Some(stored) = state.objects.get_mut(object) else {
            return Err(StoreError::Api(not_found(object)));
        };
        if let Some(metadata) = stored.document["metadata"].as_object_mut() {
            metadata.remove("finalizers");
        }
        for entry in stored.managers.values_mut() {
            entry
                .fields
                .retain(|p| !FieldPath::fields(["metadata", "finalizers"]).covers(p));
        }
        if stored.deleting {
            state.finish_delete(object)?;
        }
        Ok(())
    }

    async fn is_registered(&self, object: &ObjectRef) -> StoreResult<bool> {
        self.count(MockOp::IsRegistered, false);
        let mut state = self.write_state();
        state.injected_failure(MockOp::IsRegistered)?;
        Ok(state.served(object, false))
    }
}

fn not_found(object: &ObjectRef) -> ApiFailure {
    ApiFailure::new(
        404,
        "NotFound",
        format!("{}s \"{}\" not found", object.kind.to_lowercase(), object.name),
    )
}

fn not_registered(object: &ObjectRef) -> StoreError {
    StoreError::KindNotRegistered {
        api_version: object.api_version.clone(),
        kind: object.kind.clone(),
    }
}

fn skeleton(object: &ObjectRef) -> Value {
    let mut metadata = Map::new();
    metadata.insert("name".to_string(), json!(object.name));
    if let Some(ns) = &object.namespace {
        metadata.insert("namespace".to_string(), json!(ns));
    }
    json!({
        "apiVersion": object.api_version,
        "kind": object.kind,
        "metadata": metadata,
    })
}

/// Fields owned by other managers that this apply would change
fn conflicts(
    stored: &StoredObject,
    manager: &str,
    applied: &BTreeSet<FieldPath>,
    document: &Value,
) -> Vec<(String, FieldPath)> {
    let mut found = Vec::new();
    for (other, entry) in &stored.managers {
        if other == manager {
            continue;
        }
        for owned in &entry.fields {
            let Some(path) = applied.iter().find(|p| p.overlaps(owned)) else {
                continue;
            };
            let outer = if path.covers(owned) { path } else { owned };
            if value_at(&stored.document, outer) != value_at(document, outer) {
                found.push((other.clone(), owned.clone()));
            }
        }
    }
    found
}

fn conflict_failure(api_version: &str, conflicts: &[(String, FieldPath)]) -> ApiFailure {
    let noun = if conflicts.len() == 1 {
        "conflict"
    } else {
        "conflicts"
    };
    let details: Vec<String> = conflicts
        .iter()
        .map(|(manager, path)| format!("conflict with \"{}\" using {}: .{}", manager, api_version, path))
        .collect();

    ApiFailure::new(
        409,
        "Conflict",
        format!(
            "Apply failed with {} {}: {}",
            conflicts.len(),
            noun,
            details.join("\n")
        ),
    )
}

fn check_immutable(
    immutable: &[FieldPath],
    object: &ObjectRef,
    stored: &StoredObject,
    document: &Value,
) -> StoreResult<()> {
    for path in immutable {
        let (Some(current), Some(desired)) = (value_at(&stored.document, path), value_at(document, path))
        else {
            continue;
        };
        if current != desired {
            return Err(StoreError::Api(ApiFailure::new(
                422,
                "Invalid",
                format!(
                    "{} \"{}\" is invalid: {}: Invalid value: {}: field is immutable",
                    object.kind, object.name, path, desired
                ),
            )));
        }
    }
    Ok(())
}

fn set_at(document: &mut Value, path: &FieldPath, value: Value) {
    let Some((last, parents)) = path.segments().split_last() else {
        return;
    };

    let mut current = document;
    for segment in parents {
        let Segment::Field(name) = segment else {
            return;
        };
        if !current.get(name.as_str()).is_some_and(Value::is_object) {
            current[name.as_str()] = Value::Object(Map::new());
        }
        current = &mut current[name.as_str()];
    }
    if let Segment::Field(name) = last {
        current[name.as_str()] = value;
    }
}

fn remove_at(document: &mut Value, path: &FieldPath) {
    let Some((last, parents)) = path.segments().split_last() else {
        return;
    };

    let mut current = document;
    for segment in parents {
        let Segment::Field(name) = segment else {
            return;
        };
        match current.get_mut(name.as_str()) {
            Some(next) => current = next,
            None => return,
        }
    }
    if let (Segment::Field(name), Some(map)) = (last, current.as_object_mut()) {
        map.remove(name);
    }
}

fn fields_v1(paths: &BTreeSet<FieldPath>) -> Value {
    let mut root = Map::new();
    for path in paths {
        let mut node = &mut root;
        for segment in path.segments() {
            let entry = node
                .entry(fields_key(segment))
                .or_insert_with(|| Value::Object(Map::new()));
            let Value::Object(next) = entry else {
                break;
            };
            node = next;
        }
    }
    Value::Object(root)
}

fn fields_key(segment: &Segment) -> String {
    let literal = |raw: &str| {
        serde_json::from_str::<Value>(raw).unwrap_or_else(|_| Value::String(raw.to_string()))
    };

    match segment {
        Segment::Field(name) => format!("f:{}", name),
        Segment::Index(index) => format!("i:{}", index),
        Segment::Value(value) => format!("v:{}", literal(value)),
        Segment::Key(pairs) => {
            let selector: Map<String, Value> =
                pairs.iter().map(|(k, v)| (k.clone(), literal(v))).collect();
            format!("k:{}", Value::Object(selector))
        }
    }
}

fn timestamp(tick: i64) -> String {
    DateTime::<Utc>::from_timestamp(EPOCH_SECONDS + tick, 0)
        .unwrap_or_default()
        .to_rfc3339_opts(SecondsFormat::Secs, true)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fields::{owned_paths, ownership_map};

    fn configmap(data: Value) -> Value {
        json!({
            "apiVersion": "v1",
            "kind": "ConfigMap",
            "metadata": {"name": "cfg", "namespace": "default"},
            "data": data
        })
    }

    fn cfg_ref() -> ObjectRef {
        ObjectRef::new("v1", "ConfigMap", Some("default"), "cfg")
    }

    fn params(force: bool) -> ApplyParams<'static> {
        ApplyParams {
            field_manager: "kubeward",
            force,
        }
    }

    #[tokio::test]
    async fn test_apply_creates_and_tracks_fields() {
        let store = MockObjectStore::new();
        let outcome = store
            .apply(&cfg_ref(), &configmap(json!({"a": "1", "b": "2"})), params(false))
            .await
            .unwrap();

        let owned = owned_paths(&outcome.object, "kubeward").unwrap();
        assert!(owned.contains(&FieldPath::fields(["data", "a"])));
        assert!(owned.contains(&FieldPath::fields(["data", "b"])));
        assert!(!owned.contains(&FieldPath::fields(["metadata", "name"])));

        let fetched = store.get(&cfg_ref()).await.unwrap().unwrap();
        assert_eq!(fetched.data["data"]["a"], "1");
        assert_eq!(store.operation_counts().applies, 1);
        assert_eq!(store.operation_counts().gets, 1);
    }

    #[tokio::test]
    async fn test_conflict_without_force() {
        let store = MockObjectStore::new();
        store
            .apply(&cfg_ref(), &configmap(json!({"a": "1"})), params(false))
            .await
            .unwrap();
        store
            .apply_as("kubectl", &configmap(json!({"a": "other"})), true)
            .unwrap();

        let err = store
            .apply(&cfg_ref(), &configmap(json!({"a": "1"})), params(false))
            .await
            .unwrap_err();
        match err {
            StoreError::Api(failure) => {
                assert_eq!(failure.code, 409);
                assert!(failure.message.contains("conflict with \"kubectl\""));
            }
            other => panic!("unexpected {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_same_value_is_not_a_conflict() {
        let store = MockObjectStore::new();
        store
            .apply_as("kubectl", &configmap(json!({"a": "1"})), false)
            .unwrap();
        let outcome = store
            .apply(&cfg_ref(), &configmap(json!({"a": "1"})), params(false))
            .await
            .unwrap();

        let owned = owned_paths(&outcome.object, "kubeward").unwrap();
        assert!(owned.contains(&FieldPath::fields(["data", "a"])));
    }

    #[tokio::test]
    async fn test_forced_apply_takes_ownership() {
        let store = MockObjectStore::new();
        store
            .apply(&cfg_ref(), &configmap(json!({"a": "1", "b": "2"})), params(false))
            .await
            .unwrap();
        let taken = store
            .apply_as("kubectl", &configmap(json!({"b": "external"})), true)
            .unwrap();

        let owners = ownership_map(&taken).unwrap();
        assert_eq!(owners.owner("data.a"), Some("kubeward"));
        assert_eq!(owners.owner("data.b"), Some("kubectl"));
        assert_eq!(taken.data["data"]["b"], "external");

        let outcome = store
            .apply(&cfg_ref(), &configmap(json!({"a": "1", "b": "2"})), params(true))
            .await
            .unwrap();
        let owners = ownership_map(&outcome.object).unwrap();
        assert_eq!(owners.owner("data.b"), Some("kubeward"));
        assert_eq!(store.managers(&cfg_ref()), vec!["kubeward".to_string()]);
        assert_eq!(store.operation_counts().forced_applies, 1);
    }

    #[tokio::test]
    async fn test_dropped_fields_are_removed() {
        let store = MockObjectStore::new();
        store
            .apply(&cfg_ref(), &configmap(json!({"a": "1", "b": "2"})), params(false))
            .await
            .unwrap();
        store
            .apply(&cfg_ref(), &configmap(json!({"a": "1"})), params(false))
            .await
            .unwrap();

        let doc = store.document(&cfg_ref()).unwrap();
        assert_eq!(doc["data"], json!({"a": "1"}));
    }

    #[tokio::test]
    async fn test_finalizers_block_delete() {
        let store = MockObjectStore::new();
        store
            .apply(&cfg_ref(), &configmap(json!({"a": "1"})), params(false))
            .await
            .unwrap();
        store.set_finalizers(&cfg_ref(), &["example.com/cleanup"]);

        store
            .delete(&cfg_ref(), PropagationPolicy::Background)
            .await
            .unwrap();
        assert!(store.is_deleting(&cfg_ref()));

        let live = store.get(&cfg_ref()).await.unwrap().unwrap();
        assert!(live.metadata.deletion_timestamp.is_some());

        store.remove_finalizers(&cfg_ref()).await.unwrap();
        assert!(!store.contains(&cfg_ref()));
    }

    #[tokio::test]
    async fn test_delete_missing_is_not_found() {
        let store = MockObjectStore::new();
        let err = store
            .delete(&cfg_ref(), PropagationPolicy::Background)
            .await
            .unwrap_err();
        assert!(matches!(err, StoreError::Api(ref f) if f.code == 404));
    }

    #[tokio::test]
    async fn test_custom_kind_registration_delay() {
        let store = MockObjectStore::new();
        let widget = ObjectRef::new("example.com/v1", "Widget", Some("default"), "w");
        let doc = json!({
            "apiVersion": "example.com/v1",
            "kind": "Widget",
            "metadata": {"name": "w", "namespace": "default"},
            "spec": {"size": 3}
        });
        store.register_kind_after("example.com/v1", "Widget", 2);

        for _ in 0..2 {
            let err = store.apply(&widget, &doc, params(false)).await.unwrap_err();
            assert!(matches!(err, StoreError::Api(ref f) if f.code == 404));
        }
        assert!(store.apply(&widget, &doc, params(false)).await.is_ok());
        assert!(store.is_registered(&widget).await.unwrap());
    }

    #[tokio::test]
    async fn test_unregistered_kind_get() {
        let store = MockObjectStore::new();
        let widget = ObjectRef::new("example.com/v1", "Widget", None, "w");
        assert!(matches!(
            store.get(&widget).await,
            Err(StoreError::KindNotRegistered { .. })
        ));
        assert!(!store.is_registered(&widget).await.unwrap());
    }

    #[tokio::test]
    async fn test_failure_injection() {
        let store = MockObjectStore::new();
        store.fail_next(
            MockOp::Get,
            StoreError::Api(ApiFailure::new(403, "Forbidden", "forbidden")),
        );

        assert!(store.get(&cfg_ref()).await.is_err());
        assert!(store.get(&cfg_ref()).await.unwrap().is_none());
        assert_eq!(store.operation_counts().gets, 2);

        store.reset_counts();
        assert_eq!(store.operation_counts(), OperationCounts::default());
    }

    #[tokio::test]
    async fn test_immutable_field() {
        let store = MockObjectStore::new();
        store.immutable_field("data.a").unwrap();
        store
            .apply(&cfg_ref(), &configmap(json!({"a": "1"})), params(false))
            .await
            .unwrap();

        let err = store
            .apply(&cfg_ref(), &configmap(json!({"a": "2"})), params(false))
            .await
            .unwrap_err();
        match err {
            StoreError::Api(failure) => {
                assert_eq!(failure.code, 422);
                assert!(failure.message.contains("data.a: Invalid value"));
                assert!(failure.message.contains("field is immutable"));
            }
            other => panic!("unexpected {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_recreate_after_delete() {
        let store = MockObjectStore::new();
        store
            .apply(&cfg_ref(), &configmap(json!({"a": "1"})), params(false))
            .await
            .unwrap();
        store.recreate_after_delete(&cfg_ref(), "other", configmap(json!({"a": "new"})));

        store
            .delete(&cfg_ref(), PropagationPolicy::Background)
            .await
            .unwrap();

        assert!(store.contains(&cfg_ref()));
        assert_eq!(store.managers(&cfg_ref()), vec!["other".to_string()]);
    }

    #[tokio::test]
    async fn test_apply_warnings() {
        let store = MockObjectStore::new();
        store.warn_on_apply("unknown field \"data.x\"");
        let outcome = store
            .apply(&cfg_ref(), &configmap(json!({"a": "1"})), params(false))
            .await
            .unwrap();
        assert_eq!(outcome.warnings, vec!["unknown field \"data.x\"".to_string()]);
    }
}
