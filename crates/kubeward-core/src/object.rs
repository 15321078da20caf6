//! Managed object documents and their identity

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::fmt;

use crate::error::{CoreError, Result};
use crate::path::FieldPath;

/// API groups served by Kubernetes itself
///
/// Anything outside this list is treated as a custom (CRD-backed) type whose
/// registration may still be propagating.
const BUILTIN_GROUPS: &[&str] = &[
    "",
    "apps",
    "batch",
    "autoscaling",
    "policy",
    "networking.k8s.io",
    "rbac.authorization.k8s.io",
    "storage.k8s.io",
    "admissionregistration.k8s.io",
    "apiextensions.k8s.io",
    "apiregistration.k8s.io",
    "certificates.k8s.io",
    "coordination.k8s.io",
    "discovery.k8s.io",
    "events.k8s.io",
    "flowcontrol.apiserver.k8s.io",
    "node.k8s.io",
    "scheduling.k8s.io",
    "resource.k8s.io",
];

/// Built-in kinds that are not namespaced, as (group, kind)
///
/// Custom kinds cannot be told apart without discovery and are assumed to
/// be namespaced.
const CLUSTER_SCOPED_KINDS: &[(&str, &str)] = &[
    ("", "Namespace"),
    ("", "Node"),
    ("", "PersistentVolume"),
    ("", "ComponentStatus"),
    ("rbac.authorization.k8s.io", "ClusterRole"),
    ("rbac.authorization.k8s.io", "ClusterRoleBinding"),
    ("storage.k8s.io", "StorageClass"),
    ("storage.k8s.io", "CSIDriver"),
    ("storage.k8s.io", "CSINode"),
    ("storage.k8s.io", "VolumeAttachment"),
    ("admissionregistration.k8s.io", "MutatingWebhookConfiguration"),
    ("admissionregistration.k8s.io", "ValidatingWebhookConfiguration"),
    ("admissionregistration.k8s.io", "ValidatingAdmissionPolicy"),
    ("admissionregistration.k8s.io", "ValidatingAdmissionPolicyBinding"),
    ("apiextensions.k8s.io", "CustomResourceDefinition"),
    ("apiregistration.k8s.io", "APIService"),
    ("certificates.k8s.io", "CertificateSigningRequest"),
    ("flowcontrol.apiserver.k8s.io", "FlowSchema"),
    ("flowcontrol.apiserver.k8s.io", "PriorityLevelConfiguration"),
    ("networking.k8s.io", "IngressClass"),
    ("node.k8s.io", "RuntimeClass"),
    ("scheduling.k8s.io", "PriorityClass"),
];

/// Coordinates of an object in the store
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ObjectRef {
    pub api_version: String,
    pub kind: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub namespace: Option<String>,
    pub name: String,
}

impl ObjectRef {
    pub fn new(
        api_version: impl Into<String>,
        kind: impl Into<String>,
        namespace: Option<&str>,
        name: impl Into<String>,
    ) -> Self {
        Self {
            api_version: api_version.into(),
            kind: kind.into(),
            namespace: namespace.map(str::to_string),
            name: name.into(),
        }
    }

    /// Read coordinates from a document
    pub fn from_document(document: &Value) -> Result<Self> {
        let text = |pointer: &str| document.pointer(pointer).and_then(Value::as_str);

        let api_version = text("/apiVersion").ok_or_else(|| CoreError::MissingField {
            field: "apiVersion".to_string(),
        })?;
        let kind = text("/kind").ok_or_else(|| CoreError::MissingField {
            field: "kind".to_string(),
        })?;
        let name = text("/metadata/name")
            .filter(|n| !n.is_empty())
            .ok_or_else(|| CoreError::MissingField {
                field: "metadata.name".to_string(),
            })?;

        Ok(Self::new(
            api_version,
            kind,
            text("/metadata/namespace").filter(|n| !n.is_empty()),
            name,
        ))
    }

    /// API group ("" for the core group)
    pub fn group(&self) -> &str {
        self.api_version
            .rsplit_once('/')
            .map(|(g, _)| g)
            .unwrap_or("")
    }

    /// API version without the group
    pub fn version(&self) -> &str {
        self.api_version
            .rsplit_once('/')
            .map(|(_, v)| v)
            .unwrap_or(&self.api_version)
    }

    /// Check if the kind is served from a custom resource definition
    pub fn is_custom_kind(&self) -> bool {
        !BUILTIN_GROUPS.contains(&self.group())
    }

    /// Check if this is a built-in kind that lives outside namespaces
    pub fn is_cluster_scoped(&self) -> bool {
        CLUSTER_SCOPED_KINDS.contains(&(self.group(), self.kind.as_str()))
    }
}

impl fmt::Display for ObjectRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.namespace {
            Some(ns) => write!(f, "{} {}/{}", self.kind, ns, self.name),
            None => write!(f, "{} {}", self.kind, self.name),
        }
    }
}

/// Opaque marker proving which instance of the tool created an object
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct IdentityMarker(String);

impl IdentityMarker {
    /// Generate a fresh random marker
    pub fn generate() -> Self {
        let bytes: [u8; 16] = rand::random();
        Self(hex::encode(bytes))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<&str> for IdentityMarker {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

impl fmt::Display for IdentityMarker {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Desired document for a single object
#[derive(Debug, Clone, PartialEq)]
pub struct ManagedObject {
    reference: ObjectRef,
    document: Value,
}

impl ManagedObject {
    /// Wrap an already-parsed document
    pub fn from_value(document: Value) -> Result<Self> {
        if !document.is_object() {
            return Err(CoreError::InvalidDocument {
                message: "document must be a mapping".to_string(),
            });
        }
        let reference = ObjectRef::from_document(&document)?;
        Ok(Self {
            reference,
            document,
        })
    }

    /// Parse a single YAML document
    pub fn from_yaml(yaml: &str) -> Result<Self> {
        let document: Value = serde_yaml::from_str(yaml)?;
        Self::from_value(document)
    }

    pub fn reference(&self) -> &ObjectRef {
        &self.reference
    }

    pub fn document(&self) -> &Value {
        &self.document
    }

    /// Fill in the namespace for namespaced objects that omit it
    ///
    /// Built-in cluster-scoped kinds are left alone.
    pub fn with_default_namespace(mut self, namespace: &str) -> Self {
        if self.reference.namespace.is_none() && !self.reference.is_cluster_scoped() {
            self.reference.namespace = Some(namespace.to_string());
            metadata_mut(&mut self.document).insert(
                "namespace".to_string(),
                Value::String(namespace.to_string()),
            );
        }
        self
    }

    /// Copy of the document carrying `marker` under `annotation`
    pub fn stamped(&self, annotation: &str, marker: &IdentityMarker) -> Value {
        let mut document = self.document.clone();
        let annotations = metadata_mut(&mut document)
            .entry("annotations")
            .or_insert_with(|| Value::Object(Map::new()));
        if !annotations.is_object() {
            *annotations = Value::Object(Map::new());
        }
        if let Value::Object(map) = annotations {
            map.insert(
                annotation.to_string(),
                Value::String(marker.as_str().to_string()),
            );
        }
        document
    }
}

/// Path of an annotation inside a document
pub fn annotation_path(annotation: &str) -> FieldPath {
    FieldPath::fields(["metadata", "annotations", annotation])
}

/// Read an annotation from any object document
pub fn read_annotation<'a>(document: &'a Value, annotation: &str) -> Option<&'a str> {
    document
        .get("metadata")
        .and_then(|m| m.get("annotations"))
        .and_then(|a| a.get(annotation))
        .and_then(Value::as_str)
}

fn metadata_mut(document: &mut Value) -> &mut Map<String, Value> {
    if !document.get("metadata").is_some_and(Value::is_object) {
        document["metadata"] = Value::Object(Map::new());
    }
    match document.get_mut("metadata") {
        Some(Value::Object(map)) => map,
        _ => unreachable!("metadata was just set to an object"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_object_ref_from_document() {
        let doc = json!({
            "apiVersion": "apps/v1",
            "kind": "Deployment",
            "metadata": {"name": "web", "namespace": "prod"}
        });
        let r = ObjectRef::from_document(&doc).unwrap();
        assert_eq!(r.group(), "apps");
        assert_eq!(r.version(), "v1");
        assert_eq!(r.to_string(), "Deployment prod/web");
    }

    #[test]
    fn test_object_ref_missing_name() {
        let doc = json!({"apiVersion": "v1", "kind": "ConfigMap", "metadata": {}});
        let err = ObjectRef::from_document(&doc).unwrap_err();
        assert!(matches!(err, CoreError::MissingField { field } if field == "metadata.name"));
    }

    #[test]
    fn test_custom_kind_detection() {
        let core = ObjectRef::new("v1", "ConfigMap", Some("default"), "a");
        let apps = ObjectRef::new("apps/v1", "Deployment", Some("default"), "a");
        let crd = ObjectRef::new("cert-manager.io/v1", "Certificate", Some("default"), "a");
        assert!(!core.is_custom_kind());
        assert!(!apps.is_custom_kind());
        assert!(crd.is_custom_kind());
    }

    #[test]
    fn test_stamped_adds_annotation() {
        let object = ManagedObject::from_yaml(
            "apiVersion: v1\nkind: ConfigMap\nmetadata:\n  name: cfg\ndata:\n  a: '1'\n",
        )
        .unwrap();
        let marker = IdentityMarker::from("abc123");
        let stamped = object.stamped("kubeward.io/instance-id", &marker);

        assert_eq!(
            read_annotation(&stamped, "kubeward.io/instance-id"),
            Some("abc123")
        );
        // original untouched
        assert!(read_annotation(object.document(), "kubeward.io/instance-id").is_none());
    }

    #[test]
    fn test_default_namespace() {
        let object = ManagedObject::from_value(json!({
            "apiVersion": "v1", "kind": "ConfigMap", "metadata": {"name": "cfg"}
        }))
        .unwrap()
        .with_default_namespace("team-a");
        assert_eq!(object.reference().namespace.as_deref(), Some("team-a"));
        assert_eq!(object.document()["metadata"]["namespace"], "team-a");
    }

    #[test]
    fn test_default_namespace_skips_cluster_scoped_kinds() {
        for (api_version, kind) in [
            ("v1", "Namespace"),
            ("rbac.authorization.k8s.io/v1", "ClusterRole"),
            ("apiextensions.k8s.io/v1", "CustomResourceDefinition"),
        ] {
            let object = ManagedObject::from_value(json!({
                "apiVersion": api_version, "kind": kind, "metadata": {"name": "x"}
            }))
            .unwrap()
            .with_default_namespace("team-a");
            assert_eq!(object.reference().namespace, None, "{}", kind);
            assert!(object.document()["metadata"].get("namespace").is_none());
        }

        // Same kind name in another group is namespaced
        let custom = ObjectRef::new("example.com/v1", "Namespace", None, "x");
        assert!(!custom.is_cluster_scoped());
    }

    #[test]
    fn test_generated_markers_differ() {
        let a = IdentityMarker::generate();
        let b = IdentityMarker::generate();
        assert_eq!(a.as_str().len(), 32);
        assert_ne!(a, b);
    }
}
