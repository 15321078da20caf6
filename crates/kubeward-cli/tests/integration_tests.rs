//! Integration tests for the offline CLI commands

use kubeward_core::{IdentityMarker, ObjectRef, ResourceRecord};
use kubeward_kube::{FileRecordStore, RecordStore};
use std::path::Path;
use std::process::{Command, Output};
use tempfile::TempDir;

const CONFIGMAP: &str = r#"
apiVersion: v1
kind: ConfigMap
metadata:
  name: settings
data:
  mode: fast
  replicas: "3"
"#;

/// Run kubeward with an isolated config and state directory
fn kubeward(home: &Path, args: &[&str]) -> Output {
    Command::new(env!("CARGO_BIN_EXE_kubeward"))
        .args(args)
        .arg("--state")
        .arg(home.join("state"))
        .env("XDG_CONFIG_HOME", home.join("config"))
        .env("HOME", home)
        .env_remove("KUBEWARD_CONFIG")
        .env_remove("RUST_LOG")
        .output()
        .expect("Failed to execute kubeward")
}

fn write_manifest(dir: &TempDir, content: &str) -> String {
    let path = dir.path().join("manifest.yaml");
    std::fs::write(&path, content).unwrap();
    path.to_string_lossy().into_owned()
}

mod plan_command {
    use super::*;

    #[test]
    fn test_plan_lists_managed_fields() {
        let dir = TempDir::new().unwrap();
        let manifest = write_manifest(&dir, CONFIGMAP);

        let output = kubeward(dir.path(), &["plan", "-f", &manifest]);

        assert!(output.status.success(), "{}", String::from_utf8_lossy(&output.stderr));
        let stdout = String::from_utf8_lossy(&output.stdout);
        insta::assert_snapshot!(stdout, @r"
        ConfigMap settings
          data.mode = fast
          data.replicas = 3
        ");
    }

    #[test]
    fn test_plan_json_output() {
        let dir = TempDir::new().unwrap();
        let manifest = write_manifest(&dir, CONFIGMAP);

        let output = kubeward(
            dir.path(),
            &["plan", "-f", &manifest, "--namespace", "apps", "--json"],
        );

        assert!(output.status.success());
        let json: serde_json::Value = serde_json::from_slice(&output.stdout)
            .expect("Output should be valid JSON");
        assert_eq!(json[0]["object"], "ConfigMap apps/settings");
        assert_eq!(json[0]["fields"]["data.replicas"], "3");
        assert!(json[0]["fields"].get("metadata.name").is_none());
    }

    #[test]
    fn test_plan_respects_ignore() {
        let dir = TempDir::new().unwrap();
        let manifest = write_manifest(&dir, CONFIGMAP);

        let output = kubeward(
            dir.path(),
            &["plan", "-f", &manifest, "--ignore", "data.replicas", "--json"],
        );

        assert!(output.status.success());
        let json: serde_json::Value = serde_json::from_slice(&output.stdout).unwrap();
        assert!(json[0]["fields"].get("data.replicas").is_none());
        assert_eq!(json[0]["fields"]["data.mode"], "fast");
    }

    #[test]
    fn test_plan_rejects_ignoring_identity_annotation() {
        let dir = TempDir::new().unwrap();
        let manifest = write_manifest(&dir, CONFIGMAP);

        let output = kubeward(
            dir.path(),
            &["plan", "-f", &manifest, "--ignore", "metadata.annotations"],
        );

        assert_eq!(output.status.code(), Some(2));
        let stderr = String::from_utf8_lossy(&output.stderr);
        assert!(stderr.contains("kubeward.io/instance-id"));
    }
}

mod manifest_errors {
    use super::*;

    #[test]
    fn test_invalid_manifest_is_input_error() {
        let dir = TempDir::new().unwrap();
        let manifest = write_manifest(&dir, "kind: ConfigMap\nmetadata: {}\n");

        let output = kubeward(dir.path(), &["plan", "-f", &manifest]);

        assert_eq!(output.status.code(), Some(2));
    }

    #[test]
    fn test_empty_manifest_is_input_error() {
        let dir = TempDir::new().unwrap();
        let manifest = write_manifest(&dir, "---\n---\n");

        let output = kubeward(dir.path(), &["plan", "-f", &manifest]);

        assert_eq!(output.status.code(), Some(2));
        assert!(String::from_utf8_lossy(&output.stderr).contains("no objects"));
    }

    #[test]
    fn test_missing_manifest_is_io_error() {
        let dir = TempDir::new().unwrap();
        let missing = dir.path().join("absent.yaml");

        let output = kubeward(dir.path(), &["plan", "-f", &missing.to_string_lossy()]);

        assert_eq!(output.status.code(), Some(5));
    }

    #[test]
    fn test_unknown_propagation_is_input_error() {
        let dir = TempDir::new().unwrap();
        let manifest = write_manifest(&dir, CONFIGMAP);

        let output = kubeward(
            dir.path(),
            &["destroy", "-f", &manifest, "--propagation", "sideways"],
        );

        assert_eq!(output.status.code(), Some(2));
    }
}

mod show_command {
    use super::*;

    #[test]
    fn test_show_empty_state() {
        let dir = TempDir::new().unwrap();

        let output = kubeward(dir.path(), &["show"]);

        assert!(output.status.success());
        assert!(String::from_utf8_lossy(&output.stdout).contains("No managed objects"));
    }

    #[tokio::test]
    async fn test_show_lists_saved_records() {
        let dir = TempDir::new().unwrap();
        let store = FileRecordStore::new(dir.path().join("state")).unwrap();
        let object = ObjectRef::new("v1", "ConfigMap", Some("apps"), "settings");
        store
            .save(&ResourceRecord::new(object, IdentityMarker::from("abc123")))
            .await
            .unwrap();

        let output = kubeward(dir.path(), &["show", "--json"]);

        assert!(output.status.success());
        let json: serde_json::Value = serde_json::from_slice(&output.stdout).unwrap();
        assert_eq!(json.as_array().map(Vec::len), Some(1));
        assert_eq!(json[0]["object"]["name"], "settings");
        assert_eq!(json[0]["state"]["identity"], "abc123");
    }

    #[test]
    fn test_destroy_skips_unmanaged_objects_offline() {
        let dir = TempDir::new().unwrap();
        let manifest = write_manifest(&dir, CONFIGMAP);

        let output = kubeward(dir.path(), &["destroy", "-f", &manifest]);

        assert!(output.status.success());
        let stdout = String::from_utf8_lossy(&output.stdout);
        assert!(stdout.contains("not managed, skipped"));
        assert!(stdout.contains("Nothing to destroy"));
    }
}
