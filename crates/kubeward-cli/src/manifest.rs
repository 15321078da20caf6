//! Manifest loading and per-object options

use kubeward_core::ManagedObject;
use kubeward_kube::{ObjectOptions, PropagationPolicy};
use serde::Deserialize;
use serde_json::Value;
use std::path::Path;
use std::time::Duration;

use crate::error::{CliError, Result};

/// Load every object of a multi-document YAML manifest
///
/// Empty documents are skipped. `namespace` fills in objects that do not
/// set one, except built-in cluster-scoped kinds.
pub fn load(path: &Path, namespace: Option<&str>) -> Result<Vec<ManagedObject>> {
    let content = std::fs::read_to_string(path).map_err(|e| CliError::Io {
        message: format!("{}: {}", path.display(), e),
    })?;
    parse(&content, namespace).map_err(|e| match e {
        CliError::Input { message, help } => CliError::Input {
            message: format!("{}: {}", path.display(), message),
            help,
        },
        other => other,
    })
}

/// Parse a multi-document YAML string into objects
pub fn parse(content: &str, namespace: Option<&str>) -> Result<Vec<ManagedObject>> {
    let mut objects = Vec::new();

    for (index, document) in serde_yaml::Deserializer::from_str(content).enumerate() {
        let value = Value::deserialize(document)
            .map_err(|e| CliError::input(format!("document {}: {}", index + 1, e)))?;
        if value.is_null() {
            continue;
        }

        let object = ManagedObject::from_value(value)
            .map_err(|e| CliError::input(format!("document {}: {}", index + 1, e)))?;
        let object = match namespace {
            Some(ns) => object.with_default_namespace(ns),
            None => object,
        };
        objects.push(object);
    }

    if objects.is_empty() {
        return Err(CliError::input_with_help(
            "manifest contains no objects",
            "pass a YAML file with at least one document that sets apiVersion, kind and metadata.name",
        ));
    }
    Ok(objects)
}

/// Build per-object options from command-line flags
pub fn options(
    ignore: &[String],
    delete_protection: bool,
    force_destroy: bool,
    apply_only: bool,
    timeout: Option<u64>,
    propagation: Option<&str>,
) -> Result<ObjectOptions> {
    let mut options = ObjectOptions::new().with_ignore_fields(ignore.iter().cloned());
    if delete_protection {
        options = options.with_delete_protection();
    }
    if force_destroy {
        options = options.with_force_destroy();
    }
    if apply_only {
        options = options.with_apply_only();
    }
    if let Some(seconds) = timeout {
        options = options.with_delete_timeout(Duration::from_secs(seconds));
    }
    if let Some(raw) = propagation {
        options = options.with_propagation(parse_propagation(raw)?);
    }
    Ok(options)
}

fn parse_propagation(raw: &str) -> Result<PropagationPolicy> {
    match raw.to_lowercase().as_str() {
        "background" => Ok(PropagationPolicy::Background),
        "foreground" => Ok(PropagationPolicy::Foreground),
        "orphan" => Ok(PropagationPolicy::Orphan),
        _ => Err(CliError::input_with_help(
            format!("unknown propagation policy '{}'", raw),
            "use background, foreground or orphan",
        )),
    }
}
