//! Engine configuration
//!
//! Loaded from `~/.config/kubeward/config.yaml` when present:
//!
//! ```yaml
//! fieldManager: kubeward
//! identityAnnotation: kubeward.io/instance-id
//! typeRegistrationRetry:
//!   initialDelay: 500ms
//!   ceiling: 30s
//! deletePollInterval: 2s
//! deleteTimeouts:
//!   default: 2m
//!   perKind:
//!     Namespace: 10m
//! ```

use humantime_serde::Serde;
use kubeward_core::{FieldPath, annotation_path};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::error::{KubeError, Result};
use crate::retry::RetryPolicy;

/// Settings shared by every reconciliation
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct EngineConfig {
    /// Field manager name used for server-side apply
    pub field_manager: String,

    /// Annotation holding the identity marker
    pub identity_annotation: String,

    /// Backoff while a custom kind is not served yet
    pub type_registration_retry: RetryPolicy,

    /// Delay between checks while waiting for a deletion
    #[serde(with = "humantime_serde")]
    pub delete_poll_interval: Duration,

    pub delete_timeouts: DeleteTimeouts,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            field_manager: "kubeward".to_string(),
            identity_annotation: "kubeward.io/instance-id".to_string(),
            type_registration_retry: RetryPolicy::default(),
            delete_poll_interval: Duration::from_secs(2),
            delete_timeouts: DeleteTimeouts::default(),
        }
    }
}

impl EngineConfig {
    /// Load configuration from default location
    pub fn load() -> Result<Self> {
        let path = Self::default_path()?;
        Self::load_or_default(&path)
    }

    /// Load configuration from a specific path
    pub fn load_from(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let config: Self = serde_yaml::from_str(&content)?;
        config.validate()?;
        Ok(config)
    }

    /// Load from `path` if it exists, defaults otherwise
    pub fn load_or_default(path: &Path) -> Result<Self> {
        if path.exists() {
            Self::load_from(path)
        } else {
            Ok(Self::default())
        }
    }

    /// Get default configuration path
    pub fn default_path() -> Result<PathBuf> {
        let config_dir = dirs::config_dir().ok_or_else(|| {
            KubeError::InvalidConfig("could not determine config directory".to_string())
        })?;
        Ok(config_dir.join("kubeward").join("config.yaml"))
    }

    pub fn validate(&self) -> Result<()> {
        if self.field_manager.trim().is_empty() {
            return Err(KubeError::InvalidConfig(
                "fieldManager must not be empty".to_string(),
            ));
        }
        if self.identity_annotation.trim().is_empty() {
            return Err(KubeError::InvalidConfig(
                "identityAnnotation must not be empty".to_string(),
            ));
        }
        if self.delete_poll_interval.is_zero() {
            return Err(KubeError::InvalidConfig(
                "deletePollInterval must be greater than zero".to_string(),
            ));
        }
        Ok(())
    }

    /// Paths the tool writes for its own bookkeeping
    ///
    /// Ignore sets must not overlap these.
    pub fn reserved_paths(&self) -> Vec<FieldPath> {
        vec![annotation_path(&self.identity_annotation)]
    }
}

/// How long to wait for a deleted object to disappear
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct DeleteTimeouts {
    /// Timeout for kinds without a specific entry
    #[serde(with = "humantime_serde")]
    pub default: Duration,

    /// Timeouts by kind
    pub per_kind: BTreeMap<String, Serde<Duration>>,
}

impl Default for DeleteTimeouts {
    fn default() -> Self {
        // Kinds whose deletion waits on other objects being cleaned up first
        let per_kind = [
            ("Namespace", 600),
            ("CustomResourceDefinition", 600),
            ("PersistentVolume", 300),
            ("PersistentVolumeClaim", 300),
        ]
        .into_iter()
        .map(|(kind, secs)| (kind.to_string(), Serde::from(Duration::from_secs(secs))))
        .collect();

        Self {
            default: Duration::from_secs(120),
            per_kind,
        }
    }
}

impl DeleteTimeouts {
    /// Timeout for `kind`
    pub fn for_kind(&self, kind: &str) -> Duration {
        self.per_kind
            .get(kind)
            .map(|d| **d)
            .unwrap_or(self.default)
    }
}
