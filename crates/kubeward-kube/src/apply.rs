//! Apply engine
//!
//! Server-side applies the complete desired field set as the configured
//! field manager:
//!
//! 1. Apply without force
//! 2. On an ownership conflict, apply once more with force (a reclaim)
//! 3. While the kind is not served yet, back off and start over until the
//!    retry ceiling
//!
//! Any other failure is returned immediately.

use kube::api::DynamicObject;
use kubeward_core::{IdentityMarker, ObjectRef};
use serde_json::Value;
use std::sync::atomic::{AtomicU32, Ordering};
use tracing::{debug, info, instrument};

use crate::classify::{Diagnostic, ErrorKind, Operation, classify};
use crate::config::EngineConfig;
use crate::retry::retry_while;
use crate::store::{ApplyParams, ObjectStore, StoreError, live_annotation};

/// Result of a successful apply
#[derive(Debug, Clone)]
pub struct ApplyReport {
    /// Object as returned by the server
    pub object: DynamicObject,
    /// Warnings attached to the response
    pub warnings: Vec<String>,
    /// Fields owned by other managers were taken back with a forced apply
    pub reclaimed: bool,
    /// Number of apply rounds, including retries while the kind was not served
    pub attempts: u32,
}

/// Who an existing object belongs to
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Claim {
    /// No object with these coordinates
    Absent,
    /// The object exists without an identity marker
    Unmanaged,
    /// The object carries a marker from an instance of this tool
    Managed(IdentityMarker),
}

/// Applies documents through an [`ObjectStore`]
pub struct ApplyEngine<'a, S: ObjectStore + ?Sized> {
    store: &'a S,
    config: &'a EngineConfig,
}

impl<'a, S: ObjectStore + ?Sized> ApplyEngine<'a, S> {
    pub fn new(store: &'a S, config: &'a EngineConfig) -> Self {
        Self { store, config }
    }

    /// Apply `document` for `object`
    #[instrument(skip_all, fields(object = %object, operation = %operation))]
    pub async fn apply(
        &self,
        object: &ObjectRef,
        document: &Value,
        operation: Operation,
    ) -> Result<ApplyReport, Diagnostic> {
        let attempts = AtomicU32::new(0);
        let counter = &attempts;

        let name = format!("{} {}", operation, object);
        let mut report = retry_while(
            &self.config.type_registration_retry,
            &name,
            |diag: &Diagnostic| diag.retriable(),
            move || {
                counter.fetch_add(1, Ordering::SeqCst);
                self.apply_round(object, document, operation)
            },
        )
        .await?;

        report.attempts = attempts.load(Ordering::SeqCst);
        Ok(report)
    }

    /// One apply, plus one forced apply when it hits a conflict
    async fn apply_round(
        &self,
        object: &ObjectRef,
        document: &Value,
        operation: Operation,
    ) -> Result<ApplyReport, Diagnostic> {
        let manager = self.config.field_manager.as_str();

        let error = match self.store.apply(object, document, self.params(false)).await {
            Ok(outcome) => {
                return Ok(ApplyReport {
                    object: outcome.object,
                    warnings: outcome.warnings,
                    reclaimed: false,
                    attempts: 0,
                });
            }
            Err(e) => e,
        };

        let diag = classify(&error, operation, object);
        if diag.kind != ErrorKind::OwnershipConflict {
            return Err(self.with_adoption_hint(diag));
        }

        info!(
            object = %object,
            manager = manager,
            conflict = %diag.detail,
            "Reclaiming conflicting fields with a forced apply"
        );

        match self.store.apply(object, document, self.params(true)).await {
            Ok(outcome) => Ok(ApplyReport {
                object: outcome.object,
                warnings: outcome.warnings,
                reclaimed: true,
                attempts: 0,
            }),
            Err(e) => Err(self.with_adoption_hint(classify(&e, operation, object))),
        }
    }

    fn params(&self, force: bool) -> ApplyParams<'_> {
        ApplyParams {
            field_manager: &self.config.field_manager,
            force,
        }
    }

    fn with_adoption_hint(&self, mut diag: Diagnostic) -> Diagnostic {
        if diag.kind == ErrorKind::AlreadyExists {
            diag.detail = adoption_hint(&diag.detail);
        }
        diag
    }

    /// Find out who owns the object at `object`'s coordinates
    pub async fn check_claim(&self, object: &ObjectRef) -> Result<Claim, Diagnostic> {
        // A kind that is not served cannot have instances yet
        match self.store.is_registered(object).await {
            Ok(true) => {}
            Ok(false) => {
                debug!(object = %object, "Kind not served yet, nothing to claim");
                return Ok(Claim::Absent);
            }
            Err(e) => return Err(classify(&e, Operation::Create, object)),
        }

        let live = match self.store.get(object).await {
            Ok(live) => live,
            // The kind can stop being served between the two calls
            Err(StoreError::KindNotRegistered { .. }) => None,
            Err(e) => {
                let diag = classify(&e, Operation::Create, object);
                if diag.kind == ErrorKind::TypeNotRegistered {
                    None
                } else {
                    return Err(diag);
                }
            }
        };

        let claim = match live {
            None => Claim::Absent,
            Some(live) => match live_annotation(&live, &self.config.identity_annotation) {
                Some(marker) => Claim::Managed(IdentityMarker::from(marker)),
                None => Claim::Unmanaged,
            },
        };
        debug!(object = %object, claim = ?claim, "Checked existing object");
        Ok(claim)
    }
}

/// Detail for an object that exists without an identity marker
pub fn adoption_hint(detail: &str) -> String {
    format!(
        "{}\nHint: the object is not managed by kubeward; run `kubeward adopt` to bring it under management",
        detail
    )
}
