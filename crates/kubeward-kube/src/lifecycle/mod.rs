//! Lifecycle orchestration
//!
//! [`Reconciler`] drives one managed object through create, read, update,
//! delete and adopt. Each operation returns an [`Outcome`]: the resulting
//! state, the record to persist (or `None` when the object is no longer
//! ours) and classified diagnostics. Operations never return `Err`; the
//! caller decides what to do from the diagnostics' severities.
//!
//! ```text
//!   absent --create--> applying --read-back ok--> live-owned
//!                         |                          |   ^
//!                         +--projection failed--> projection-pending
//!                                                    |
//!   live-owned --delete--> deleting --gone--> deleted
//! ```

mod delete;

use kube::api::DynamicObject;
use kubeward_core::{
    IdentityMarker, IgnoreSet, ManagedObject, ObjectRef, OwnershipTransition, ResourceRecord,
};
use serde::Serialize;
use serde_json::Value;
use std::collections::BTreeSet;
use std::fmt;
use std::time::Duration;
use tracing::{debug, info, warn};

use crate::apply::{ApplyEngine, Claim, adoption_hint};
use crate::classify::{Diagnostic, ErrorKind, Operation, Severity, classify};
use crate::config::EngineConfig;
use crate::fields::{document_leaves, value_at};
use crate::ownership::OwnershipTracker;
use crate::projection::{ProjectionError, Snapshot, compute_snapshot, recorded_paths};
use crate::recovery;
use crate::store::{ObjectStore, PropagationPolicy, live_annotation, to_document};

/// Per-object options supplied by the caller
#[derive(Debug, Clone, Default)]
pub struct ObjectOptions {
    /// Paths never applied nor projected
    pub ignore_fields: Vec<String>,

    /// Refuse to delete the object
    pub delete_protection: bool,

    /// Strip finalizers when a deletion times out
    pub force_destroy: bool,

    /// Override the kind-specific delete timeout
    pub delete_timeout: Option<Duration>,

    /// Forget the object on delete instead of deleting it
    pub apply_only: bool,

    /// What happens to dependents on delete
    pub propagation: PropagationPolicy,
}

impl ObjectOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_ignore_fields<I, S>(mut self, fields: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.ignore_fields = fields.into_iter().map(Into::into).collect();
        self
    }

    pub fn with_delete_protection(mut self) -> Self {
        self.delete_protection = true;
        self
    }

    pub fn with_force_destroy(mut self) -> Self {
        self.force_destroy = true;
        self
    }

    pub fn with_delete_timeout(mut self, timeout: Duration) -> Self {
        self.delete_timeout = Some(timeout);
        self
    }

    pub fn with_apply_only(mut self) -> Self {
        self.apply_only = true;
        self
    }

    pub fn with_propagation(mut self, propagation: PropagationPolicy) -> Self {
        self.propagation = propagation;
        self
    }
}

/// Desired object plus its options
#[derive(Debug, Clone)]
pub struct ObjectRequest {
    pub object: ManagedObject,
    pub options: ObjectOptions,
}

impl ObjectRequest {
    pub fn new(object: ManagedObject) -> Self {
        Self {
            object,
            options: ObjectOptions::default(),
        }
    }

    pub fn with_options(mut self, options: ObjectOptions) -> Self {
        self.options = options;
        self
    }
}

/// Where an object stands after an operation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum LifecycleState {
    Absent,
    Applying,
    LiveOwned,
    ProjectionPending,
    Deleting,
    Deleted,
}

impl fmt::Display for LifecycleState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LifecycleState::Absent => write!(f, "absent"),
            LifecycleState::Applying => write!(f, "applying"),
            LifecycleState::LiveOwned => write!(f, "live-owned"),
            LifecycleState::ProjectionPending => write!(f, "projection-pending"),
            LifecycleState::Deleting => write!(f, "deleting"),
            LifecycleState::Deleted => write!(f, "deleted"),
        }
    }
}

/// Result of a lifecycle operation
#[derive(Debug, Clone)]
pub struct Outcome {
    pub state: LifecycleState,
    /// Record to persist; `None` drops the object from management
    pub record: Option<ResourceRecord>,
    pub diagnostics: Vec<Diagnostic>,
    /// Managed fields now owned by someone else
    pub transitions: Vec<OwnershipTransition>,
}

impl Outcome {
    fn new(state: LifecycleState, record: Option<ResourceRecord>) -> Self {
        Self {
            state,
            record,
            diagnostics: Vec::new(),
            transitions: Vec::new(),
        }
    }

    fn failed(state: LifecycleState, record: Option<ResourceRecord>, diagnostic: Diagnostic) -> Self {
        Self::new(state, record).with(diagnostic)
    }

    fn with(mut self, diagnostic: Diagnostic) -> Self {
        self.diagnostics.push(diagnostic);
        self
    }

    /// Check if any diagnostic is an error
    pub fn has_errors(&self) -> bool {
        self.diagnostics.iter().any(Diagnostic::is_error)
    }

    pub fn errors(&self) -> impl Iterator<Item = &Diagnostic> {
        self.diagnostics.iter().filter(|d| d.is_error())
    }

    /// Highest severity among the diagnostics
    pub fn severity(&self) -> Option<Severity> {
        self.diagnostics.iter().map(|d| d.severity).max()
    }
}

/// Reconciles managed objects against an [`ObjectStore`]
pub struct Reconciler<S: ObjectStore> {
    store: S,
    config: EngineConfig,
}

impl<S: ObjectStore> Reconciler<S> {
    pub fn new(store: S, config: EngineConfig) -> Self {
        Self { store, config }
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    fn engine(&self) -> ApplyEngine<'_, S> {
        ApplyEngine::new(&self.store, &self.config)
    }

    fn tracker(&self) -> OwnershipTracker<'_> {
        OwnershipTracker::new(&self.config.field_manager)
    }

    /// Validate the caller's ignore paths
    pub fn ignore_set(&self, options: &ObjectOptions) -> Result<IgnoreSet, Diagnostic> {
        IgnoreSet::parse(&options.ignore_fields, &self.config.reserved_paths()).map_err(|e| {
            Diagnostic::error(ErrorKind::InvalidInput, "Invalid ignore_fields", e.to_string())
        })
    }

    /// Document sent to the server: stamped with the marker, ignored paths removed
    fn desired_document(
        &self,
        object: &ManagedObject,
        marker: &IdentityMarker,
        ignore: &IgnoreSet,
    ) -> Value {
        let mut document = object.stamped(&self.config.identity_annotation, marker);
        ignore.strip(&mut document);
        document
    }

    /// Check if the live object still carries the record's identity marker
    ///
    /// An adopted record whose marker is not written yet also owns an
    /// unmarked object, never one stamped by another instance.
    fn owns(&self, live: &DynamicObject, record: &ResourceRecord) -> bool {
        match live_annotation(live, &self.config.identity_annotation) {
            Some(marker) => marker == record.identity().as_str(),
            None => record.private.identity_unwritten,
        }
    }

    fn snapshot(
        &self,
        live: &DynamicObject,
        record: &ResourceRecord,
        ignore: &IgnoreSet,
    ) -> Result<Snapshot, ProjectionError> {
        let mut extra = self.tracker().recorded_paths(record)?;

        // Adopted objects keep projecting what they were adopted with
        if record.private.identity_unwritten {
            extra.extend(recorded_paths(&record.state.field_owners)?);
        }

        compute_snapshot(
            live,
            &self.config.field_manager,
            ignore,
            &extra,
            &self.config.reserved_paths(),
        )
    }

    /// Mandatory read after an apply
    async fn read_back(&self, object: &ObjectRef) -> Result<DynamicObject, ProjectionError> {
        match self.store.get(object).await {
            Ok(Some(live)) => Ok(live),
            Ok(None) => Err(ProjectionError::ReadBack(
                "the object disappeared right after it was applied".to_string(),
            )),
            Err(e) => Err(ProjectionError::ReadBack(e.to_string())),
        }
    }

    async fn project_after_apply(
        &self,
        object: &ObjectRef,
        record: &ResourceRecord,
        ignore: &IgnoreSet,
    ) -> Result<Snapshot, ProjectionError> {
        let live = self.read_back(object).await?;
        self.snapshot(&live, record, ignore)
    }

    /// Store a fresh snapshot in the record
    fn commit(&self, record: &mut ResourceRecord, snapshot: Snapshot, after_apply: bool) {
        if after_apply {
            self.tracker().record_apply(record, &snapshot.owned_now);
        }
        record.state.projection = snapshot.projection;
        record.state.field_owners = snapshot.observed;
        recovery::clear(record);
        record.touch();
    }

    fn resting_state(record: &ResourceRecord) -> LifecycleState {
        if recovery::is_pending(record) {
            LifecycleState::ProjectionPending
        } else {
            LifecycleState::LiveOwned
        }
    }

    fn gone(object: &ObjectRef) -> Outcome {
        debug!(object = %object, "Object no longer exists");
        Outcome::failed(
            LifecycleState::Absent,
            None,
            Diagnostic::info(
                ErrorKind::NotFound,
                format!("{} is absent", object),
                "the object was deleted outside of kubeward",
            ),
        )
    }

    fn replaced(&self, object: &ObjectRef, live: &DynamicObject, record: &ResourceRecord) -> Outcome {
        let found = live_annotation(live, &self.config.identity_annotation).unwrap_or("none");
        warn!(
            object = %object,
            expected = %record.identity(),
            found = found,
            "Identity marker mismatch, object belongs to another instance"
        );
        Outcome::failed(
            LifecycleState::Absent,
            None,
            Diagnostic::warning(
                ErrorKind::NotFound,
                format!("{} belongs to another instance", object),
                format!(
                    "expected identity marker {} but found {}; the object is no longer managed by this instance",
                    record.identity(),
                    found
                ),
            ),
        )
    }

    /// Create the object and take its first ownership snapshot
    pub async fn create(&self, request: &ObjectRequest) -> Outcome {
        let object = request.object.reference();
        let ignore = match self.ignore_set(&request.options) {
            Ok(ignore) => ignore,
            Err(diag) => return Outcome::failed(LifecycleState::Absent, None, diag),
        };

        let mut outcome = Outcome::new(LifecycleState::Absent, None);
        match self.engine().check_claim(object).await {
            Ok(Claim::Absent) => {}
            Ok(Claim::Unmanaged) => {
                return outcome.with(Diagnostic::error(
                    ErrorKind::AlreadyExists,
                    format!("{} already exists", object),
                    adoption_hint("an object with these coordinates exists without an identity marker"),
                ));
            }
            Ok(Claim::Managed(previous)) => {
                warn!(object = %object, previous = %previous, "Taking over object of another instance");
                outcome.diagnostics.push(Diagnostic::warning(
                    ErrorKind::AlreadyExists,
                    format!("Taking over {}", object),
                    format!(
                        "the object carries the identity marker {} of another instance; it is re-stamped and managed by this one",
                        previous
                    ),
                ));
            }
            Err(diag) => return outcome.with(diag),
        }

        let marker = IdentityMarker::generate();
        debug!(object = %object, state = %LifecycleState::Applying, marker = %marker, "Creating object");

        let document = self.desired_document(&request.object, &marker, &ignore);
        let report = match self.engine().apply(object, &document, Operation::Create).await {
            Ok(report) => report,
            Err(diag) => return outcome.with(diag),
        };
        outcome.diagnostics.extend(api_warnings(object, &report.warnings));

        let mut record = ResourceRecord::new(object.clone(), marker);
        match self.project_after_apply(object, &record, &ignore).await {
            Ok(snapshot) => {
                self.commit(&mut record, snapshot, true);
                info!(object = %object, fields = record.state.projection.len(), "Created");
                outcome.state = LifecycleState::LiveOwned;
            }
            Err(e) => {
                recovery::mark_pending(&mut record);
                outcome
                    .diagnostics
                    .push(recovery::projection_failure(&e, Operation::Create, object, false));
                outcome.state = LifecycleState::ProjectionPending;
            }
        }
        outcome.record = Some(record);
        outcome
    }

    /// Refresh the record from the live object
    pub async fn read(&self, mut record: ResourceRecord, options: &ObjectOptions) -> Outcome {
        let object = record.object.clone();
        let ignore = match self.ignore_set(options) {
            Ok(ignore) => ignore,
            Err(diag) => return Outcome::failed(Self::resting_state(&record), Some(record), diag),
        };

        let live = match self.store.get(&object).await {
            Ok(Some(live)) => live,
            Ok(None) => return Self::gone(&object),
            Err(e) => {
                let diag = classify(&e, Operation::Read, &object);
                if diag.kind == ErrorKind::NotFound {
                    return Self::gone(&object);
                }
                return Outcome::failed(Self::resting_state(&record), Some(record), diag);
            }
        };

        if !self.owns(&live, &record) {
            return self.replaced(&object, &live, &record);
        }

        match self.snapshot(&live, &record, &ignore) {
            Ok(snapshot) => {
                let transitions = self.tracker().transitions(&record, &snapshot.observed);
                self.commit(&mut record, snapshot, false);

                let state = if live.metadata.deletion_timestamp.is_some() {
                    LifecycleState::Deleting
                } else {
                    LifecycleState::LiveOwned
                };
                let mut outcome = Outcome::new(state, Some(record));
                outcome.diagnostics = transitions
                    .iter()
                    .map(|t| transition_diagnostic(&object, t))
                    .collect();
                outcome.transitions = transitions;
                outcome
            }
            Err(e) => {
                // Only a failed apply sets the flag; the previous state is kept either way
                let diag =
                    recovery::projection_failure(&e, Operation::Read, &object, recovery::is_pending(&record));
                Outcome::failed(Self::resting_state(&record), Some(record), diag)
            }
        }
    }

    /// Re-apply the desired document and refresh the snapshot
    pub async fn update(&self, request: &ObjectRequest, mut record: ResourceRecord) -> Outcome {
        let object = request.object.reference();
        let resting = Self::resting_state(&record);

        if *object != record.object {
            return Outcome::failed(
                resting,
                Some(record.clone()),
                Diagnostic::error(
                    ErrorKind::InvalidInput,
                    "Object coordinates changed",
                    format!(
                        "the record tracks {} but the desired object is {}; delete and create it instead",
                        record.object, object
                    ),
                ),
            );
        }
        let ignore = match self.ignore_set(&request.options) {
            Ok(ignore) => ignore,
            Err(diag) => return Outcome::failed(resting, Some(record), diag),
        };

        let live = match self.store.get(object).await {
            Ok(live) => live,
            Err(e) => {
                let diag = classify(&e, Operation::Update, object);
                if diag.kind != ErrorKind::TypeNotRegistered {
                    return Outcome::failed(resting, Some(record), diag);
                }
                None
            }
        };

        let document = self.desired_document(&request.object, record.identity(), &ignore);
        let mut outcome = Outcome::new(resting, None);
        if let Some(live) = &live {
            if !self.owns(live, &record) {
                return self.replaced(object, live, &record);
            }
            if recovery::is_pending(&record) && live_matches(live, &document) {
                return self.retry_projection(object, record, &ignore, outcome).await;
            }
            if let Ok(current) = self.snapshot(live, &record, &ignore) {
                outcome.transitions =
                    self.tracker()
                        .reclaim_candidates(&record, &current.observed, &document_leaves(&document));
            }
        }

        debug!(object = %object, state = %LifecycleState::Applying, "Updating object");
        let report = match self.engine().apply(object, &document, Operation::Update).await {
            Ok(report) => report,
            Err(diag) => {
                outcome.record = Some(record);
                return outcome.with(diag);
            }
        };
        outcome.diagnostics.extend(api_warnings(object, &report.warnings));
        if report.reclaimed {
            let paths: Vec<&str> = outcome.transitions.iter().map(|t| t.path.as_str()).collect();
            outcome.diagnostics.push(Diagnostic::info(
                ErrorKind::OwnershipConflict,
                format!("Reclaimed fields on {}", object),
                if paths.is_empty() {
                    "conflicting fields were taken back from other managers".to_string()
                } else {
                    format!("taken back from other managers: {}", paths.join(", "))
                },
            ));
        }

        match self.project_after_apply(object, &record, &ignore).await {
            Ok(snapshot) => {
                self.commit(&mut record, snapshot, true);
                record.private.identity_unwritten = false;
                outcome.state = LifecycleState::LiveOwned;
            }
            Err(e) => {
                // Keep the previous projection until a later read succeeds
                recovery::mark_pending(&mut record);
                record.private.identity_unwritten = false;
                outcome
                    .diagnostics
                    .push(recovery::projection_failure(&e, Operation::Update, object, true));
                outcome.state = LifecycleState::ProjectionPending;
            }
        }
        outcome.record = Some(record);
        outcome
    }

    /// Finish a pending apply by projecting again, without re-applying
    ///
    /// The live object already holds the desired document, so the read-back
    /// stands in for the one that failed after the apply.
    async fn retry_projection(
        &self,
        object: &ObjectRef,
        mut record: ResourceRecord,
        ignore: &IgnoreSet,
        mut outcome: Outcome,
    ) -> Outcome {
        match self.project_after_apply(object, &record, ignore).await {
            Ok(snapshot) => {
                self.commit(&mut record, snapshot, true);
                info!(object = %object, "Recovered pending projection without re-applying");
                outcome.state = LifecycleState::LiveOwned;
            }
            Err(e) => {
                outcome
                    .diagnostics
                    .push(recovery::projection_failure(&e, Operation::Update, object, true));
                outcome.state = LifecycleState::ProjectionPending;
            }
        }
        outcome.record = Some(record);
        outcome
    }

    /// Bring an existing object under management without applying
    ///
    /// An object without a marker is recorded with a fresh one flagged as
    /// not yet written; the next update stamps it. An object carrying a
    /// marker keeps it.
    pub async fn adopt(&self, request: &ObjectRequest) -> Outcome {
        let object = request.object.reference();
        let ignore = match self.ignore_set(&request.options) {
            Ok(ignore) => ignore,
            Err(diag) => return Outcome::failed(LifecycleState::Absent, None, diag),
        };

        let live = match self.store.get(object).await {
            Ok(Some(live)) => live,
            Ok(None) => {
                return Outcome::failed(
                    LifecycleState::Absent,
                    None,
                    Diagnostic::error(
                        ErrorKind::NotFound,
                        format!("{} does not exist", object),
                        "there is nothing to adopt; create it instead",
                    ),
                );
            }
            Err(e) => {
                let diag = classify(&e, Operation::Read, object).with_severity(Severity::Error);
                return Outcome::failed(LifecycleState::Absent, None, diag);
            }
        };

        let (marker, unwritten) = match live_annotation(&live, &self.config.identity_annotation) {
            Some(marker) => (IdentityMarker::from(marker), false),
            None => (IdentityMarker::generate(), true),
        };
        let mut record = ResourceRecord::new(object.clone(), marker);
        record.private.identity_unwritten = unwritten;

        let desired: BTreeSet<_> = document_leaves(request.object.document());
        let snapshot = compute_snapshot(
            &live,
            &self.config.field_manager,
            &ignore,
            &desired,
            &self.config.reserved_paths(),
        );

        match snapshot {
            Ok(snapshot) => {
                self.commit(&mut record, snapshot, false);
                info!(object = %object, marker_written = !unwritten, "Adopted");
                Outcome::new(LifecycleState::LiveOwned, Some(record)).with(Diagnostic::info(
                    ErrorKind::AlreadyExists,
                    format!("Adopted {}", object),
                    if unwritten {
                        "the identity marker will be written on the next apply"
                    } else {
                        "the object already carried an identity marker"
                    },
                ))
            }
            // Nothing was applied, so there is no pending result to keep
            Err(e) => Outcome::failed(
                LifecycleState::Absent,
                None,
                Diagnostic::error(
                    ErrorKind::ProjectionFailed,
                    format!("Could not adopt {}", object),
                    format!("the managed fields of the live object could not be read: {}", e),
                ),
            ),
        }
    }
}

/// Check if every field of `desired` already has that value on the live object
fn live_matches(live: &DynamicObject, desired: &Value) -> bool {
    let Ok(current) = to_document(live) else {
        return false;
    };
    document_leaves(desired)
        .iter()
        .all(|path| value_at(&current, path) == value_at(desired, path))
}

fn api_warnings(object: &ObjectRef, warnings: &[String]) -> Vec<Diagnostic> {
    warnings
        .iter()
        .map(|w| {
            warn!(object = %object, warning = %w, "API warning");
            Diagnostic::warning(ErrorKind::ApiWarning, format!("API warning for {}", object), w.clone())
        })
        .collect()
}

fn transition_diagnostic(object: &ObjectRef, transition: &OwnershipTransition) -> Diagnostic {
    let detail = match &transition.to {
        Some(owner) => format!(
            "{} was last applied by {} and is now owned by {}",
            transition.path, transition.from, owner
        ),
        None => format!(
            "{} was last applied by {} and is no longer owned by anyone",
            transition.path, transition.from
        ),
    };
    Diagnostic::info(
        ErrorKind::OwnershipConflict,
        format!("Field ownership changed on {}", object),
        detail,
    )
}
