//! Error classification
//!
//! Every store failure goes through [`classify`], which maps it to an
//! [`ErrorKind`] and a [`Severity`] given the operation that was running.
//! The same failure can mean different things depending on the operation:
//! a 404 while reading says the object is gone, a 404 while creating a
//! custom kind says its definition is not served yet.

use kubeward_core::ObjectRef;
use regex::Regex;
use serde::Serialize;
use std::fmt;
use std::sync::LazyLock;

use crate::store::{ApiFailure, StoreError};

/// `<field>: Invalid value:` fragments in validation messages
static INVALID_FIELD: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"([A-Za-z][\w.\[\]/=-]*): Invalid value:").expect("valid regex")
});

/// Lifecycle operation a failure happened in
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Operation {
    Read,
    Create,
    Update,
    Delete,
}

impl fmt::Display for Operation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Operation::Read => write!(f, "read"),
            Operation::Create => write!(f, "create"),
            Operation::Update => write!(f, "update"),
            Operation::Delete => write!(f, "delete"),
        }
    }
}

/// How a diagnostic affects the caller
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    /// Expected condition, nothing to act on
    Info,
    /// Degraded but the operation result is usable
    Warning,
    /// The operation failed
    Error,
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Severity::Info => write!(f, "info"),
            Severity::Warning => write!(f, "warning"),
            Severity::Error => write!(f, "error"),
        }
    }
}

/// Failure taxonomy
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "kebab-case")]
pub enum ErrorKind {
    NotFound,
    AuthStale,
    OwnershipConflict,
    /// The kind is not (yet) served; retriable while its definition propagates
    TypeNotRegistered,
    ImmutableField { fields: Vec<String> },
    SchemaValidation,
    /// An object with the same name exists but is not managed by this tool
    AlreadyExists,
    DeleteBlocked { finalizers: Vec<String> },
    /// Delete refused locally because the object is protected
    DeleteProtected,
    ProjectionFailed,
    InvalidInput,
    ApiWarning,
    Generic,
}

impl ErrorKind {
    /// Short label used in titles and logs
    pub fn label(&self) -> &'static str {
        match self {
            ErrorKind::NotFound => "not-found",
            ErrorKind::AuthStale => "auth-stale",
            ErrorKind::OwnershipConflict => "ownership-conflict",
            ErrorKind::TypeNotRegistered => "type-not-registered",
            ErrorKind::ImmutableField { .. } => "immutable-field",
            ErrorKind::SchemaValidation => "schema-validation",
            ErrorKind::AlreadyExists => "already-exists",
            ErrorKind::DeleteBlocked { .. } => "delete-blocked-by-finalizer",
            ErrorKind::DeleteProtected => "delete-protected",
            ErrorKind::ProjectionFailed => "projection-failed",
            ErrorKind::InvalidInput => "invalid-input",
            ErrorKind::ApiWarning => "api-warning",
            ErrorKind::Generic => "generic",
        }
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// A classified outcome reported to the caller
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Diagnostic {
    pub severity: Severity,
    #[serde(flatten)]
    pub kind: ErrorKind,
    pub title: String,
    pub detail: String,
}

impl Diagnostic {
    pub fn new(
        severity: Severity,
        kind: ErrorKind,
        title: impl Into<String>,
        detail: impl Into<String>,
    ) -> Self {
        Self {
            severity,
            kind,
            title: title.into(),
            detail: detail.into(),
        }
    }

    pub fn error(kind: ErrorKind, title: impl Into<String>, detail: impl Into<String>) -> Self {
        Self::new(Severity::Error, kind, title, detail)
    }

    pub fn warning(kind: ErrorKind, title: impl Into<String>, detail: impl Into<String>) -> Self {
        Self::new(Severity::Warning, kind, title, detail)
    }

    pub fn info(kind: ErrorKind, title: impl Into<String>, detail: impl Into<String>) -> Self {
        Self::new(Severity::Info, kind, title, detail)
    }

    pub fn is_error(&self) -> bool {
        self.severity == Severity::Error
    }

    /// Check if repeating the same call may succeed without any change
    pub fn retriable(&self) -> bool {
        matches!(self.kind, ErrorKind::TypeNotRegistered)
    }

    /// Same diagnostic with a different severity
    pub fn with_severity(mut self, severity: Severity) -> Self {
        self.severity = severity;
        self
    }
}

impl fmt::Display for Diagnostic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.title, self.detail)
    }
}

/// Classify a store failure raised while running `operation` on `object`
pub fn classify(error: &StoreError, operation: Operation, object: &ObjectRef) -> Diagnostic {
    match error {
        StoreError::Api(failure) => classify_api(failure, operation, object),
        StoreError::KindNotRegistered { api_version, kind } => match operation {
            Operation::Read | Operation::Delete => Diagnostic::info(
                ErrorKind::NotFound,
                format!("{} is absent", object),
                format!("kind {} in {} is not served", kind, api_version),
            ),
            Operation::Create | Operation::Update => type_not_registered(object, &error.to_string()),
        },
        StoreError::Transport(message) => Diagnostic::error(
            ErrorKind::Generic,
            format!("Failed to {} {}", operation, object),
            message.clone(),
        ),
        StoreError::InvalidObject(message) => Diagnostic::error(
            ErrorKind::Generic,
            format!("Invalid response for {}", object),
            message.clone(),
        ),
    }
}

fn classify_api(failure: &ApiFailure, operation: Operation, object: &ObjectRef) -> Diagnostic {
    let message = failure.message.as_str();

    match failure.code {
        404 => match operation {
            Operation::Read | Operation::Delete => Diagnostic::info(
                ErrorKind::NotFound,
                format!("{} is absent", object),
                message,
            ),
            Operation::Create | Operation::Update if object.is_custom_kind() => {
                type_not_registered(object, message)
            }
            _ => Diagnostic::error(
                ErrorKind::Generic,
                format!("Failed to {} {}", operation, object),
                message,
            ),
        },

        // Both codes usually mean expired or rotated credentials
        401 | 403 => {
            let severity = if operation == Operation::Read {
                Severity::Warning
            } else {
                Severity::Error
            };
            Diagnostic::new(
                severity,
                ErrorKind::AuthStale,
                format!("Not authorized to {} {}", operation, object),
                message,
            )
        }

        409 if failure.reason == "AlreadyExists" => Diagnostic::error(
            ErrorKind::AlreadyExists,
            format!("{} already exists", object),
            message,
        ),

        409 if failure.reason == "Conflict" || message.contains("Apply failed with") => {
            Diagnostic::error(
                ErrorKind::OwnershipConflict,
                format!("Field ownership conflict on {}", object),
                message,
            )
        }

        _ if message.contains("field is immutable") => Diagnostic::error(
            ErrorKind::ImmutableField {
                fields: immutable_fields(message),
            },
            format!("Immutable field change on {}", object),
            message,
        ),

        422 | 400 => Diagnostic::error(
            ErrorKind::SchemaValidation,
            format!("{} was rejected by validation", object),
            message,
        ),

        _ => Diagnostic::error(
            ErrorKind::Generic,
            format!("Failed to {} {}", operation, object),
            failure.to_string(),
        ),
    }
}

fn type_not_registered(object: &ObjectRef, detail: &str) -> Diagnostic {
    Diagnostic::error(
        ErrorKind::TypeNotRegistered,
        format!(
            "Kind {} in {} is not served yet",
            object.kind, object.api_version
        ),
        detail,
    )
}

/// Field names reported as immutable in a validation message
///
/// Messages list one `<field>: Invalid value: ...` fragment per rejected
/// field; only fragments that end in "field is immutable" count.
pub fn immutable_fields(message: &str) -> Vec<String> {
    let matches: Vec<_> = INVALID_FIELD.captures_iter(message).collect();
    let mut fields = Vec::new();

    for (i, capture) in matches.iter().enumerate() {
        let (Some(whole), Some(name)) = (capture.get(0), capture.get(1)) else {
            continue;
        };
        let end = matches
            .get(i + 1)
            .and_then(|next| next.get(0))
            .map(|m| m.start())
            .unwrap_or(message.len());

        if message[whole.end()..end].contains("field is immutable") {
            let name = name.as_str().to_string();
            if !fields.contains(&name) {
                fields.push(name);
            }
        }
    }
    fields
}
