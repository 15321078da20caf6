//! Pending-projection recovery
//!
//! When an apply succeeded but its projection could not be computed, the
//! record keeps the live-apply result and a private pending flag. The next
//! successful projection clears it; until then Read reports projection
//! failures as warnings rather than errors, and Update only projects again
//! while the live object still matches the desired document.
//!
//! A projection failure on a plain Read never sets the flag: nothing was
//! applied, so there is no result waiting to be recorded.

use kubeward_core::{ObjectRef, ResourceRecord};
use tracing::warn;

use crate::classify::{Diagnostic, ErrorKind, Operation, Severity};
use crate::projection::ProjectionError;

pub fn is_pending(record: &ResourceRecord) -> bool {
    record.private.projection_pending
}

pub fn mark_pending(record: &mut ResourceRecord) {
    record.private.projection_pending = true;
}

/// Clear the flag after a projection succeeded
pub fn clear(record: &mut ResourceRecord) {
    record.private.projection_pending = false;
}

/// Diagnostic for a projection failure during `operation`
///
/// `was_pending` is the flag as it stood before the failure.
pub fn projection_failure(
    error: &ProjectionError,
    operation: Operation,
    object: &ObjectRef,
    was_pending: bool,
) -> Diagnostic {
    let severity = if operation == Operation::Read && was_pending {
        warn!(object = %object, error = %error, "Projection still failing, keeping previous state");
        Severity::Warning
    } else {
        Severity::Error
    };

    let detail = if operation == Operation::Read && !was_pending {
        format!("{}. The previously recorded state was kept", error)
    } else {
        format!(
            "{}. The object was applied; the projection will be retried on the next refresh",
            error
        )
    };
    Diagnostic::new(
        severity,
        ErrorKind::ProjectionFailed,
        format!("Could not compute the managed fields of {}", object),
        detail,
    )
}
