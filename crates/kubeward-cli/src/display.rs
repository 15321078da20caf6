//! Display formatting for CLI output
//!
//! Provides structured display for:
//! - Lifecycle outcomes with their diagnostics
//! - Drift reports with value diffs
//! - Persisted records and planned projections

use console::{Style, style};
use kubeward_core::{ObjectRef, Projection, ResourceRecord};
use kubeward_kube::diff::LineType;
use kubeward_kube::{
    ChangeType, Diagnostic, DriftReport, LifecycleState, ObjectResult, Severity,
};

/// Print the outcome of one object
pub fn print_result(object: &ObjectRef, result: &ObjectResult) {
    let outcome = &result.outcome;
    let icon = if outcome.has_errors() {
        style("✗").red().bold()
    } else {
        match outcome.state {
            LifecycleState::Deleted | LifecycleState::Absent => style("-").dim(),
            LifecycleState::ProjectionPending | LifecycleState::Deleting => {
                style("⚠").yellow().bold()
            }
            _ => style("✓").green().bold(),
        }
    };

    println!(
        "{} {} {}",
        icon,
        style(object).cyan(),
        style(format!("({})", outcome.state)).dim()
    );

    for diagnostic in &outcome.diagnostics {
        print_diagnostic(diagnostic);
    }
    if let Some(drift) = &result.drift {
        print_drift(drift);
    }
}

/// Print a diagnostic, indented under its object
pub fn print_diagnostic(diagnostic: &Diagnostic) {
    let label = match diagnostic.severity {
        Severity::Error => style("error").red().bold(),
        Severity::Warning => style("warning").yellow().bold(),
        Severity::Info => style("info").blue(),
    };
    println!(
        "    {} [{}] {}",
        label,
        style(&diagnostic.kind).dim(),
        diagnostic.title
    );
    for line in diagnostic.detail.lines() {
        println!("      {}", line);
    }
}

/// Print field-level drift
pub fn print_drift(report: &DriftReport) {
    if report.identity_changed {
        println!("    {} identity marker changed", style("!").yellow().bold());
    }

    for change in &report.changes {
        let (marker, color) = match change.change_type {
            ChangeType::Added => ("+", Style::new().green()),
            ChangeType::Removed => ("-", Style::new().red()),
            ChangeType::Modified => ("~", Style::new().yellow()),
            ChangeType::OwnerChanged => ("@", Style::new().magenta()),
        };
        let owners = match (&change.old_owner, &change.new_owner) {
            (Some(old), Some(new)) if old != new => format!(" (owner {} -> {})", old, new),
            _ => String::new(),
        };
        println!(
            "    {} {}{}",
            color.apply_to(marker),
            change.path,
            style(owners).dim()
        );

        if let Some(diff) = &change.diff {
            for line in &diff.lines {
                let rendered = match line.line_type {
                    LineType::Added => style(format!("+{}", line.content)).green(),
                    LineType::Removed => style(format!("-{}", line.content)).red(),
                    LineType::Context => style(format!(" {}", line.content)).dim(),
                };
                println!("        {}", rendered);
            }
        }
    }
}

/// Print the persisted records as a table
pub fn print_records(records: &[ResourceRecord]) {
    if records.is_empty() {
        println!("No managed objects");
        return;
    }

    let width = records
        .iter()
        .map(|r| r.object.to_string().len())
        .max()
        .unwrap_or(0);

    println!(
        "{:<width$}  {:<8}  {:>6}  {}",
        style("OBJECT").bold(),
        style("IDENTITY").bold(),
        style("FIELDS").bold(),
        style("UPDATED").bold(),
        width = width
    );
    for record in records {
        let mut notes = Vec::new();
        if record.private.projection_pending {
            notes.push("projection pending");
        }
        if record.private.identity_unwritten {
            notes.push("marker not written");
        }

        println!(
            "{:<width$}  {:<8}  {:>6}  {}{}",
            record.object.to_string(),
            truncate(record.identity().as_str(), 8),
            record.state.projection.len(),
            record.updated_at.format("%Y-%m-%d %H:%M:%S"),
            if notes.is_empty() {
                String::new()
            } else {
                format!("  {}", style(notes.join(", ")).yellow())
            },
            width = width
        );
    }
}

/// Print the fields of a projection
pub fn print_projection(object: &ObjectRef, projection: &Projection) {
    println!("{}", style(object).cyan().bold());
    if projection.is_empty() {
        println!("  {}", style("no managed fields").dim());
    }
    for (path, value) in projection.iter() {
        println!("  {} = {}", path, value);
    }
}

/// Format count with proper pluralization
pub fn pluralize(count: usize, singular: &str, plural: &str) -> String {
    if count == 1 {
        format!("{} {}", count, singular)
    } else {
        format!("{} {}", count, plural)
    }
}

/// Safely truncate a string to a maximum number of characters
fn truncate(value: &str, max_len: usize) -> &str {
    match value.char_indices().nth(max_len) {
        Some((end, _)) => &value[..end],
        None => value,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_pluralize() {
        assert_eq!(pluralize(1, "object", "objects"), "1 object");
        assert_eq!(pluralize(3, "object", "objects"), "3 objects");
    }

    #[test]
    fn test_truncate() {
        assert_eq!(truncate("0123456789abcdef", 8), "01234567");
        assert_eq!(truncate("abc", 8), "abc");
        assert_eq!(truncate("", 8), "");
    }
}
