//! Destroy command - delete the objects of a manifest

use console::style;
use kubeward_kube::{ObjectOptions, RecordStore};
use std::path::Path;

use super::{Context, report};
use crate::error::Result;
use crate::manifest;

/// Run the destroy command
///
/// Objects are deleted in reverse manifest order, so namespaces and
/// definitions listed first go last.
pub async fn run(
    ctx: &Context,
    manifest_path: &Path,
    namespace: Option<&str>,
    options: &ObjectOptions,
) -> Result<()> {
    let objects = manifest::load(manifest_path, namespace)?;
    let records = ctx.records()?;

    let mut targets = Vec::new();
    for object in objects.iter().rev() {
        let reference = object.reference();
        if records.exists(reference).await? {
            targets.push(reference.clone());
        } else {
            println!(
                "{} {} {}",
                style("-").dim(),
                style(reference).cyan(),
                style("(not managed, skipped)").dim()
            );
        }
    }

    if targets.is_empty() {
        println!("Nothing to destroy");
        return Ok(());
    }
    println!(
        "{} Destroying {} object(s)",
        style("→").blue().bold(),
        targets.len()
    );

    let client = ctx.connect().await?;
    let mut results = Vec::with_capacity(targets.len());
    for object in targets {
        let result = client.destroy(&object, options).await?;
        results.push((object, result));
    }

    report(&results)
}
