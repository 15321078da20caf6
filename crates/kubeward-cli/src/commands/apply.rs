//! Apply command - create or update the objects of a manifest

use console::style;
use kubeward_kube::{ObjectOptions, ObjectRequest};
use std::path::Path;

use super::{Context, report};
use crate::error::Result;
use crate::manifest;

/// Run the apply command
pub async fn run(
    ctx: &Context,
    manifest_path: &Path,
    namespace: Option<&str>,
    options: &ObjectOptions,
) -> Result<()> {
    let objects = manifest::load(manifest_path, namespace)?;
    println!(
        "{} Applying {} object(s) as {}",
        style("→").blue().bold(),
        objects.len(),
        style(&ctx.config.field_manager).cyan()
    );

    let client = ctx.connect().await?;
    let mut results = Vec::with_capacity(objects.len());
    for object in objects {
        let reference = object.reference().clone();
        let request = ObjectRequest::new(object).with_options(options.clone());
        results.push((reference, client.apply(&request).await?));
    }

    report(&results)
}
