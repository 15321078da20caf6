//! Adopt command - bring existing objects under management

use console::style;
use kubeward_kube::{ObjectOptions, ObjectRequest};
use std::path::Path;

use super::{Context, report};
use crate::error::Result;
use crate::manifest;

/// Run the adopt command
pub async fn run(
    ctx: &Context,
    manifest_path: &Path,
    namespace: Option<&str>,
    options: &ObjectOptions,
) -> Result<()> {
    let objects = manifest::load(manifest_path, namespace)?;
    println!(
        "{} Adopting {} object(s); identity markers are written on the next apply",
        style("→").blue().bold(),
        objects.len()
    );

    let client = ctx.connect().await?;
    let mut results = Vec::with_capacity(objects.len());
    for object in objects {
        let reference = object.reference().clone();
        let request = ObjectRequest::new(object).with_options(options.clone());
        results.push((reference, client.adopt(&request).await?));
    }

    report(&results)
}
