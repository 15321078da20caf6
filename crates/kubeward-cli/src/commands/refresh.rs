//! Refresh command - read managed objects back and report drift

use console::style;
use kubeward_core::ObjectRef;
use kubeward_kube::{ObjectOptions, RecordStore};
use std::path::Path;

use super::{Context, report};
use crate::error::Result;
use crate::manifest;

/// Run the refresh command
///
/// Without a manifest every managed object is refreshed.
pub async fn run(
    ctx: &Context,
    manifest_path: Option<&Path>,
    namespace: Option<&str>,
    options: &ObjectOptions,
) -> Result<()> {
    let targets: Vec<ObjectRef> = match manifest_path {
        Some(path) => manifest::load(path, namespace)?
            .iter()
            .map(|o| o.reference().clone())
            .collect(),
        None => ctx
            .records()?
            .list()
            .await?
            .into_iter()
            .map(|r| r.object)
            .collect(),
    };

    if targets.is_empty() {
        println!("No managed objects");
        return Ok(());
    }
    println!(
        "{} Refreshing {} object(s)",
        style("→").blue().bold(),
        targets.len()
    );

    let client = ctx.connect().await?;
    let mut results = Vec::with_capacity(targets.len());
    for object in targets {
        let result = client.refresh(&object, options).await?;
        results.push((object, result));
    }

    report(&results)
}
