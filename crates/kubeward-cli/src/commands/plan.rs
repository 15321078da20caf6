//! Plan command - show the fields an apply would manage, offline

use kubeward_core::{IgnoreSet, Projection};
use kubeward_kube::planned_projection;
use serde::Serialize;
use std::path::Path;

use super::Context;
use crate::display;
use crate::error::{CliError, Result};
use crate::manifest;

#[derive(Serialize)]
struct PlannedObject {
    object: String,
    fields: Projection,
}

/// Run the plan command
pub fn run(
    ctx: &Context,
    manifest_path: &Path,
    namespace: Option<&str>,
    ignore: &[String],
    output_json: bool,
) -> Result<()> {
    let objects = manifest::load(manifest_path, namespace)?;
    let reserved = ctx.config.reserved_paths();
    let ignore = IgnoreSet::parse(ignore, &reserved).map_err(|e| {
        CliError::input_with_help(
            e.to_string(),
            format!(
                "ignore paths may not cover the identity annotation {}",
                ctx.config.identity_annotation
            ),
        )
    })?;

    let planned: Vec<PlannedObject> = objects
        .iter()
        .map(|o| PlannedObject {
            object: o.reference().to_string(),
            fields: planned_projection(o.document(), &ignore, &reserved),
        })
        .collect();

    if output_json {
        let json = serde_json::to_string_pretty(&planned).map_err(|e| CliError::Other {
            message: e.to_string(),
        })?;
        println!("{}", json);
        return Ok(());
    }

    for (object, plan) in objects.iter().zip(&planned) {
        display::print_projection(object.reference(), &plan.fields);
    }
    Ok(())
}
