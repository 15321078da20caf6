//! Show command - list persisted records without contacting the cluster

use kubeward_kube::RecordStore;

use super::Context;
use crate::display;
use crate::error::Result;

/// Run the show command
pub async fn run(ctx: &Context, fields: bool, output_json: bool) -> Result<()> {
    let records = ctx.records()?.list().await?;

    if output_json {
        let json = serde_json::to_string_pretty(&records).map_err(|e| {
            crate::error::CliError::Other {
                message: e.to_string(),
            }
        })?;
        println!("{}", json);
        return Ok(());
    }

    display::print_records(&records);
    if fields {
        for record in &records {
            println!();
            display::print_projection(&record.object, &record.state.projection);
        }
    }
    Ok(())
}
