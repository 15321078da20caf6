//! CLI commands

pub mod adopt;
pub mod apply;
pub mod destroy;
pub mod plan;
pub mod refresh;
pub mod show;

use kubeward_kube::{
    EngineConfig, FileRecordStore, KubeObjectStore, KubewardClient, ObjectResult,
};
use std::path::{Path, PathBuf};
use tracing::debug;

use crate::display;
use crate::error::{CliError, Result};

/// Settings shared by every command
pub struct Context {
    pub config: EngineConfig,
    pub state_dir: PathBuf,
}

impl Context {
    /// Load the configuration and resolve the state directory
    pub fn load(config_path: Option<&Path>, state_dir: Option<PathBuf>) -> Result<Self> {
        let config = match config_path {
            Some(path) => EngineConfig::load_from(path)?,
            None => EngineConfig::load()?,
        };
        let state_dir = match state_dir {
            Some(dir) => dir,
            None => default_state_dir()?,
        };
        debug!(state_dir = %state_dir.display(), field_manager = %config.field_manager, "Loaded context");
        Ok(Self { config, state_dir })
    }

    pub fn records(&self) -> Result<FileRecordStore> {
        Ok(FileRecordStore::new(&self.state_dir)?)
    }

    /// Connect to the cluster
    pub async fn connect(&self) -> Result<KubewardClient<KubeObjectStore, FileRecordStore>> {
        KubewardClient::connect(self.records()?, self.config.clone())
            .await
            .map_err(|e| CliError::cluster(e.to_string()))
    }
}

/// Default state directory under the user's data directory
fn default_state_dir() -> Result<PathBuf> {
    dirs::data_dir()
        .map(|d| d.join("kubeward").join("state"))
        .ok_or_else(|| CliError::input_with_help(
            "could not determine a data directory",
            "pass --state to choose where records are kept",
        ))
}

/// Print results and fail when any object reported an error
pub(crate) fn report(results: &[(kubeward_core::ObjectRef, ObjectResult)]) -> Result<()> {
    for (object, result) in results {
        display::print_result(object, result);
    }

    let failed = results
        .iter()
        .filter(|(_, r)| r.outcome.has_errors())
        .count();
    if failed > 0 {
        return Err(CliError::reconcile(failed, results.len()));
    }

    println!(
        "\n{} {} reconciled",
        console::style("✓").green().bold(),
        display::pluralize(results.len(), "object", "objects")
    );
    Ok(())
}
