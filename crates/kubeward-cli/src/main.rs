//! Kubeward CLI - field-ownership aware apply, refresh and destroy for Kubernetes objects

use clap::{Args, Parser, Subcommand};
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

mod commands;
mod display;
mod error;
mod exit_codes;
mod manifest;

use commands::Context;
use error::Result;

#[derive(Parser)]
#[command(name = "kubeward")]
#[command(author = "Kubeward Contributors")]
#[command(version)]
#[command(about = "Server-side apply with field ownership tracking", long_about = None)]
#[command(propagate_version = true)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Enable debug output
    #[arg(long, global = true)]
    debug: bool,

    /// Engine configuration file
    #[arg(long, global = true, env = "KUBEWARD_CONFIG")]
    config: Option<PathBuf>,

    /// Directory holding resource records
    #[arg(long, global = true, env = "KUBEWARD_STATE")]
    state: Option<PathBuf>,

    /// Namespace for namespaced objects that do not set one
    #[arg(short, long, global = true)]
    namespace: Option<String>,
}

/// Per-object options shared by the cluster commands
#[derive(Args)]
struct ObjectFlags {
    /// Field path to leave unmanaged (repeatable)
    #[arg(long = "ignore")]
    ignore: Vec<String>,

    /// Refuse to delete the objects
    #[arg(long)]
    delete_protection: bool,

    /// Strip finalizers when deletion times out
    #[arg(long)]
    force_destroy: bool,

    /// Never delete the objects, only forget them
    #[arg(long)]
    apply_only: bool,

    /// Deletion timeout in seconds
    #[arg(long)]
    timeout: Option<u64>,

    /// Deletion propagation (background, foreground, orphan)
    #[arg(long)]
    propagation: Option<String>,
}

impl ObjectFlags {
    fn options(&self) -> Result<kubeward_kube::ObjectOptions> {
        manifest::options(
            &self.ignore,
            self.delete_protection,
            self.force_destroy,
            self.apply_only,
            self.timeout,
            self.propagation.as_deref(),
        )
    }
}

#[derive(Subcommand)]
enum Commands {
    /// Apply the objects of a manifest
    Apply {
        /// Manifest file (multi-document YAML)
        #[arg(short = 'f', long = "file")]
        file: PathBuf,

        #[command(flatten)]
        flags: ObjectFlags,
    },

    /// Read managed objects back and report drift
    Refresh {
        /// Manifest file; all managed objects when omitted
        #[arg(short = 'f', long = "file")]
        file: Option<PathBuf>,

        #[command(flatten)]
        flags: ObjectFlags,
    },

    /// Delete the objects of a manifest
    Destroy {
        /// Manifest file (multi-document YAML)
        #[arg(short = 'f', long = "file")]
        file: PathBuf,

        #[command(flatten)]
        flags: ObjectFlags,
    },

    /// Start managing objects that already exist in the cluster
    Adopt {
        /// Manifest file (multi-document YAML)
        #[arg(short = 'f', long = "file")]
        file: PathBuf,

        #[command(flatten)]
        flags: ObjectFlags,
    },

    /// Show the fields an apply would manage, without contacting the cluster
    Plan {
        /// Manifest file (multi-document YAML)
        #[arg(short = 'f', long = "file")]
        file: PathBuf,

        /// Field path to leave unmanaged (repeatable)
        #[arg(long = "ignore")]
        ignore: Vec<String>,

        /// Output as JSON
        #[arg(long)]
        json: bool,
    },

    /// List resource records
    Show {
        /// Also print every recorded field
        #[arg(long)]
        fields: bool,

        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
}

fn init_tracing(debug: bool) {
    let default = if debug { "kubeward=debug,kubeward_kube=debug" } else { "warn" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(debug)
        .init();
}

async fn run(cli: Cli) -> Result<()> {
    let ctx = Context::load(cli.config.as_deref(), cli.state)?;
    let namespace = cli.namespace.as_deref();

    match cli.command {
        Commands::Apply { file, flags } => {
            commands::apply::run(&ctx, &file, namespace, &flags.options()?).await
        }
        Commands::Refresh { file, flags } => {
            commands::refresh::run(&ctx, file.as_deref(), namespace, &flags.options()?).await
        }
        Commands::Destroy { file, flags } => {
            commands::destroy::run(&ctx, &file, namespace, &flags.options()?).await
        }
        Commands::Adopt { file, flags } => {
            commands::adopt::run(&ctx, &file, namespace, &flags.options()?).await
        }
        Commands::Plan { file, ignore, json } => {
            commands::plan::run(&ctx, &file, namespace, &ignore, json)
        }
        Commands::Show { fields, json } => commands::show::run(&ctx, fields, json).await,
    }
}

#[tokio::main]
async fn main() {
    miette::set_panic_hook();

    let cli = Cli::parse();
    init_tracing(cli.debug);

    if let Err(err) = run(cli).await {
        let code = err.exit_code();
        eprintln!("{:?}", miette::Report::new(err));
        std::process::exit(code);
    }
}
