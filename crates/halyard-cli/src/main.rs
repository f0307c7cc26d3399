//! halyard — deploy declarative bundles against a running model.
//!
//! ```text
//! halyard deploy bundle.yaml --api http://10.0.0.1:17070
//! halyard plan bundle.yaml
//! ```
//!
//! `deploy` applies the bundle through the control-plane API, printing
//! one progress line per change; `plan` prints the planned change list
//! as JSON without touching the model.

use std::fs;
use std::path::PathBuf;
use std::process::ExitCode;

use anyhow::Context;
use clap::{Parser, Subcommand};

use halyard_api::{HttpCharmSource, HttpModelClient};
use halyard_bundle::{BundleData, Constraints};
use halyard_deploy::{deploy_bundle, StdoutProgress};

#[derive(Parser)]
#[command(
    name = "halyard",
    about = "Halyard — declarative bundle deployment",
    version,
    propagate_version = true,
)]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Deploy a bundle against the model.
    Deploy {
        /// Path to the bundle YAML file.
        bundle: PathBuf,

        /// Control-plane API endpoint.
        #[arg(long, env = "HALYARD_API", default_value = "http://127.0.0.1:17070")]
        api: String,

        /// Charm store endpoint.
        #[arg(
            long,
            env = "HALYARD_CHARM_STORE",
            default_value = "http://127.0.0.1:17071"
        )]
        charm_store: String,
    },
    /// Print the planned changes for a bundle as JSON.
    Plan {
        /// Path to the bundle YAML file.
        bundle: PathBuf,
    },
}

#[tokio::main]
async fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    match run(cli).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            eprintln!("{err:#}");
            ExitCode::FAILURE
        }
    }
}

async fn run(cli: Cli) -> anyhow::Result<()> {
    match cli.command {
        Command::Deploy {
            bundle,
            api,
            charm_store,
        } => {
            let data = read_bundle(&bundle).context("cannot deploy bundle")?;
            let client = HttpModelClient::new(&api);
            let charms = HttpCharmSource::new(&charm_store);
            deploy_bundle(&data, &client, &charms, &StdoutProgress)
                .await
                .context("cannot deploy bundle")?;
            println!("deployment of bundle {:?} completed", bundle.display().to_string());
            Ok(())
        }
        Command::Plan { bundle } => {
            let data = read_bundle(&bundle).context("cannot plan bundle")?;
            data.validate(|s| Constraints::parse(s).map(|_| ()))
                .context("cannot plan bundle")?;
            let changes = halyard_plan::plan(&data).context("cannot plan bundle")?;
            let wire = halyard_plan::encode(&changes);
            println!("{}", serde_json::to_string_pretty(&wire)?);
            Ok(())
        }
    }
}

fn read_bundle(path: &PathBuf) -> anyhow::Result<BundleData> {
    let text = fs::read_to_string(path)
        .with_context(|| format!("cannot read bundle {:?}", path.display().to_string()))?;
    Ok(BundleData::from_yaml(&text)?)
}
