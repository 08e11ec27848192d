//! HPK Door
//!
//! Command-line tool run on the cluster login node. It acts on a single
//! container handed over as base64 encoded JSON: submitting it as a batch
//! job or cancelling that job again.

mod commands;
mod config;
mod payload;

use anyhow::Result;
use clap::Parser;
use commands::{Commands, handle_command};
use config::ComputeArgs;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Parser)]
#[command(name = "hpk-door")]
#[command(about = "Run containers as Slurm batch jobs", long_about = None)]
struct Cli {
    #[command(flatten)]
    compute: ComputeArgs,

    #[command(subcommand)]
    command: Commands,
}

fn main() -> Result<()> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "hpk_door=info,hpk_compute=info".into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    let cli = Cli::parse();
    let config = cli.compute.into_config();

    handle_command(cli.command, &config)
}
