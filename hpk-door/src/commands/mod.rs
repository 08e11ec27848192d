//! Commands module
//!
//! Defines all CLI commands and their handlers.

mod container;
mod init;

use anyhow::Result;
use clap::Subcommand;
use hpk_compute::ComputeConfig;

/// Top-level CLI commands
#[derive(Subcommand)]
pub enum Commands {
    /// Create the runtime directories and check the container runtime
    Init,
    /// Resolve, compile and submit a container
    Submit {
        /// Base64 encoded container JSON
        #[arg(long)]
        container: String,
    },
    /// Cancel a container's job and remove its artifacts
    Delete {
        /// Base64 encoded container JSON
        #[arg(long)]
        container: String,
    },
}

/// Handle a CLI command
///
/// Routes the command to the appropriate handler module.
pub fn handle_command(command: Commands, config: &ComputeConfig) -> Result<()> {
    match command {
        Commands::Init => init::handle_init(config),
        Commands::Submit { container } => container::handle_submit(&container, config),
        Commands::Delete { container } => container::handle_delete(&container, config),
    }
}
