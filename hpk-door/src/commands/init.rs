//! Init command handler
//!
//! Prepares the runtime directory tree on a fresh login node.

use anyhow::{Context, Result};
use colored::*;
use hpk_compute::{ComputeConfig, SlurmBackend, SystemCommandRunner};
use std::sync::Arc;

/// Create the runtime directories and report the container runtime version
pub fn handle_init(config: &ComputeConfig) -> Result<()> {
    let backend = SlurmBackend::new(config, Arc::new(SystemCommandRunner));
    backend
        .initialize()
        .context("Failed to create runtime directories")?;

    let dirs = backend.dirs();
    println!("{}", "Runtime directories ready".green().bold());
    println!("  Root:       {}", dirs.root().display());
    println!("  Images:     {}", dirs.image_dir().display());
    println!("  Corrupted:  {}", dirs.corrupted_dir().display());
    println!("  Pods:       {}", dirs.pods_dir().display());

    match backend.check_runtime() {
        Ok(version) => println!("  Runtime:    {}", version.cyan()),
        Err(e) => println!("  Runtime:    {}", e.to_string().yellow()),
    }

    Ok(())
}
