//! Container command handlers
//!
//! Submits a container as a batch job, or cancels it again.

use anyhow::{Context, Result};
use colored::*;
use hpk_compute::{CommandRunner, ComputeConfig, SlurmBackend, SystemCommandRunner};
use std::sync::Arc;
use tracing::info;

use crate::payload;

/// Submit the container and print its job id
pub fn handle_submit(encoded: &str, config: &ComputeConfig) -> Result<()> {
    let job_id = submit(encoded, config, Arc::new(SystemCommandRunner))?;
    println!("{} {}", "Submitted batch job".green(), job_id.to_string().bold());
    Ok(())
}

/// Cancel the container's job and print its id
pub fn handle_delete(encoded: &str, config: &ComputeConfig) -> Result<()> {
    let job_id = delete(encoded, config, Arc::new(SystemCommandRunner))?;
    println!("{} {}", "Cancelled batch job".yellow(), job_id.to_string().bold());
    Ok(())
}

fn submit(encoded: &str, config: &ComputeConfig, runner: Arc<dyn CommandRunner>) -> Result<u64> {
    let container = payload::decode(encoded)?;
    info!(
        "Submitting container {} of pod {}/{}",
        container.spec.name, container.pod.namespace, container.pod.name
    );

    let backend = SlurmBackend::new(config, runner);
    backend
        .initialize()
        .context("Failed to create runtime directories")?;

    let previous = backend
        .recover_container(&container.pod, &container.spec.name)
        .with_context(|| format!("Failed to read job record of {}", container.spec.name))?;
    if let Some(job_id) = previous.and_then(|job| job.job_id) {
        info!("Container {} is already batch job {}", container.spec.name, job_id);
        return Ok(job_id);
    }

    let job = backend
        .create_container(&container.pod, &container.spec)
        .with_context(|| format!("Failed to submit container {}", container.spec.name))?;

    job.job_id
        .with_context(|| format!("No job id recorded for container {}", container.spec.name))
}

fn delete(encoded: &str, config: &ComputeConfig, runner: Arc<dyn CommandRunner>) -> Result<u64> {
    let container = payload::decode(encoded)?;
    info!(
        "Deleting container {} of pod {}/{}",
        container.spec.name, container.pod.namespace, container.pod.name
    );

    let backend = SlurmBackend::new(config, runner);
    backend
        .delete_container(&container.pod, &container.spec.name)
        .with_context(|| format!("Failed to delete container {}", container.spec.name))
}
