//! HPK Bridge
//!
//! Runs the pods a control plane assigns to this node as Slurm batch jobs.
//!
//! Architecture:
//! - Configuration: Load settings from environment or defaults
//! - Repositories: control plane access and remote status reads
//! - Services: container launch/cancel and status artifact probing
//! - Reconciler: per-pod state machine and status pushes
//! - Scheduler: pod sync and the reconciliation loop
//!
//! Each container becomes one batch job whose script writes the container's
//! exit code to a status artifact. The bridge polls those artifacts and
//! reports pod phases back to the control plane.

mod config;
mod error;
mod reconciler;
mod repository;
mod scheduler;
mod service;
#[cfg(test)]
mod testing;

use anyhow::{Context, Result};
use std::sync::Arc;
use tracing::{error, info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use crate::config::{Config, RemoteTarget};
use crate::reconciler::{Reconciler, StatusPolicy};
use crate::repository::{HttpPodRepository, LocalShell, PodRepository, RemoteExec, SshSession};
use crate::scheduler::PodPoller;
use crate::service::{JobLauncher, SlurmLauncher, StatusProbe};
use hpk_client::ControlPlaneClient;
use hpk_compute::{SlurmBackend, SystemCommandRunner};

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize logging
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "hpk_bridge=info,hpk_compute=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    info!("Starting HPK bridge");

    // Load configuration
    let config = load_config()?;
    info!(
        "Loaded configuration: node_name={}, control_plane_url={}, workdir={}",
        config.node_name,
        config.control_plane_url,
        config.compute.runtime_root.display()
    );

    // Prepare the compute side
    let backend = Arc::new(SlurmBackend::new(
        &config.compute,
        Arc::new(SystemCommandRunner),
    ));
    backend
        .initialize()
        .context("Failed to create runtime directories")?;

    if let Err(e) = backend.check_runtime() {
        warn!("Container runtime is not usable yet: {}", e);
    }

    let exec: Arc<dyn RemoteExec> = match &config.remote {
        RemoteTarget::Local => Arc::new(LocalShell),
        RemoteTarget::Ssh {
            host,
            port,
            user,
            key,
        } => {
            info!("Reading status artifacts over ssh from {}@{}:{}", user, host, port);
            Arc::new(SshSession::new(host.clone(), *port, user.clone(), key.clone()))
        }
    };

    // Initialize control plane client
    let client = Arc::new(ControlPlaneClient::new(config.control_plane_url.clone()));
    info!("Control plane client initialized for {}", client.base_url());
    let repository: Arc<dyn PodRepository> = Arc::new(HttpPodRepository::new(client));

    let launcher: Arc<dyn JobLauncher> = Arc::new(SlurmLauncher::new(backend));
    let reconciler = Reconciler::new(
        launcher,
        StatusProbe::new(exec),
        Arc::clone(&repository),
        StatusPolicy::from_config(&config),
        config.max_parallel_pods,
    );

    let poller = PodPoller::new(config.clone(), repository, reconciler);

    info!(
        "Bridge initialized: poll interval {:?}, status stale after {:?}, job timeout {:?}",
        config.poll_interval, config.status_stale_after, config.job_timeout
    );
    info!(
        "Status reads time out after {:?}, launches after {:?}",
        config.status_read_timeout, config.launch_timeout
    );

    // Start polling loop
    if let Err(e) = poller.run().await {
        error!("Poller error: {:#}", e);
        return Err(e);
    }

    Ok(())
}

/// Loads configuration from environment variables with fallback to defaults
fn load_config() -> Result<Config> {
    match Config::from_env() {
        Ok(config) => {
            config.validate()?;
            Ok(config)
        }
        Err(e) => {
            info!("Failed to load config from environment ({}), using defaults", e);
            let config = Config::default();
            config.validate()?;
            Ok(config)
        }
    }
}
