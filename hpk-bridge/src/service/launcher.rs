//! Job launcher
//!
//! Turns containers into batch jobs and cancels them again. The compute
//! backend blocks on subprocesses and the filesystem, so every call hops onto
//! the blocking thread pool.

use anyhow::{Context, Result};
use async_trait::async_trait;
use hpk_compute::SlurmBackend;
use hpk_core::domain::container::ContainerSpec;
use hpk_core::domain::job::BatchJob;
use hpk_core::domain::pod::PodRef;
use std::sync::Arc;
use tracing::{debug, info};

use crate::error::LaunchError;

/// Service trait for the container to batch job lifecycle
#[async_trait]
pub trait JobLauncher: Send + Sync {
    /// Resolves, compiles and submits one container
    ///
    /// # Arguments
    /// * `pod` - Identity of the owning pod
    /// * `spec` - Container spec with the pod annotations folded in
    ///
    /// # Returns
    /// The submitted batch job
    async fn launch(&self, pod: &PodRef, spec: &ContainerSpec) -> Result<BatchJob, LaunchError>;

    /// Cancels the container's job and removes its artifacts
    ///
    /// A container without a recorded job only has its artifacts removed.
    ///
    /// # Returns
    /// The cancelled job id, if there was one
    async fn cancel(&self, pod: &PodRef, container: &str) -> Result<Option<u64>>;

    /// Removes the artifacts of a container whose job already finished
    async fn cleanup(&self, pod: &PodRef, container: &str) -> Result<()>;

    /// Looks up a job submitted for the container before the bridge restarted
    ///
    /// # Returns
    /// The adopted job, or `None` when the container still has to be launched
    async fn recover(&self, pod: &PodRef, container: &str) -> Result<Option<BatchJob>>;
}

/// JobLauncher backed by the Slurm compute backend
pub struct SlurmLauncher {
    backend: Arc<SlurmBackend>,
}

impl SlurmLauncher {
    pub fn new(backend: Arc<SlurmBackend>) -> Self {
        Self { backend }
    }
}

#[async_trait]
impl JobLauncher for SlurmLauncher {
    async fn launch(&self, pod: &PodRef, spec: &ContainerSpec) -> Result<BatchJob, LaunchError> {
        let backend = Arc::clone(&self.backend);
        let pod = pod.clone();
        let spec = spec.clone();

        let job = tokio::task::spawn_blocking(move || backend.create_container(&pod, &spec))
            .await??;
        Ok(job)
    }

    async fn cancel(&self, pod: &PodRef, container: &str) -> Result<Option<u64>> {
        let backend = Arc::clone(&self.backend);
        let pod = pod.clone();
        let container = container.to_string();

        let cancelled = tokio::task::spawn_blocking(move || {
            match backend.delete_container(&pod, &container) {
                Ok(job_id) => Ok(Some(job_id)),
                Err(e) if e.is_not_found() => {
                    debug!("Container {} has no job, removing artifacts", container);
                    backend.cleanup_container(&pod, &container);
                    Ok(None)
                }
                Err(e) => Err(e),
            }
        })
        .await
        .context("Cancel task failed")??;

        if let Some(job_id) = cancelled {
            info!("Cancelled batch job {}", job_id);
        }
        Ok(cancelled)
    }

    async fn cleanup(&self, pod: &PodRef, container: &str) -> Result<()> {
        let backend = Arc::clone(&self.backend);
        let pod = pod.clone();
        let container = container.to_string();

        tokio::task::spawn_blocking(move || backend.cleanup_container(&pod, &container))
            .await
            .context("Cleanup task failed")
    }

    async fn recover(&self, pod: &PodRef, container: &str) -> Result<Option<BatchJob>> {
        let backend = Arc::clone(&self.backend);
        let pod = pod.clone();
        let container = container.to_string();

        let job = tokio::task::spawn_blocking(move || backend.recover_container(&pod, &container))
            .await
            .context("Recover task failed")??;
        Ok(job)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use hpk_compute::{CommandOutput, CommandRunner, ComputeConfig, ComputeError};
    use hpk_core::domain::pod::Pod;
    use std::io;

    /// Fails every subprocess call
    struct NoBinaries;

    impl CommandRunner for NoBinaries {
        fn run(&self, program: &str, _args: &[String]) -> io::Result<CommandOutput> {
            Err(io::Error::new(io::ErrorKind::NotFound, program.to_string()))
        }
    }

    fn launcher(root: &std::path::Path) -> SlurmLauncher {
        let config = ComputeConfig::new(root.join(".hpk"));
        let backend = SlurmBackend::new(&config, Arc::new(NoBinaries));
        backend.initialize().unwrap();
        SlurmLauncher::new(Arc::new(backend))
    }

    #[tokio::test]
    async fn test_launch_surfaces_compute_errors() {
        let tmp = tempfile::tempdir().unwrap();
        let pod = Pod::new("ns", "pod").pod_ref();
        let spec = ContainerSpec::new("main", "busybox");

        let err = launcher(tmp.path()).launch(&pod, &spec).await.unwrap_err();

        assert!(matches!(err, LaunchError::Compute(ComputeError::Image(_))));
    }

    #[tokio::test]
    async fn test_cancel_without_job_only_cleans_up() {
        let tmp = tempfile::tempdir().unwrap();
        let launcher = launcher(tmp.path());
        let pod = Pod::new("ns", "pod").pod_ref();
        let job = launcher.backend.batch_job(&pod, "main");
        std::fs::create_dir_all(job.script_path.parent().unwrap()).unwrap();
        std::fs::write(&job.script_path, "#!/bin/bash\n").unwrap();

        let cancelled = launcher.cancel(&pod, "main").await.unwrap();

        assert_eq!(cancelled, None);
        assert!(!job.script_path.exists());
    }

    #[tokio::test]
    async fn test_recover_reads_job_record() {
        let tmp = tempfile::tempdir().unwrap();
        let launcher = launcher(tmp.path());
        let pod = Pod::new("ns", "pod").pod_ref();
        let job = launcher.backend.batch_job(&pod, "main");
        std::fs::create_dir_all(job.job_id_path.parent().unwrap()).unwrap();

        assert!(launcher.recover(&pod, "main").await.unwrap().is_none());

        std::fs::write(&job.job_id_path, format!("31\n{}\n", pod.uid)).unwrap();
        let recovered = launcher.recover(&pod, "main").await.unwrap().unwrap();
        assert_eq!(recovered.job_id, Some(31));
    }
}
