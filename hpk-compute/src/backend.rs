//! Per-container job lifecycle
//!
//! Chains image resolution, script compilation and submission for a single
//! container, routes deletions to the job controller and adopts jobs left
//! behind by an earlier run.

use hpk_core::domain::container::ContainerSpec;
use hpk_core::domain::job::BatchJob;
use hpk_core::domain::pod::PodRef;
use std::io;
use std::sync::Arc;
use tracing::{debug, info, warn};

use crate::config::ComputeConfig;
use crate::error::{CancelError, ComputeError, ImageError};
use crate::image::ImageResolver;
use crate::layout::RuntimeDirs;
use crate::process::CommandRunner;
use crate::script::ScriptCompiler;
use crate::slurm::JobController;

pub struct SlurmBackend {
    dirs: RuntimeDirs,
    resolver: ImageResolver,
    compiler: ScriptCompiler,
    controller: JobController,
}

impl SlurmBackend {
    pub fn new(config: &ComputeConfig, runner: Arc<dyn CommandRunner>) -> Self {
        Self {
            dirs: config.dirs(),
            resolver: ImageResolver::new(config, runner.clone()),
            compiler: ScriptCompiler::new(config),
            controller: JobController::new(config, runner),
        }
    }

    /// Creates the runtime directory tree
    pub fn initialize(&self) -> io::Result<()> {
        self.dirs.initialize()
    }

    /// Checks that the container runtime answers
    pub fn check_runtime(&self) -> Result<String, ImageError> {
        self.resolver.check_runtime()
    }

    /// Resolves, compiles and submits one container
    ///
    /// Images given as filesystem paths skip resolution. `spec` must already
    /// carry the pod's annotations.
    pub fn create_container(
        &self,
        pod: &PodRef,
        spec: &ContainerSpec,
    ) -> Result<BatchJob, ComputeError> {
        if spec.image_is_path() {
            debug!("Image {} is a path, skipping resolution", spec.image);
        } else {
            let resolved = self.resolver.resolve(&spec.image)?;
            debug!(
                "Container {} uses image {} ({})",
                spec.name,
                resolved.runtime_name,
                resolved.artifact_path.display()
            );
        }

        let workdir = self.dirs.pod_workdir(pod);
        let mut job = self.compiler.compile(pod, spec, &workdir)?;
        self.controller.submit(&mut job, pod.uid)?;

        info!(
            "Container {} of pod {}/{} is batch job {}",
            spec.name,
            pod.namespace,
            pod.name,
            job.job_id.unwrap_or_default()
        );
        Ok(job)
    }

    /// Cancels the container's job and removes its artifacts
    pub fn delete_container(&self, pod: &PodRef, container: &str) -> Result<u64, CancelError> {
        let job = self.batch_job(pod, container);
        self.controller.cancel(&job)
    }

    /// Adopts the job an earlier run submitted for this container
    ///
    /// A job id file owned by another pod, e.g. one that was recreated under
    /// the same name, is cancelled and its artifacts removed.
    ///
    /// # Returns
    /// The recorded job when the record belongs to `pod`
    pub fn recover_container(
        &self,
        pod: &PodRef,
        container: &str,
    ) -> Result<Option<BatchJob>, CancelError> {
        let mut job = self.batch_job(pod, container);
        let record = match self.controller.read_record(&job) {
            Ok(record) => record,
            Err(e) if e.is_not_found() => return Ok(None),
            Err(e) => return Err(e),
        };

        if record.owner == Some(pod.uid) {
            info!(
                "Adopting batch job {} of container {} of pod {}/{}",
                record.job_id, container, pod.namespace, pod.name
            );
            job.job_id = Some(record.job_id);
            return Ok(Some(job));
        }

        warn!(
            "Batch job {} of container {} was submitted for another pod {}/{}, cancelling it",
            record.job_id, container, pod.namespace, pod.name
        );
        if let Err(e) = self.controller.cancel(&job) {
            warn!("Failed to cancel batch job {}: {}", record.job_id, e);
            self.controller.cleanup(&job);
        }
        Ok(None)
    }

    /// Removes the container's artifacts without contacting the scheduler
    pub fn cleanup_container(&self, pod: &PodRef, container: &str) {
        let job = self.batch_job(pod, container);
        self.controller.cleanup(&job);
    }

    /// Artifact locations of a container, whether submitted or not
    pub fn batch_job(&self, pod: &PodRef, container: &str) -> BatchJob {
        self.dirs.pod_workdir(pod).batch_job(container)
    }

    pub fn dirs(&self) -> &RuntimeDirs {
        &self.dirs
    }
}
