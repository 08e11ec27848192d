//! Batch script compilation
//!
//! Turns a container spec into a self-contained Slurm script that runs the
//! container under the apptainer runtime and records its exit code in the
//! container's status artifact. That status file is the only completion
//! signal the bridge observes.

use hpk_core::domain::container::{
    ANNOTATION_IMAGE_ROOT, ANNOTATION_MPI_FLAGS, ANNOTATION_SLURM_FLAGS, ContainerSpec, EnvVar,
    VolumeMount,
};
use hpk_core::domain::job::BatchJob;
use hpk_core::domain::pod::PodRef;
use std::fs;
use std::path::Path;
use tracing::{debug, info};

use crate::config::ComputeConfig;
use crate::error::ScriptError;
use crate::layout::{PodWorkDir, create_dir};

/// Value of the MPI annotation that leaves the command unwrapped
pub const MPI_DISABLED: &str = "true";

/// Scheme used to address registry images from inside a job
pub const REMOTE_IMAGE_SCHEME: &str = "docker://";

/// Task count variable exported by Slurm to the job
const SLURM_TASK_COUNT: &str = "$SLURM_NTASKS";

/// Compiles container specs into batch scripts
pub struct ScriptCompiler {
    apptainer_bin: String,
}

impl ScriptCompiler {
    pub fn new(config: &ComputeConfig) -> Self {
        Self {
            apptainer_bin: config.apptainer_bin.clone(),
        }
    }

    /// Writes the job script for `spec` into the pod working directory
    ///
    /// Creates the working directory, the container scratch directory and the
    /// volume source directories on the way. Output and status artifacts of
    /// an earlier run of the container are removed, so the new job starts
    /// from empty logs and without an exit code.
    ///
    /// # Returns
    /// The batch job record, ready for submission
    pub fn compile(
        &self,
        pod: &PodRef,
        spec: &ContainerSpec,
        workdir: &PodWorkDir,
    ) -> Result<BatchJob, ScriptError> {
        let job = workdir.batch_job(&spec.name);
        let script = self.render(pod, spec, workdir, &job)?;

        let io_err = |path: &Path| {
            let path = path.to_path_buf();
            move |source: std::io::Error| ScriptError::Io { path, source }
        };

        workdir.create().map_err(io_err(workdir.path()))?;
        for stale in [&job.status_path, &job.stdout_path, &job.stderr_path] {
            match fs::remove_file(stale) {
                Ok(()) => debug!("Removed stale artifact {}", stale.display()),
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
                Err(e) => return Err(io_err(stale)(e)),
            }
        }
        create_dir(&job.scratch_dir).map_err(io_err(&job.scratch_dir))?;
        for mount in &spec.volume_mounts {
            let source = workdir.volume_source(&mount.name);
            create_dir(&source).map_err(io_err(&source))?;
        }

        fs::write(&job.script_path, script).map_err(io_err(&job.script_path))?;
        #[cfg(unix)]
        fs::set_permissions(
            &job.script_path,
            <fs::Permissions as std::os::unix::fs::PermissionsExt>::from_mode(0o750),
        )
        .map_err(io_err(&job.script_path))?;

        info!(
            "Compiled job script for container {} of pod {}/{}: {}",
            spec.name,
            pod.namespace,
            pod.name,
            job.script_path.display()
        );
        Ok(job)
    }

    /// Renders the script text without touching the filesystem
    pub fn render(
        &self,
        pod: &PodRef,
        spec: &ContainerSpec,
        workdir: &PodWorkDir,
        job: &BatchJob,
    ) -> Result<String, ScriptError> {
        let image = effective_image(spec)?;

        let mut command: Vec<String> = Vec::new();
        if let Some(prefix) = mpi_prefix(spec)? {
            command.extend(prefix);
        }
        command.push(quote(&self.apptainer_bin)?);
        command.push("exec".to_string());

        let env = env_argument(&spec.env);
        if !env.is_empty() {
            command.push("--env".to_string());
            command.push(quote(&env)?);
        }

        let mounts = mount_argument(&spec.volume_mounts, workdir);
        if !mounts.is_empty() {
            command.push("--bind".to_string());
            command.push(quote(&mounts)?);
        }

        command.push(quote(&image)?);
        for arg in spec.command.iter().chain(spec.args.iter()) {
            command.push(quote(arg)?);
        }

        let mut script = String::from("#!/bin/bash\n");
        script.push_str(&format!("#SBATCH --job-name={}\n", pod.job_name(&spec.name)));
        for directive in scheduler_directives(spec) {
            script.push_str(&format!("#SBATCH {}\n", directive));
        }
        script.push_str(". ~/.bash_profile\n");
        script.push_str("pwd; hostname; date\n\n");
        script.push_str(&format!(
            "{} >> {} 2>> {}\n",
            command.join(" "),
            quote_path(&job.stdout_path)?,
            quote_path(&job.stderr_path)?
        ));
        script.push_str(&format!("echo $? > {}\n", quote_path(&job.status_path)?));

        debug!("Rendered script for container {}:\n{}", spec.name, script);
        Ok(script)
    }
}

/// `NAME=VALUE` pairs joined by commas; empty when there is no env
pub fn env_argument(env: &[EnvVar]) -> String {
    env.iter()
        .map(|var| format!("{}={}", var.name, var.value))
        .collect::<Vec<_>>()
        .join(",")
}

/// `<workdir>/<volume>:<mountPath>` pairs joined by commas
pub fn mount_argument(mounts: &[VolumeMount], workdir: &PodWorkDir) -> String {
    mounts
        .iter()
        .map(|mount| {
            format!(
                "{}:{}",
                workdir.volume_source(&mount.name).display(),
                mount.mount_path
            )
        })
        .collect::<Vec<_>>()
        .join(",")
}

/// Image designator handed to the runtime inside the job
///
/// Absolute paths are prefixed with the image-root annotation, registry
/// references go through the remote pull scheme with their digest removed.
pub fn effective_image(spec: &ContainerSpec) -> Result<String, ScriptError> {
    if spec.image_is_path() {
        return match spec.annotation(ANNOTATION_IMAGE_ROOT) {
            Some(root) => Ok(format!("{}{}", root, spec.image)),
            None => Err(ScriptError::MissingImageRoot(spec.image.clone())),
        };
    }

    let reference = spec.image_reference()?;
    Ok(format!("{}{}", REMOTE_IMAGE_SCHEME, reference.runtime_name()))
}

/// One directive per whitespace-separated token of the flags annotation
fn scheduler_directives(spec: &ContainerSpec) -> Vec<String> {
    spec.annotation(ANNOTATION_SLURM_FLAGS)
        .map(|flags| flags.split_whitespace().map(str::to_string).collect())
        .unwrap_or_default()
}

/// `mpiexec -np $SLURM_NTASKS <flags...>` when the MPI annotation asks for it
fn mpi_prefix(spec: &ContainerSpec) -> Result<Option<Vec<String>>, ScriptError> {
    let flags = match spec.annotation(ANNOTATION_MPI_FLAGS) {
        Some(flags) if flags.trim() != MPI_DISABLED => flags,
        _ => return Ok(None),
    };

    let mut prefix = vec![
        "mpiexec".to_string(),
        "-np".to_string(),
        SLURM_TASK_COUNT.to_string(),
    ];
    for flag in flags.split_whitespace() {
        prefix.push(quote(flag)?);
    }
    Ok(Some(prefix))
}

fn quote(value: &str) -> Result<String, ScriptError> {
    shlex::try_quote(value)
        .map(|quoted| quoted.into_owned())
        .map_err(|_| ScriptError::Unquotable(value.to_string()))
}

fn quote_path(path: &Path) -> Result<String, ScriptError> {
    quote(&path.to_string_lossy())
}
