//! Batch job submission and cancellation
//!
//! The scheduler job id is the only handle on a submitted job. It is written
//! next to the script in a `.jid` file together with the uid of the owning
//! pod, so a restarted bridge can adopt the job and a cancellation never
//! depends on in-memory state.

use chrono::Utc;
use hpk_core::domain::job::BatchJob;
use hpk_core::domain::pod::PodId;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{debug, info, warn};

use crate::config::ComputeConfig;
use crate::error::{CancelError, SubmitError};
use crate::process::CommandRunner;

/// Prefix of the scheduler's acknowledgement line
pub const SUBMITTED_PREFIX: &str = "Submitted batch job ";

/// Extracts the job id from the scheduler's submission response
///
/// Only the digits directly following [`SUBMITTED_PREFIX`] count.
pub fn parse_job_id(output: &str) -> Option<u64> {
    let (_, rest) = output.split_once(SUBMITTED_PREFIX)?;
    let digits: String = rest.chars().take_while(char::is_ascii_digit).collect();
    digits.parse().ok()
}

/// Contents of a `.jid` file: the job id, then the owning pod's uid
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct JobRecord {
    pub job_id: u64,
    /// Absent in records written without an owner
    pub owner: Option<PodId>,
}

impl JobRecord {
    pub fn parse(content: &str) -> Option<Self> {
        let mut lines = content.lines().map(str::trim);
        let job_id = lines.next()?.parse().ok()?;
        let owner = lines.next().and_then(|uid| uid.parse().ok());
        Some(Self { job_id, owner })
    }

    pub fn render(&self) -> String {
        match self.owner {
            Some(owner) => format!("{}\n{}\n", self.job_id, owner),
            None => format!("{}\n", self.job_id),
        }
    }
}

/// Submits and cancels batch jobs through the scheduler CLI
pub struct JobController {
    runner: Arc<dyn CommandRunner>,
    sbatch_bin: String,
    scancel_bin: String,
    corrupted_dir: PathBuf,
}

impl JobController {
    pub fn new(config: &ComputeConfig, runner: Arc<dyn CommandRunner>) -> Self {
        Self {
            runner,
            sbatch_bin: config.sbatch_bin.clone(),
            scancel_bin: config.scancel_bin.clone(),
            corrupted_dir: config.dirs().corrupted_dir(),
        }
    }

    /// Submits the job's script and records the returned job id
    ///
    /// The id is stored both in `job` and in its job id file, next to the
    /// uid of the pod that owns the job.
    pub fn submit(&self, job: &mut BatchJob, owner: PodId) -> Result<u64, SubmitError> {
        let args = vec![job.script_path.to_string_lossy().to_string()];
        let output = self
            .runner
            .run(&self.sbatch_bin, &args)
            .map_err(|e| SubmitError::Scheduler {
                script: job.script_path.clone(),
                message: e.to_string(),
            })?;

        if !output.success() {
            return Err(SubmitError::Scheduler {
                script: job.script_path.clone(),
                message: output.describe(),
            });
        }

        let job_id = parse_job_id(&output.stdout)
            .ok_or_else(|| SubmitError::MalformedResponse(output.stdout.trim().to_string()))?;

        let record = JobRecord {
            job_id,
            owner: Some(owner),
        };
        fs::write(&job.job_id_path, record.render()).map_err(|source| SubmitError::Persist {
            path: job.job_id_path.clone(),
            source,
        })?;
        job.job_id = Some(job_id);

        info!(
            "Submitted container {} as batch job {}",
            job.container_name, job_id
        );
        Ok(job_id)
    }

    /// Reads the job id file of `job`
    ///
    /// A record that does not start with a job id is moved to the corrupted
    /// directory so it can be inspected later.
    pub fn read_record(&self, job: &BatchJob) -> Result<JobRecord, CancelError> {
        let content = match fs::read_to_string(&job.job_id_path) {
            Ok(content) => content,
            Err(e) if e.kind() == io::ErrorKind::NotFound => {
                return Err(CancelError::NotFound {
                    container: job.container_name.clone(),
                    path: job.job_id_path.clone(),
                });
            }
            Err(e) => {
                return Err(CancelError::CorruptRecord {
                    container: job.container_name.clone(),
                    content: e.to_string(),
                });
            }
        };

        JobRecord::parse(&content).ok_or_else(|| {
            self.quarantine(&job.job_id_path);
            CancelError::CorruptRecord {
                container: job.container_name.clone(),
                content,
            }
        })
    }

    /// Cancels the job recorded in the job id file and removes its artifacts
    pub fn cancel(&self, job: &BatchJob) -> Result<u64, CancelError> {
        let job_id = self.read_record(job)?.job_id;

        let output = self
            .runner
            .run(&self.scancel_bin, &[job_id.to_string()])
            .map_err(|e| CancelError::Rejected {
                job_id,
                message: e.to_string(),
            })?;

        if !output.success() {
            return Err(CancelError::Rejected {
                job_id,
                message: output.describe(),
            });
        }

        info!(
            "Cancelled batch job {} of container {}",
            job_id, job.container_name
        );
        self.cleanup(job);
        Ok(job_id)
    }

    /// Removes every artifact of the job; failures are logged, not returned
    pub fn cleanup(&self, job: &BatchJob) {
        for path in [
            &job.script_path,
            &job.stdout_path,
            &job.stderr_path,
            &job.status_path,
            &job.job_id_path,
        ] {
            remove_logged(path, fs::remove_file(path));
        }
        remove_logged(&job.scratch_dir, fs::remove_dir_all(&job.scratch_dir));
    }

    fn quarantine(&self, path: &Path) {
        let file_name = path
            .file_name()
            .map(|name| name.to_string_lossy().to_string())
            .unwrap_or_else(|| "record".to_string());
        let target = self.corrupted_dir.join(format!(
            "{}.{}",
            file_name,
            Utc::now().format("%Y%m%dT%H%M%S%.3f")
        ));

        match fs::rename(path, &target) {
            Ok(()) => warn!(
                "Moved corrupt record {} to {}",
                path.display(),
                target.display()
            ),
            Err(e) => warn!("Failed to quarantine {}: {}", path.display(), e),
        }
    }
}

fn remove_logged(path: &Path, result: io::Result<()>) {
    match result {
        Ok(()) => debug!("Removed {}", path.display()),
        Err(e) if e.kind() == io::ErrorKind::NotFound => {}
        Err(e) => warn!("Failed to remove {}: {}", path.display(), e),
    }
}
