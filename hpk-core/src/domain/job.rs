//! Batch job domain types

use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// One scheduler-tracked unit of work produced from a container spec
///
/// Created by the script compiler; `job_id` is filled in once the scheduler
/// accepts the submission.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BatchJob {
    pub container_name: String,
    pub script_path: PathBuf,
    pub job_id: Option<u64>,
    pub stdout_path: PathBuf,
    pub stderr_path: PathBuf,
    /// Written by the job script with the exit code of the container process
    pub status_path: PathBuf,
    /// Holds the scheduler job id across restarts
    pub job_id_path: PathBuf,
    pub scratch_dir: PathBuf,
}

impl BatchJob {
    pub fn is_submitted(&self) -> bool {
        self.job_id.is_some()
    }
}
