//! Error types for the compute side

use hpk_core::domain::image::ImageReferenceError;
use std::path::PathBuf;
use thiserror::Error;

/// Image resolution failed
#[derive(Debug, Error)]
pub enum ImageError {
    #[error("invalid image reference: {0}")]
    InvalidReference(#[from] ImageReferenceError),

    #[error("failed to query image inventory: {0}")]
    Inventory(String),

    #[error("failed to pull image '{image}': {message}")]
    Pull { image: String, message: String },
}

/// Batch script could not be produced
#[derive(Debug, Error)]
pub enum ScriptError {
    #[error("invalid image reference: {0}")]
    InvalidImage(#[from] ImageReferenceError),

    #[error("image '{0}' is a filesystem path but annotation 'slurm-job.hpk.io/image-root' is not set")]
    MissingImageRoot(String),

    #[error("argument cannot be shell quoted: {0:?}")]
    Unquotable(String),

    #[error("failed to write '{}': {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

/// Batch submission failed
#[derive(Debug, Error)]
pub enum SubmitError {
    #[error("scheduler rejected submission of '{}': {message}", script.display())]
    Scheduler { script: PathBuf, message: String },

    #[error("unexpected scheduler response: {0:?}")]
    MalformedResponse(String),

    #[error("failed to persist job id to '{}': {source}", path.display())]
    Persist {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

/// Batch cancellation failed
#[derive(Debug, Error)]
pub enum CancelError {
    #[error("no job id recorded for container '{container}' at '{}'", path.display())]
    NotFound { container: String, path: PathBuf },

    #[error("job id record of container '{container}' is corrupt: {content:?}")]
    CorruptRecord { container: String, content: String },

    #[error("scheduler rejected cancellation of job {job_id}: {message}")]
    Rejected { job_id: u64, message: String },
}

impl CancelError {
    /// True when there was no job to cancel
    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound { .. })
    }
}

/// Any failure while creating a container's batch job
#[derive(Debug, Error)]
pub enum ComputeError {
    #[error(transparent)]
    Image(#[from] ImageError),

    #[error(transparent)]
    Script(#[from] ScriptError),

    #[error(transparent)]
    Submit(#[from] SubmitError),
}
