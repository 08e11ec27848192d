//! Error types of the bridge

use hpk_compute::ComputeError;
use std::time::Duration;
use thiserror::Error;

/// A container could not be turned into a running batch job
#[derive(Debug, Error)]
pub enum LaunchError {
    #[error(transparent)]
    Compute(#[from] ComputeError),

    #[error("launch task failed: {0}")]
    Task(#[from] tokio::task::JoinError),

    #[error("launch did not finish within {0:?}")]
    TimedOut(Duration),
}

/// The status artifact of a container could not be read
///
/// Treated as "no new information" until the staleness threshold is hit.
#[derive(Debug, Error)]
#[error("failed to read status of container '{container}': {message}")]
pub struct StatusReadError {
    pub container: String,
    pub message: String,
}

/// An observation contradicts the tracked state and is dropped
#[derive(Debug, Error)]
pub enum StateInvariantError {
    #[error("pod {pod} has no container named '{container}'")]
    UnknownContainer { pod: String, container: String },

    #[error("container '{container}' of pod {pod} is already terminated")]
    AlreadyTerminated { pod: String, container: String },

    #[error("container '{container}' of pod {pod} was probed without a submitted job")]
    NotLaunched { pod: String, container: String },
}
