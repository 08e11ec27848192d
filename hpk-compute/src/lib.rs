//! HPK Compute
//!
//! The cluster-facing half of the bridge. Everything here is synchronous and
//! blocking: callers that live on an async runtime are expected to hop onto a
//! blocking thread.
//!
//! - [`layout`]: runtime directory tree and per-pod working directories
//! - [`process`]: narrow subprocess interface, swappable in tests
//! - [`image`]: image reference resolution against the runtime's cache
//! - [`script`]: container spec to batch script compilation
//! - [`slurm`]: job submission and cancellation
//! - [`backend`]: the three steps above chained per container

pub mod backend;
pub mod config;
pub mod error;
pub mod image;
pub mod layout;
pub mod process;
pub mod script;
pub mod slurm;

pub use backend::SlurmBackend;
pub use config::ComputeConfig;
pub use error::{CancelError, ComputeError, ImageError, ScriptError, SubmitError};
pub use image::ImageResolver;
pub use layout::{PodWorkDir, RuntimeDirs};
pub use process::{CommandOutput, CommandRunner, SystemCommandRunner};
pub use script::ScriptCompiler;
pub use slurm::JobController;
