//! Configuration module
//!
//! Compute settings taken from flags, falling back to the same environment
//! variables the bridge reads.

use clap::Args;
use hpk_compute::ComputeConfig;
use std::path::PathBuf;

/// Compute settings shared by every command
#[derive(Debug, Clone, Args)]
pub struct ComputeArgs {
    /// Runtime root directory [default: $HOME/.hpk]
    #[arg(long, env = "HPK_WORKDIR", global = true)]
    pub workdir: Option<PathBuf>,

    /// Container runtime used for the image inventory and pulls
    #[arg(long, env = "RUNTIME_BIN", default_value = "podman", global = true)]
    pub runtime_bin: String,

    /// Container runtime used inside job scripts
    #[arg(long, env = "APPTAINER_BIN", default_value = "singularity", global = true)]
    pub apptainer_bin: String,

    /// Batch submission command
    #[arg(long, env = "SBATCH_BIN", default_value = "sbatch", global = true)]
    pub sbatch_bin: String,

    /// Batch cancellation command
    #[arg(long, env = "SCANCEL_BIN", default_value = "scancel", global = true)]
    pub scancel_bin: String,
}

impl ComputeArgs {
    pub fn into_config(self) -> ComputeConfig {
        let root = self.workdir.unwrap_or_else(|| {
            std::env::var("HOME")
                .map(PathBuf::from)
                .unwrap_or_else(|_| PathBuf::from("/tmp"))
                .join(".hpk")
        });

        let mut config = ComputeConfig::new(root);
        config.runtime_bin = self.runtime_bin;
        config.apptainer_bin = self.apptainer_bin;
        config.sbatch_bin = self.sbatch_bin;
        config.scancel_bin = self.scancel_bin;
        config
    }
}
