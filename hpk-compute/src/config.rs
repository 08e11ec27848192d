//! Compute configuration
//!
//! Built once at process start and shared read-only by every component.

use std::path::PathBuf;

use crate::layout::RuntimeDirs;

/// Binaries and directories used on the cluster side
#[derive(Debug, Clone)]
pub struct ComputeConfig {
    /// Root of the runtime directory tree (e.g. `~/.hpk`)
    pub runtime_root: PathBuf,

    /// Container runtime used for the image inventory and pulls
    pub runtime_bin: String,

    /// Container runtime used inside job scripts
    pub apptainer_bin: String,

    /// Batch submission command
    pub sbatch_bin: String,

    /// Batch cancellation command
    pub scancel_bin: String,

    /// Extension of image artifacts in the image directory
    pub image_extension: String,
}

impl ComputeConfig {
    /// Creates a configuration rooted at `runtime_root` with default binaries
    pub fn new(runtime_root: impl Into<PathBuf>) -> Self {
        Self {
            runtime_root: runtime_root.into(),
            runtime_bin: "podman".to_string(),
            apptainer_bin: "singularity".to_string(),
            sbatch_bin: "sbatch".to_string(),
            scancel_bin: "scancel".to_string(),
            image_extension: "sif".to_string(),
        }
    }

    pub fn dirs(&self) -> RuntimeDirs {
        RuntimeDirs::new(self.runtime_root.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = ComputeConfig::new("/tmp/hpk");
        assert_eq!(config.runtime_bin, "podman");
        assert_eq!(config.apptainer_bin, "singularity");
        assert_eq!(config.sbatch_bin, "sbatch");
        assert_eq!(config.scancel_bin, "scancel");
        assert_eq!(config.image_extension, "sif");
        assert_eq!(config.dirs().image_dir(), PathBuf::from("/tmp/hpk/images"));
    }
}
