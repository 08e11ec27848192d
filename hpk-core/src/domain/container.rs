//! Container specification domain types

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use crate::domain::image::{ImageReference, ImageReferenceError};

/// Free-form scheduler flags, one `#SBATCH` directive per whitespace token
pub const ANNOTATION_SLURM_FLAGS: &str = "slurm-job.hpk.io/flags";

/// Extra `mpiexec` flags; presence enables the MPI launcher
pub const ANNOTATION_MPI_FLAGS: &str = "slurm-job.hpk.io/mpi-flags";

/// Directory prefix for images addressed by absolute path
pub const ANNOTATION_IMAGE_ROOT: &str = "slurm-job.hpk.io/image-root";

/// A single environment variable
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EnvVar {
    pub name: String,
    pub value: String,
}

/// A volume mounted into the container
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VolumeMount {
    pub name: String,
    pub mount_path: String,
}

/// Declarative description of one process to run
///
/// `image` is kept as the raw designator: either a registry reference or an
/// absolute path to an image on the cluster filesystem.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContainerSpec {
    pub name: String,
    pub image: String,
    #[serde(default)]
    pub env: Vec<EnvVar>,
    #[serde(default)]
    pub command: Vec<String>,
    #[serde(default)]
    pub args: Vec<String>,
    #[serde(default)]
    pub volume_mounts: Vec<VolumeMount>,
    #[serde(default)]
    pub annotations: BTreeMap<String, String>,
}

impl ContainerSpec {
    /// Creates a spec with only a name and an image
    pub fn new(name: impl Into<String>, image: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            image: image.into(),
            env: Vec::new(),
            command: Vec::new(),
            args: Vec::new(),
            volume_mounts: Vec::new(),
            annotations: BTreeMap::new(),
        }
    }

    /// True when the image designator is a path on the cluster filesystem
    pub fn image_is_path(&self) -> bool {
        self.image.starts_with('/')
    }

    /// Parses the image designator as a registry reference
    pub fn image_reference(&self) -> Result<ImageReference, ImageReferenceError> {
        ImageReference::parse(&self.image)
    }

    pub fn annotation(&self, key: &str) -> Option<&str> {
        self.annotations.get(key).map(String::as_str)
    }

    pub fn with_command<I, S>(mut self, command: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.command = command.into_iter().map(Into::into).collect();
        self
    }

    pub fn with_args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.args = args.into_iter().map(Into::into).collect();
        self
    }

    pub fn with_env(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.env.push(EnvVar {
            name: name.into(),
            value: value.into(),
        });
        self
    }

    pub fn with_mount(mut self, name: impl Into<String>, mount_path: impl Into<String>) -> Self {
        self.volume_mounts.push(VolumeMount {
            name: name.into(),
            mount_path: mount_path.into(),
        });
        self
    }

    pub fn with_annotation(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.annotations.insert(key.into(), value.into());
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_builder() {
        let spec = ContainerSpec::new("main", "busybox:latest")
            .with_command(["sh", "-c"])
            .with_args(["echo hi"])
            .with_env("A", "1")
            .with_mount("data", "/data")
            .with_annotation(ANNOTATION_SLURM_FLAGS, "--ntasks=2");

        assert_eq!(spec.command, vec!["sh", "-c"]);
        assert_eq!(spec.args, vec!["echo hi"]);
        assert_eq!(spec.env.len(), 1);
        assert_eq!(spec.volume_mounts[0].mount_path, "/data");
        assert_eq!(spec.annotation(ANNOTATION_SLURM_FLAGS), Some("--ntasks=2"));
        assert!(!spec.image_is_path());
    }

    #[test]
    fn test_deserialize_with_defaults() {
        let spec: ContainerSpec =
            serde_json::from_str(r#"{"name":"c","image":"/shared/img.sif"}"#).unwrap();
        assert!(spec.env.is_empty());
        assert!(spec.annotations.is_empty());
        assert!(spec.image_is_path());
    }
}
