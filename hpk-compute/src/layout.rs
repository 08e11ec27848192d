//! Runtime directory layout
//!
//! ```text
//! <root>/
//!   images/                      cached image artifacts
//!   corrupted/                   quarantined artifacts that failed to parse
//!   pods/<namespace>/<pod>/
//!     <container>.sh             job script
//!     <container>.out / .err     container stdout / stderr
//!     <container>.status         exit code, written when the process ends
//!     <container>.jid            scheduler job id and owning pod uid
//!     scratch/<container>/       container scratch directory
//!     volumes/<volume>/          volume mount sources
//! ```

use hpk_core::domain::job::BatchJob;
use hpk_core::domain::pod::PodRef;
use std::fs::DirBuilder;
use std::io;
use std::path::{Path, PathBuf};
use tracing::info;

/// Permissions of every directory created by the bridge
pub const DIRECTORY_PERMISSIONS: u32 = 0o750;

/// Process-wide runtime directory tree
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RuntimeDirs {
    root: PathBuf,
}

impl RuntimeDirs {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn image_dir(&self) -> PathBuf {
        self.root.join("images")
    }

    pub fn corrupted_dir(&self) -> PathBuf {
        self.root.join("corrupted")
    }

    pub fn pods_dir(&self) -> PathBuf {
        self.root.join("pods")
    }

    /// Creates the directory tree; safe to call on every start
    pub fn initialize(&self) -> io::Result<()> {
        for dir in [
            self.root.clone(),
            self.image_dir(),
            self.corrupted_dir(),
            self.pods_dir(),
        ] {
            create_dir(&dir)?;
        }

        info!(
            "Runtime directories ready: root={}, images={}, corrupted={}",
            self.root.display(),
            self.image_dir().display(),
            self.corrupted_dir().display()
        );
        Ok(())
    }

    /// Working directory of a pod
    pub fn pod_workdir(&self, pod: &PodRef) -> PodWorkDir {
        PodWorkDir {
            path: self.pods_dir().join(&pod.namespace).join(&pod.name),
        }
    }
}

/// Per-pod working directory holding every container's artifacts
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PodWorkDir {
    path: PathBuf,
}

impl PodWorkDir {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Host directory backing a volume mount
    ///
    /// Kept apart from the scratch directories, which are removed with their
    /// container while volumes are shared by the whole pod.
    pub fn volume_source(&self, volume: &str) -> PathBuf {
        self.path.join("volumes").join(volume)
    }

    /// Batch job record for a container, not yet submitted
    pub fn batch_job(&self, container: &str) -> BatchJob {
        let file = |ext: &str| self.path.join(format!("{}.{}", container, ext));
        BatchJob {
            container_name: container.to_string(),
            script_path: file("sh"),
            job_id: None,
            stdout_path: file("out"),
            stderr_path: file("err"),
            status_path: file("status"),
            job_id_path: file("jid"),
            scratch_dir: self.path.join("scratch").join(container),
        }
    }

    pub fn create(&self) -> io::Result<()> {
        create_dir(&self.path)
    }
}

/// Recursively creates `path` with [`DIRECTORY_PERMISSIONS`]
pub fn create_dir(path: &Path) -> io::Result<()> {
    let mut builder = DirBuilder::new();
    builder.recursive(true);
    #[cfg(unix)]
    std::os::unix::fs::DirBuilderExt::mode(&mut builder, DIRECTORY_PERMISSIONS);
    builder.create(path)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn pod_ref() -> PodRef {
        PodRef {
            namespace: "ns".to_string(),
            name: "pod".to_string(),
            uid: Default::default(),
        }
    }

    #[test]
    fn test_initialize_is_idempotent() {
        let tmp = tempfile::tempdir().unwrap();
        let dirs = RuntimeDirs::new(tmp.path().join(".hpk"));

        dirs.initialize().unwrap();
        dirs.initialize().unwrap();

        assert!(dirs.image_dir().is_dir());
        assert!(dirs.corrupted_dir().is_dir());
        assert!(dirs.pods_dir().is_dir());
    }

    #[cfg(unix)]
    #[test]
    fn test_directory_permissions() {
        use std::os::unix::fs::PermissionsExt;

        let tmp = tempfile::tempdir().unwrap();
        let dirs = RuntimeDirs::new(tmp.path().join("root"));
        dirs.initialize().unwrap();

        let mode = std::fs::metadata(dirs.image_dir())
            .unwrap()
            .permissions()
            .mode();
        // the process umask may only clear bits
        assert_eq!(mode & 0o777 & !DIRECTORY_PERMISSIONS, 0);
    }

    #[test]
    fn test_batch_job_paths() {
        let dirs = RuntimeDirs::new("/hpk");
        let workdir = dirs.pod_workdir(&pod_ref());
        let job = workdir.batch_job("main");

        assert_eq!(workdir.path(), Path::new("/hpk/pods/ns/pod"));
        assert_eq!(job.script_path, PathBuf::from("/hpk/pods/ns/pod/main.sh"));
        assert_eq!(job.stdout_path, PathBuf::from("/hpk/pods/ns/pod/main.out"));
        assert_eq!(job.stderr_path, PathBuf::from("/hpk/pods/ns/pod/main.err"));
        assert_eq!(job.status_path, PathBuf::from("/hpk/pods/ns/pod/main.status"));
        assert_eq!(job.job_id_path, PathBuf::from("/hpk/pods/ns/pod/main.jid"));
        assert_eq!(job.scratch_dir, PathBuf::from("/hpk/pods/ns/pod/scratch/main"));
        assert_eq!(job.job_id, None);
        assert_eq!(
            workdir.volume_source("data"),
            PathBuf::from("/hpk/pods/ns/pod/volumes/data")
        );
    }

    #[test]
    fn test_volume_and_scratch_never_overlap() {
        let workdir = RuntimeDirs::new("/hpk").pod_workdir(&pod_ref());
        let job = workdir.batch_job("shared");
        let volume = workdir.volume_source("shared");

        assert_ne!(job.scratch_dir, volume);
        assert!(!volume.starts_with(&job.scratch_dir));
        assert!(!job.scratch_dir.starts_with(&volume));
    }
}
