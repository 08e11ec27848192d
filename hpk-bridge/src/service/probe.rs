//! Status artifact probing
//!
//! A job script writes the container's exit code to its status artifact
//! when the process ends. Until then the artifact is absent or empty.

use hpk_core::domain::job::BatchJob;
use std::sync::Arc;
use tracing::debug;

use crate::error::StatusReadError;
use crate::repository::RemoteExec;

/// What a status artifact says about its container
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProbeOutcome {
    /// No exit code yet
    Running,
    /// The container process exited with this code
    Exited(i32),
    /// The artifact holds something other than an exit code
    Unparseable(String),
}

/// Reads status artifacts through a [`RemoteExec`]
#[derive(Clone)]
pub struct StatusProbe {
    exec: Arc<dyn RemoteExec>,
}

impl StatusProbe {
    pub fn new(exec: Arc<dyn RemoteExec>) -> Self {
        Self { exec }
    }

    /// Reads and interprets the status artifact of `job`
    ///
    /// A missing artifact reads as empty, so an error always means the
    /// command itself could not run.
    pub async fn probe(&self, job: &BatchJob) -> Result<ProbeOutcome, StatusReadError> {
        let command = read_command(job).map_err(|message| StatusReadError {
            container: job.container_name.clone(),
            message,
        })?;

        let output = self
            .exec
            .exec(&command)
            .await
            .map_err(|e| StatusReadError {
                container: job.container_name.clone(),
                message: format!("{:#}", e),
            })?;

        let outcome = parse_status(&String::from_utf8_lossy(&output));
        debug!("Status of {}: {:?}", job.container_name, outcome);
        Ok(outcome)
    }
}

/// Shell command printing the artifact, or nothing when it does not exist
pub fn read_command(job: &BatchJob) -> Result<String, String> {
    let path = job.status_path.to_string_lossy();
    let quoted = shlex::try_quote(&path).map_err(|e| format!("{}: {:?}", e, path))?;
    Ok(format!("cat {} 2>/dev/null || true", quoted))
}

pub fn parse_status(content: &str) -> ProbeOutcome {
    let content = content.trim();
    if content.is_empty() {
        return ProbeOutcome::Running;
    }

    match content.parse::<i32>() {
        Ok(code) => ProbeOutcome::Exited(code),
        Err(_) => ProbeOutcome::Unparseable(content.to_string()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::repository::LocalShell;
    use std::path::PathBuf;

    fn job(status_path: PathBuf) -> BatchJob {
        BatchJob {
            container_name: "main".to_string(),
            script_path: PathBuf::from("/w/main.sh"),
            job_id: Some(1),
            stdout_path: PathBuf::from("/w/main.out"),
            stderr_path: PathBuf::from("/w/main.err"),
            status_path,
            job_id_path: PathBuf::from("/w/main.jid"),
            scratch_dir: PathBuf::from("/w/main"),
        }
    }

    #[test]
    fn test_parse_status() {
        assert_eq!(parse_status(""), ProbeOutcome::Running);
        assert_eq!(parse_status("  \n"), ProbeOutcome::Running);
        assert_eq!(parse_status("0\n"), ProbeOutcome::Exited(0));
        assert_eq!(parse_status("137"), ProbeOutcome::Exited(137));
        assert_eq!(
            parse_status("garbage"),
            ProbeOutcome::Unparseable("garbage".to_string())
        );
    }

    #[test]
    fn test_read_command_quotes_path() {
        let command = read_command(&job(PathBuf::from("/w/my pod/main.status"))).unwrap();
        assert!(command.ends_with(" 2>/dev/null || true"));
        let tokens = shlex::split(&command).unwrap();
        assert_eq!(tokens[..2], ["cat", "/w/my pod/main.status"]);
    }

    #[tokio::test]
    async fn test_missing_artifact_reads_as_running() {
        let tmp = tempfile::tempdir().unwrap();
        let probe = StatusProbe::new(Arc::new(LocalShell));

        let outcome = probe
            .probe(&job(tmp.path().join("main.status")))
            .await
            .unwrap();
        assert_eq!(outcome, ProbeOutcome::Running);
    }

    #[tokio::test]
    async fn test_status_artifact_exit_code() {
        let tmp = tempfile::tempdir().unwrap();
        let status = tmp.path().join("main.status");
        std::fs::write(&status, "3\n").unwrap();
        let probe = StatusProbe::new(Arc::new(LocalShell));

        assert_eq!(probe.probe(&job(status)).await.unwrap(), ProbeOutcome::Exited(3));
    }
}
