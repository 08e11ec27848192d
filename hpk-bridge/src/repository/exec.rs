//! Remote command execution
//!
//! Status artifacts are read by running a shell command where the artifacts
//! live: either on this host or on the cluster login node over ssh. Every
//! call stands alone; no session is kept between calls.

use anyhow::{Context, Result};
use async_trait::async_trait;
use std::path::PathBuf;
use tokio::process::Command;
use tracing::debug;

/// Runs a shell command and returns its stdout
#[async_trait]
pub trait RemoteExec: Send + Sync {
    /// Fails when the command cannot be run or exits non-zero
    async fn exec(&self, command: &str) -> Result<Vec<u8>>;
}

/// Runs commands through `sh -c` on this host
#[derive(Debug, Clone, Default)]
pub struct LocalShell;

#[async_trait]
impl RemoteExec for LocalShell {
    async fn exec(&self, command: &str) -> Result<Vec<u8>> {
        debug!("Executing locally: {}", command);

        let output = Command::new("sh")
            .arg("-c")
            .arg(command)
            .kill_on_drop(true)
            .output()
            .await
            .context("Failed to spawn sh")?;

        if !output.status.success() {
            anyhow::bail!(
                "'{}' failed with {}: {}",
                command,
                output.status,
                String::from_utf8_lossy(&output.stderr).trim()
            );
        }

        Ok(output.stdout)
    }
}

/// Seconds ssh waits for the login node before giving up
const CONNECT_TIMEOUT_SECS: u64 = 10;

/// Runs commands on a remote host through the `ssh` client
#[derive(Debug, Clone)]
pub struct SshSession {
    host: String,
    port: u16,
    user: String,
    key: Option<PathBuf>,
}

impl SshSession {
    pub fn new(host: String, port: u16, user: String, key: Option<PathBuf>) -> Self {
        Self {
            host,
            port,
            user,
            key,
        }
    }

    /// Arguments passed to `ssh` for one command
    pub fn args(&self, command: &str) -> Vec<String> {
        let mut args = vec![
            "-o".to_string(),
            "BatchMode=yes".to_string(),
            "-o".to_string(),
            format!("ConnectTimeout={}", CONNECT_TIMEOUT_SECS),
            "-p".to_string(),
            self.port.to_string(),
        ];
        if let Some(key) = &self.key {
            args.push("-i".to_string());
            args.push(key.to_string_lossy().to_string());
        }
        args.push(format!("{}@{}", self.user, self.host));
        args.push(command.to_string());
        args
    }
}

#[async_trait]
impl RemoteExec for SshSession {
    async fn exec(&self, command: &str) -> Result<Vec<u8>> {
        debug!("Executing on {}: {}", self.host, command);

        let output = Command::new("ssh")
            .args(self.args(command))
            .kill_on_drop(true)
            .output()
            .await
            .context("Failed to spawn ssh")?;

        if !output.status.success() {
            anyhow::bail!(
                "ssh {}@{} failed with {}: {}",
                self.user,
                self.host,
                output.status,
                String::from_utf8_lossy(&output.stderr).trim()
            );
        }

        Ok(output.stdout)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_local_shell_returns_stdout() {
        let output = LocalShell.exec("echo 0").await.unwrap();
        assert_eq!(output, b"0\n");
    }

    #[tokio::test]
    async fn test_local_shell_reports_failure() {
        let result = LocalShell.exec("exit 4").await;
        assert!(result.is_err());
    }

    #[test]
    fn test_ssh_args() {
        let session = SshSession::new(
            "login01".to_string(),
            2222,
            "alice".to_string(),
            Some(PathBuf::from("/keys/id_ed25519")),
        );
        assert_eq!(
            session.args("cat /x.status"),
            vec![
                "-o",
                "BatchMode=yes",
                "-o",
                "ConnectTimeout=10",
                "-p",
                "2222",
                "-i",
                "/keys/id_ed25519",
                "alice@login01",
                "cat /x.status"
            ]
        );
    }
}
