//! Subprocess execution
//!
//! Every external CLI (container runtime, batch scheduler) is reached through
//! [`CommandRunner`], so protocol parsing can be exercised against scripted
//! output.

use std::io;
use std::process::Command;
use tracing::debug;

/// Captured result of a finished subprocess
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandOutput {
    /// Exit code, `None` when the process was killed by a signal
    pub status_code: Option<i32>,
    pub stdout: String,
    pub stderr: String,
}

impl CommandOutput {
    pub fn success(&self) -> bool {
        self.status_code == Some(0)
    }

    /// One-line summary used in error messages
    pub fn describe(&self) -> String {
        format!(
            "exit_code={}, stdout='{}', stderr='{}'",
            self.status_code.unwrap_or(-1),
            self.stdout.trim(),
            self.stderr.trim()
        )
    }
}

/// Runs an external program to completion
pub trait CommandRunner: Send + Sync {
    fn run(&self, program: &str, args: &[String]) -> io::Result<CommandOutput>;
}

/// [`CommandRunner`] backed by real processes
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemCommandRunner;

impl CommandRunner for SystemCommandRunner {
    fn run(&self, program: &str, args: &[String]) -> io::Result<CommandOutput> {
        debug!("Running {} {:?}", program, args);

        let output = Command::new(program).args(args).output()?;

        let result = CommandOutput {
            status_code: output.status.code(),
            stdout: String::from_utf8_lossy(&output.stdout).to_string(),
            stderr: String::from_utf8_lossy(&output.stderr).to_string(),
        };

        if !result.stderr.trim().is_empty() {
            debug!("{} stderr: {}", program, result.stderr.trim());
        }
        if !result.success() {
            debug!("{} failed: {}", program, result.describe());
        }

        Ok(result)
    }
}

#[cfg(test)]
pub(crate) mod testing {
    //! Scripted runner for unit tests

    use super::*;
    use std::collections::HashMap;
    use std::sync::Mutex;

    /// Replies to `(program, first argument)` pairs with canned output and
    /// records every invocation.
    #[derive(Default)]
    pub struct ScriptedRunner {
        replies: Mutex<HashMap<(String, String), CommandOutput>>,
        calls: Mutex<Vec<Vec<String>>>,
    }

    impl ScriptedRunner {
        pub fn new() -> Self {
            Self::default()
        }

        pub fn reply(self, program: &str, first_arg: &str, code: i32, stdout: &str) -> Self {
            self.replies.lock().unwrap().insert(
                (program.to_string(), first_arg.to_string()),
                CommandOutput {
                    status_code: Some(code),
                    stdout: stdout.to_string(),
                    stderr: if code == 0 { String::new() } else { "boom".to_string() },
                },
            );
            self
        }

        /// Every call as `[program, args...]`
        pub fn calls(&self) -> Vec<Vec<String>> {
            self.calls.lock().unwrap().clone()
        }

        pub fn called(&self, program: &str, first_arg: &str) -> bool {
            self.calls()
                .iter()
                .any(|c| c[0] == program && c.get(1).map(String::as_str) == Some(first_arg))
        }
    }

    impl CommandRunner for ScriptedRunner {
        fn run(&self, program: &str, args: &[String]) -> io::Result<CommandOutput> {
            let mut call = vec![program.to_string()];
            call.extend(args.iter().cloned());
            self.calls.lock().unwrap().push(call);

            let first = args.first().cloned().unwrap_or_default();
            self.replies
                .lock()
                .unwrap()
                .get(&(program.to_string(), first))
                .cloned()
                .ok_or_else(|| io::Error::new(io::ErrorKind::NotFound, program.to_string()))
        }
    }
}
