//! External command execution
//!
//! The Helm and kubectl collaborators shell out through a [`CommandRunner`]
//! so tests can substitute scripted output for real binaries.

use async_trait::async_trait;
use blocknode_core::CollaboratorError;
use std::process::Stdio;
use std::time::Duration;
use tokio::io::AsyncWriteExt;
use tokio::process::Command;

/// Captured result of a finished command
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CommandOutput {
    /// Exit code, `None` if the process was killed by a signal
    pub code: Option<i32>,
    pub stdout: String,
    pub stderr: String,
}

impl CommandOutput {
    pub fn success(&self) -> bool {
        self.code == Some(0)
    }

    /// Successful output with the given stdout
    pub fn ok(stdout: impl Into<String>) -> Self {
        Self {
            code: Some(0),
            stdout: stdout.into(),
            stderr: String::new(),
        }
    }

    /// Failed output with the given stderr
    pub fn failed(code: i32, stderr: impl Into<String>) -> Self {
        Self {
            code: Some(code),
            stdout: String::new(),
            stderr: stderr.into(),
        }
    }

    /// Turns a non-zero exit into [`CollaboratorError::Failed`] for `operation`.
    pub fn check(self, operation: &str) -> Result<Self, CollaboratorError> {
        if self.success() {
            return Ok(self);
        }
        let detail = match self.stderr.trim() {
            "" => format!("exit code {:?}", self.code),
            stderr => stderr.to_string(),
        };
        Err(CollaboratorError::failed(operation, detail))
    }
}

/// Runs a program to completion
#[async_trait]
pub trait CommandRunner: Send + Sync {
    /// Runs `program` with `args`, feeding `stdin` if given.
    ///
    /// A non-zero exit is not an error at this level; only failing to start or
    /// wait for the process is.
    async fn run(
        &self,
        program: &str,
        args: &[String],
        stdin: Option<&str>,
    ) -> Result<CommandOutput, CollaboratorError>;
}

/// Spawns real processes with `tokio::process`
#[derive(Debug, Clone, Default)]
pub struct ProcessRunner {
    timeout: Option<Duration>,
}

impl ProcessRunner {
    pub fn new() -> Self {
        Self::default()
    }

    /// Kills commands that run longer than `timeout`
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }
}

#[async_trait]
impl CommandRunner for ProcessRunner {
    async fn run(
        &self,
        program: &str,
        args: &[String],
        stdin: Option<&str>,
    ) -> Result<CommandOutput, CollaboratorError> {
        let rendered = format!("{} {}", program, args.join(" "));
        log::debug!("exec: {}", rendered);

        let mut cmd = Command::new(program);
        cmd.args(args)
            .stdin(if stdin.is_some() {
                Stdio::piped()
            } else {
                Stdio::null()
            })
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);

        let mut child = cmd
            .spawn()
            .map_err(|e| CollaboratorError::failed(program, format!("failed to spawn: {}", e)))?;

        if let (Some(input), Some(mut pipe)) = (stdin, child.stdin.take()) {
            pipe.write_all(input.as_bytes()).await?;
            pipe.shutdown().await?;
        }

        let output = match self.timeout {
            Some(timeout) => tokio::time::timeout(timeout, child.wait_with_output())
                .await
                .map_err(|_| CollaboratorError::Timeout {
                    what: rendered.clone(),
                    timeout,
                })??,
            None => child.wait_with_output().await?,
        };

        Ok(CommandOutput {
            code: output.status.code(),
            stdout: String::from_utf8_lossy(&output.stdout).into_owned(),
            stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
        })
    }
}
