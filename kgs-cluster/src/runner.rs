use std::fmt;
use std::process::Stdio;
use std::time::Duration;

use async_trait::async_trait;
use tokio::io::AsyncWriteExt;
use tokio::process::Command;
use tracing::debug;

use crate::error::ClusterError;

/// One external command: program, arguments and optional stdin payload.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Invocation {
    pub program: String,
    pub args: Vec<String>,
    pub stdin: Option<String>,
}

impl Invocation {
    pub fn new<I, S>(program: &str, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            program: program.to_string(),
            args: args.into_iter().map(Into::into).collect(),
            stdin: None,
        }
    }

    pub fn with_stdin(mut self, stdin: String) -> Self {
        self.stdin = Some(stdin);
        self
    }

    /// The arguments joined by spaces, without the program.
    pub fn args_line(&self) -> String {
        self.args.join(" ")
    }
}

impl fmt::Display for Invocation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.args.is_empty() {
            f.write_str(&self.program)
        } else {
            write!(f, "{} {}", self.program, self.args_line())
        }
    }
}

/// Captured result of a finished command.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CommandOutput {
    /// `None` when the process was terminated by a signal.
    pub code: Option<i32>,
    pub stdout: String,
    pub stderr: String,
}

impl CommandOutput {
    pub fn success(&self) -> bool {
        self.code == Some(0)
    }
}

/// Runs external commands. A non-zero exit is not an error at this level;
/// only failing to run the command at all is.
#[async_trait]
pub trait CommandRunner: Send + Sync {
    async fn run(&self, invocation: &Invocation) -> Result<CommandOutput, ClusterError>;
}

/// Spawns each invocation as its own child process.
#[derive(Debug, Clone, Default)]
pub struct ProcessRunner {
    timeout: Option<Duration>,
}

impl ProcessRunner {
    pub fn new(timeout: Option<Duration>) -> Self {
        Self { timeout }
    }
}

#[async_trait]
impl CommandRunner for ProcessRunner {
    async fn run(&self, invocation: &Invocation) -> Result<CommandOutput, ClusterError> {
        debug!(command = %invocation, "exec");

        let mut cmd = Command::new(&invocation.program);
        cmd.args(&invocation.args)
            .stdin(if invocation.stdin.is_some() {
                Stdio::piped()
            } else {
                Stdio::null()
            })
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);

        let mut child = cmd.spawn().map_err(|source| ClusterError::Spawn {
            program: invocation.program.clone(),
            source,
        })?;

        let stdin = child.stdin.take();
        let payload = invocation.stdin.clone().unwrap_or_default();
        let feed = async move {
            if let Some(mut pipe) = stdin {
                pipe.write_all(payload.as_bytes()).await?;
                pipe.shutdown().await?;
            }
            Ok::<(), std::io::Error>(())
        };
        // Feed stdin while draining stdout so a chatty child cannot block on a full pipe.
        let finished = async move { tokio::join!(feed, child.wait_with_output()) };

        let (fed, output) = match self.timeout {
            Some(after) => tokio::time::timeout(after, finished)
                .await
                .map_err(|_| ClusterError::Timeout {
                    command: invocation.to_string(),
                    after,
                })?,
            None => finished.await,
        };

        let io_err = |source| ClusterError::Io {
            command: invocation.to_string(),
            source,
        };
        let output = output.map_err(io_err)?;
        // A child that exits without reading stdin closes the pipe early; its
        // exit status is the more useful signal then.
        if let Err(e) = fed {
            if e.kind() != std::io::ErrorKind::BrokenPipe {
                return Err(io_err(e));
            }
        }

        let output = CommandOutput {
            code: output.status.code(),
            stdout: String::from_utf8_lossy(&output.stdout).into_owned(),
            stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
        };
        debug!(
            command = %invocation,
            code = ?output.code,
            stdout = %output.stdout.trim_end(),
            stderr = %output.stderr.trim_end(),
            "exit"
        );
        Ok(output)
    }
}
