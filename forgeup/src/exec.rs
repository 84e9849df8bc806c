//! Subprocess abstraction for testability.
//!
//! Every external tool the pipeline drives (`aria2c`, `git`, `uv`) goes
//! through [`CommandRunner`]. Production code uses [`TokioCommandRunner`];
//! tests inject scripted runners that record invocations.
//!
//! Commands run to completion with no wall-clock timeout: clones of large
//! repositories and native-extension builds legitimately take a long time.

use std::ffi::OsString;
use std::fmt;
use std::io;
use std::process::Stdio;

use futures::future::BoxFuture;
use tokio::process::Command;

/// A fully described subprocess invocation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandSpec {
    /// Program name or path.
    pub program: String,
    /// Arguments in order.
    pub args: Vec<OsString>,
    /// Extra environment variables, layered over the inherited environment.
    pub env: Vec<(String, OsString)>,
}

impl CommandSpec {
    /// Create a spec for `program` with no arguments.
    pub fn new(program: impl Into<String>) -> Self {
        Self {
            program: program.into(),
            args: Vec::new(),
            env: Vec::new(),
        }
    }

    /// Append one argument.
    pub fn arg(mut self, arg: impl Into<OsString>) -> Self {
        self.args.push(arg.into());
        self
    }

    /// Append several arguments.
    pub fn args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<OsString>,
    {
        self.args.extend(args.into_iter().map(Into::into));
        self
    }

    /// Set an environment variable for the child.
    pub fn env(mut self, key: impl Into<String>, value: impl Into<OsString>) -> Self {
        self.env.push((key.into(), value.into()));
        self
    }

    /// Returns true if any argument equals `needle`.
    pub fn has_arg(&self, needle: &str) -> bool {
        self.args.iter().any(|a| a == needle)
    }
}

impl fmt::Display for CommandSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.program)?;
        for arg in &self.args {
            write!(f, " {}", arg.to_string_lossy())?;
        }
        Ok(())
    }
}

/// Captured result of a finished subprocess.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CommandOutput {
    /// Exit code, `None` when terminated by a signal.
    pub code: Option<i32>,
    /// Captured standard output.
    pub stdout: String,
    /// Captured standard error.
    pub stderr: String,
}

impl CommandOutput {
    /// A successful exit with the given stdout.
    pub fn ok(stdout: impl Into<String>) -> Self {
        Self {
            code: Some(0),
            stdout: stdout.into(),
            stderr: String::new(),
        }
    }

    /// A failed exit with the given code and stderr.
    pub fn failed(code: i32, stderr: impl Into<String>) -> Self {
        Self {
            code: Some(code),
            stdout: String::new(),
            stderr: stderr.into(),
        }
    }

    /// Check if the process exited with status 0.
    pub fn success(&self) -> bool {
        self.code == Some(0)
    }

    /// Short description of a failure, for logs and error messages.
    pub fn failure_summary(&self) -> String {
        let status = match self.code {
            Some(code) => format!("exit code {}", code),
            None => "terminated by signal".to_string(),
        };
        let detail = self.stderr.trim();
        if detail.is_empty() {
            status
        } else {
            // Last lines carry the actual error for git/uv/aria2c.
            let tail: Vec<&str> = detail.lines().rev().take(5).collect();
            let tail: Vec<&str> = tail.into_iter().rev().collect();
            format!("{}: {}", status, tail.join(" | "))
        }
    }
}

/// Trait for running subprocesses to completion.
///
/// A missing binary surfaces as an `io::Error` of kind `NotFound`; a binary
/// that ran and failed surfaces as a non-successful [`CommandOutput`].
pub trait CommandRunner: Send + Sync {
    /// Run the command and capture its output.
    fn run<'a>(&'a self, spec: &'a CommandSpec) -> BoxFuture<'a, io::Result<CommandOutput>>;
}

/// Real runner backed by `tokio::process`.
#[derive(Debug, Default, Clone, Copy)]
pub struct TokioCommandRunner;

impl TokioCommandRunner {
    /// Create a new runner.
    pub fn new() -> Self {
        Self
    }
}

impl CommandRunner for TokioCommandRunner {
    fn run<'a>(&'a self, spec: &'a CommandSpec) -> BoxFuture<'a, io::Result<CommandOutput>> {
        Box::pin(async move {
            let mut command = Command::new(&spec.program);
            command
                .args(&spec.args)
                .stdin(Stdio::null())
                .stdout(Stdio::piped())
                .stderr(Stdio::piped());
            for (key, value) in &spec.env {
                command.env(key, value);
            }

            tracing::trace!(command = %spec, "Running subprocess");
            let output = command.output().await?;

            Ok(CommandOutput {
                code: output.status.code(),
                stdout: String::from_utf8_lossy(&output.stdout).into_owned(),
                stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
            })
        })
    }
}
