//! A spawned server process with a merged line stream.

use std::ffi::OsString;
use std::io;
use std::path::PathBuf;
use std::process::{ExitStatus, Stdio};
use std::time::Duration;

use tokio::io::{AsyncBufReadExt, AsyncRead, BufReader};
use tokio::process::{Child, Command};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

/// Lines buffered between the readers and the supervisor.
const LINE_BUFFER: usize = 256;

/// How to start the server.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LaunchSpec {
    /// Interpreter or binary.
    pub program: PathBuf,
    /// Leading arguments (the entry script), before pass-through arguments.
    pub base_args: Vec<OsString>,
    /// Working directory.
    pub working_dir: PathBuf,
}

impl LaunchSpec {
    /// `<program> <base_args..> <args..>` in `working_dir`.
    pub fn new(program: impl Into<PathBuf>, working_dir: impl Into<PathBuf>) -> Self {
        Self {
            program: program.into(),
            base_args: Vec::new(),
            working_dir: working_dir.into(),
        }
    }

    /// Append a leading argument.
    pub fn base_arg(mut self, arg: impl Into<OsString>) -> Self {
        self.base_args.push(arg.into());
        self
    }
}

/// Running child whose stdout and stderr arrive as one line stream.
pub struct ChildProcess {
    child: Child,
    lines: mpsc::Receiver<String>,
    readers: Vec<JoinHandle<()>>,
}

impl ChildProcess {
    /// Spawn the child with both output streams piped.
    pub fn spawn(spec: &LaunchSpec, args: &[String]) -> io::Result<Self> {
        let mut child = Command::new(&spec.program)
            .args(&spec.base_args)
            .args(args)
            .current_dir(&spec.working_dir)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()?;

        let (tx, lines) = mpsc::channel(LINE_BUFFER);
        let mut readers = Vec::with_capacity(2);
        if let Some(stdout) = child.stdout.take() {
            readers.push(forward_lines(stdout, tx.clone()));
        }
        if let Some(stderr) = child.stderr.take() {
            readers.push(forward_lines(stderr, tx));
        }

        Ok(Self {
            child,
            lines,
            readers,
        })
    }

    /// OS process id, while the child has not been reaped.
    pub fn id(&self) -> Option<u32> {
        self.child.id()
    }

    /// Next output line, or `None` once both streams are closed.
    pub async fn next_line(&mut self) -> Option<String> {
        self.lines.recv().await
    }

    /// Wait for the child to exit.
    pub async fn wait(&mut self) -> io::Result<ExitStatus> {
        self.child.wait().await
    }

    /// Ask the child to stop with SIGTERM; kill it if it is still running
    /// after `grace`.
    pub async fn terminate(&mut self, grace: Duration) {
        let Some(pid) = self.child.id() else {
            return;
        };

        if let Ok(pid) = libc::pid_t::try_from(pid) {
            // SAFETY: signalling a pid we spawned and have not yet reaped.
            unsafe {
                libc::kill(pid, libc::SIGTERM);
            }
        }

        match tokio::time::timeout(grace, self.child.wait()).await {
            Ok(Ok(status)) => {
                tracing::debug!(pid, status = %status, "Server stopped");
            }
            Ok(Err(e)) => {
                tracing::warn!(pid, error = %e, "Failed to wait for server");
            }
            Err(_) => {
                tracing::warn!(
                    pid,
                    grace_secs = grace.as_secs(),
                    "Server ignored SIGTERM, killing"
                );
                if let Err(e) = self.child.kill().await {
                    tracing::warn!(pid, error = %e, "Failed to kill server");
                }
            }
        }
    }
}

impl Drop for ChildProcess {
    fn drop(&mut self) {
        for reader in &self.readers {
            reader.abort();
        }
    }
}

fn forward_lines<R>(stream: R, tx: mpsc::Sender<String>) -> JoinHandle<()>
where
    R: AsyncRead + Unpin + Send + 'static,
{
    tokio::spawn(async move {
        let mut lines = BufReader::new(stream).lines();
        while let Ok(Some(line)) = lines.next_line().await {
            if tx.send(line).await.is_err() {
                break;
            }
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Instant;

    fn sh(script: &str) -> (LaunchSpec, Vec<String>) {
        let spec = LaunchSpec::new("sh", std::env::temp_dir()).base_arg("-c");
        (spec, vec![script.to_string()])
    }

    #[tokio::test]
    async fn test_merges_stdout_and_stderr() {
        let (spec, args) = sh("echo out; echo err 1>&2; exit 4");
        let mut child = ChildProcess::spawn(&spec, &args).unwrap();

        let mut lines = Vec::new();
        while let Some(line) = child.next_line().await {
            lines.push(line);
        }
        lines.sort();

        assert_eq!(lines, vec!["err", "out"]);
        assert_eq!(child.wait().await.unwrap().code(), Some(4));
    }

    #[tokio::test]
    async fn test_terminate_sends_sigterm() {
        let (spec, args) = sh("echo up; sleep 30");
        let mut child = ChildProcess::spawn(&spec, &args).unwrap();
        assert_eq!(child.next_line().await.as_deref(), Some("up"));

        let started = Instant::now();
        child.terminate(Duration::from_secs(5)).await;

        assert!(started.elapsed() < Duration::from_secs(5));
        assert!(child.id().is_none());
    }

    #[tokio::test]
    async fn test_terminate_escalates_to_kill() {
        let (spec, args) = sh("trap '' TERM; echo up; while true; do sleep 1; done");
        let mut child = ChildProcess::spawn(&spec, &args).unwrap();
        assert_eq!(child.next_line().await.as_deref(), Some("up"));

        child.terminate(Duration::from_millis(200)).await;

        assert!(child.id().is_none());
    }

    #[tokio::test]
    async fn test_spawn_missing_program() {
        let spec = LaunchSpec::new("/nonexistent/forgeup-python", std::env::temp_dir());
        let err = ChildProcess::spawn(&spec, &[]).err().unwrap();
        assert_eq!(err.kind(), io::ErrorKind::NotFound);
    }
}
