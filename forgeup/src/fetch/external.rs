//! Primary transport: an external multi-connection downloader.

use std::path::Path;
use std::sync::Arc;

use futures::future::BoxFuture;

use super::error::FetchError;
use super::state::{control_file, Transferred};
use super::strategy::Transport;
use crate::exec::{CommandRunner, CommandSpec};

/// Connections per server and splits per file.
const CONNECTIONS: &str = "4";

/// Runs `aria2c -c -x 4 -s 4 <url> -d <dir> -o <name>`.
///
/// The output name is fixed up front, so this transport is only used for
/// URLs that encode their own filename and need no authorization.
pub struct ExternalDownloader {
    program: String,
    runner: Arc<dyn CommandRunner>,
}

impl ExternalDownloader {
    /// Create a downloader invoking `program` through `runner`.
    pub fn new(program: impl Into<String>, runner: Arc<dyn CommandRunner>) -> Self {
        Self {
            program: program.into(),
            runner,
        }
    }

    fn command(&self, url: &str, dest_dir: &Path, filename: &str) -> CommandSpec {
        CommandSpec::new(&self.program)
            .args(["-c", "-x", CONNECTIONS, "-s", CONNECTIONS])
            .arg(url)
            .arg("-d")
            .arg(dest_dir.as_os_str())
            .arg("-o")
            .arg(filename)
    }

    fn failure(&self, reason: impl Into<String>) -> FetchError {
        FetchError::Transport {
            program: self.program.clone(),
            reason: reason.into(),
        }
    }

    /// Remove whatever a failed run left behind, including the control file.
    async fn discard(dest: &Path) {
        let _ = tokio::fs::remove_file(dest).await;
        let _ = tokio::fs::remove_file(control_file(dest)).await;
    }
}

impl Transport for ExternalDownloader {
    fn name(&self) -> &'static str {
        "aria2c"
    }

    fn fetch<'a>(
        &'a self,
        url: &'a str,
        dest_dir: &'a Path,
        filename: &'a str,
    ) -> BoxFuture<'a, Result<Transferred, FetchError>> {
        Box::pin(async move {
            let dest = dest_dir.join(filename);
            let spec = self.command(url, dest_dir, filename);

            let output = match self.runner.run(&spec).await {
                Ok(output) => output,
                Err(e) => {
                    Self::discard(&dest).await;
                    return Err(self.failure(e.to_string()));
                }
            };
            if !output.success() {
                Self::discard(&dest).await;
                return Err(self.failure(output.failure_summary()));
            }

            let bytes = tokio::fs::metadata(&dest)
                .await
                .map(|m| m.len())
                .unwrap_or(0);
            if bytes == 0 {
                Self::discard(&dest).await;
                return Err(FetchError::EmptyContent {
                    url: url.to_string(),
                });
            }

            Ok(Transferred {
                filename: filename.to_string(),
                bytes,
                already_present: false,
            })
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::exec::tests::MockRunner;
    use crate::exec::CommandOutput;
    use std::io;

    fn arg_after(spec: &CommandSpec, flag: &str) -> String {
        let idx = spec.args.iter().position(|a| a == flag).unwrap();
        spec.args[idx + 1].to_string_lossy().into_owned()
    }

    #[tokio::test]
    async fn test_success_reports_bytes() {
        let dir = tempfile::TempDir::new().unwrap();
        let runner = Arc::new(MockRunner::new(|spec| {
            let path = Path::new(&arg_after(spec, "-d")).join(arg_after(spec, "-o"));
            std::fs::write(path, b"weights").unwrap();
            Ok(CommandOutput::ok(""))
        }));
        let downloader = ExternalDownloader::new("aria2c", runner.clone());

        let result = downloader
            .fetch("https://host/m.safetensors", dir.path(), "m.safetensors")
            .await
            .unwrap();

        assert_eq!(result.bytes, 7);
        assert_eq!(result.filename, "m.safetensors");
        let call = &runner.calls()[0];
        assert_eq!(call.program, "aria2c");
        assert!(call.has_arg("-c"));
        assert_eq!(arg_after(call, "-x"), "4");
        assert_eq!(arg_after(call, "-s"), "4");
    }

    #[tokio::test]
    async fn test_missing_binary_is_transport_error() {
        let dir = tempfile::TempDir::new().unwrap();
        let runner = Arc::new(MockRunner::new(|_| {
            Err(io::Error::new(io::ErrorKind::NotFound, "no aria2c"))
        }));
        let downloader = ExternalDownloader::new("aria2c", runner);

        let err = downloader
            .fetch("https://host/m.bin", dir.path(), "m.bin")
            .await
            .unwrap_err();
        assert!(matches!(err, FetchError::Transport { .. }));
    }

    #[tokio::test]
    async fn test_zero_byte_output_is_deleted() {
        let dir = tempfile::TempDir::new().unwrap();
        let runner = Arc::new(MockRunner::new(|spec| {
            let path = Path::new(&arg_after(spec, "-d")).join(arg_after(spec, "-o"));
            std::fs::write(path, b"").unwrap();
            Ok(CommandOutput::ok(""))
        }));
        let downloader = ExternalDownloader::new("aria2c", runner);

        let err = downloader
            .fetch("https://host/m.bin", dir.path(), "m.bin")
            .await
            .unwrap_err();
        assert!(matches!(err, FetchError::EmptyContent { .. }));
        assert!(!dir.path().join("m.bin").exists());
    }

    #[tokio::test]
    async fn test_nonzero_exit_discards_partial() {
        let dir = tempfile::TempDir::new().unwrap();
        let runner = Arc::new(MockRunner::new(|spec| {
            let dest = Path::new(&arg_after(spec, "-d")).join(arg_after(spec, "-o"));
            std::fs::write(&dest, b"partial").unwrap();
            std::fs::write(dest.with_extension("bin.aria2"), b"ctl").unwrap();
            Ok(CommandOutput::failed(3, "errorCode=3 Resource not found"))
        }));
        let downloader = ExternalDownloader::new("aria2c", runner);

        let err = downloader
            .fetch("https://host/m.bin", dir.path(), "m.bin")
            .await
            .unwrap_err();
        assert!(err.to_string().contains("Resource not found"));
        assert!(!dir.path().join("m.bin").exists());
        assert!(!dir.path().join("m.bin.aria2").exists());
    }
}
