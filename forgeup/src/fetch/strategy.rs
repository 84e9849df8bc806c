//! Transport selection and fallback.
//!
//! ```text
//!            ┌──────────────────────────┐
//!  url ────► │ gated host or no         │── yes ──┐
//!            │ filename in the URL?     │         │
//!            └────────────┬─────────────┘         │
//!                         │ no                    ▼
//!                         ▼                ┌─────────────┐
//!                 ┌──────────────┐  fail   │  secondary  │
//!                 │   primary    │ ──────► │ (HTTP/part) │
//!                 │  (aria2c)    │         └──────┬──────┘
//!                 └──────┬───────┘                │
//!                        ▼                        ▼
//!                   FetchResult              FetchResult
//! ```

use std::path::Path;
use std::sync::Arc;

use futures::future::BoxFuture;

use super::auth::Authorizer;
use super::error::FetchError;
use super::filename;
use super::state::{is_materialized, FetchOutcome, FetchResult, Transferred};

/// One way of moving a URL's content into a directory.
pub trait Transport: Send + Sync {
    /// Short name used in logs and results.
    fn name(&self) -> &'static str;

    /// Fetch `url` into `dest_dir`, naming the file `filename` unless the
    /// transport learns a better name from the response.
    fn fetch<'a>(
        &'a self,
        url: &'a str,
        dest_dir: &'a Path,
        filename: &'a str,
    ) -> BoxFuture<'a, Result<Transferred, FetchError>>;
}

/// Primary transport with a streaming fallback.
pub struct FallbackTransport {
    primary: Option<Arc<dyn Transport>>,
    secondary: Arc<dyn Transport>,
    auth: Arc<Authorizer>,
}

impl FallbackTransport {
    /// Create a strategy from a primary and a secondary transport.
    pub fn new(
        primary: Arc<dyn Transport>,
        secondary: Arc<dyn Transport>,
        auth: Arc<Authorizer>,
    ) -> Self {
        Self {
            primary: Some(primary),
            secondary,
            auth,
        }
    }

    /// Create a strategy that only uses the secondary transport.
    pub fn secondary_only(secondary: Arc<dyn Transport>, auth: Arc<Authorizer>) -> Self {
        Self {
            primary: None,
            secondary,
            auth,
        }
    }

    /// Fetch one URL into `dest_dir`. Failures are returned as data.
    pub async fn fetch(&self, url: &str, dest_dir: &Path) -> FetchResult {
        if let Err(e) = tokio::fs::create_dir_all(dest_dir).await {
            return FetchResult::failed(FetchError::io(dest_dir, e));
        }

        let url_name = filename::from_url(url);
        let needs_header = url_name.is_none() || self.auth.requires_auth(url);

        if let (Some(name), false) = (&url_name, needs_header) {
            if is_materialized(&dest_dir.join(name)) {
                return FetchResult {
                    filename: Some(name.clone()),
                    bytes: 0,
                    outcome: FetchOutcome::AlreadyPresent,
                };
            }
            if let Some(primary) = &self.primary {
                match primary.fetch(url, dest_dir, name).await {
                    Ok(transferred) => return Self::to_result(transferred, primary.name()),
                    Err(e) => {
                        tracing::warn!(
                            url = %url,
                            transport = primary.name(),
                            error = %e,
                            "Primary transport failed, falling back"
                        );
                    }
                }
            }
        }

        let name = url_name.unwrap_or_else(|| filename::placeholder(url));
        match self.secondary.fetch(url, dest_dir, &name).await {
            Ok(transferred) => Self::to_result(transferred, self.secondary.name()),
            Err(e) => FetchResult::failed(e),
        }
    }

    fn to_result(transferred: Transferred, via: &'static str) -> FetchResult {
        let outcome = if transferred.already_present {
            FetchOutcome::AlreadyPresent
        } else {
            FetchOutcome::Downloaded { via }
        };
        FetchResult {
            filename: Some(transferred.filename),
            bytes: transferred.bytes,
            outcome,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::AuthConfig;
    use crate::exec::tests::MockRunner;
    use crate::exec::CommandOutput;
    use crate::fetch::external::ExternalDownloader;
    use crate::fetch::http::HttpStreamTransport;
    use crate::fetch::testing::{Route, TestServer};
    use std::io;

    fn strategy(runner: Arc<MockRunner>, auth: Authorizer) -> FallbackTransport {
        let auth = Arc::new(auth);
        FallbackTransport::new(
            Arc::new(ExternalDownloader::new("aria2c", runner)),
            Arc::new(HttpStreamTransport::new(Arc::clone(&auth)).unwrap()),
            auth,
        )
    }

    fn missing_binary() -> Arc<MockRunner> {
        Arc::new(MockRunner::new(|_| {
            Err(io::Error::new(io::ErrorKind::NotFound, "aria2c not found"))
        }))
    }

    #[tokio::test]
    async fn test_falls_back_when_primary_missing() {
        let server = TestServer::start(vec![Route::ok("/x.safetensors", b"payload")]).await;
        let dir = tempfile::TempDir::new().unwrap();
        let runner = missing_binary();

        let result = strategy(runner.clone(), Authorizer::disabled())
            .fetch(&server.url("/x.safetensors"), dir.path())
            .await;

        assert!(result.success());
        assert!(matches!(result.outcome, FetchOutcome::Downloaded { via: "http" }));
        assert_eq!(result.filename.as_deref(), Some("x.safetensors"));
        assert_eq!(std::fs::read(dir.path().join("x.safetensors")).unwrap(), b"payload");
        assert_eq!(runner.call_count(), 1);
    }

    #[tokio::test]
    async fn test_both_transports_fail() {
        let server = TestServer::start(vec![]).await;
        let dir = tempfile::TempDir::new().unwrap();

        let result = strategy(missing_binary(), Authorizer::disabled())
            .fetch(&server.url("/gone.bin"), dir.path())
            .await;

        assert!(!result.success());
        assert!(matches!(result.outcome, FetchOutcome::Failed(FetchError::Http { .. })));
        assert_eq!(std::fs::read_dir(dir.path()).unwrap().count(), 0);
    }

    #[tokio::test]
    async fn test_primary_success_skips_secondary() {
        let server = TestServer::start(vec![Route::ok("/y.bin", b"http")]).await;
        let dir = tempfile::TempDir::new().unwrap();
        let runner = Arc::new(MockRunner::new(|spec| {
            let d = spec.args.iter().position(|a| a == "-d").unwrap();
            let o = spec.args.iter().position(|a| a == "-o").unwrap();
            let path = Path::new(&spec.args[d + 1]).join(&spec.args[o + 1]);
            std::fs::write(path, b"from-aria2c").unwrap();
            Ok(CommandOutput::ok(""))
        }));

        let result = strategy(runner, Authorizer::disabled())
            .fetch(&server.url("/y.bin"), dir.path())
            .await;

        assert!(matches!(result.outcome, FetchOutcome::Downloaded { via: "aria2c" }));
        assert_eq!(server.hits(), 0);
    }

    #[tokio::test]
    async fn test_gated_host_skips_primary() {
        let server = TestServer::start(vec![Route::ok("/api/download/models/5", b"gated")
            .with_header("Content-Disposition", "attachment; filename=real.safetensors")])
        .await;
        let dir = tempfile::TempDir::new().unwrap();
        let runner = Arc::new(MockRunner::new(|_| Ok(CommandOutput::ok(""))));
        let auth = Authorizer::new(AuthConfig {
            token: Some("t".into()),
            hosts: vec!["127.0.0.1".into()],
        });

        let result = strategy(runner.clone(), auth)
            .fetch(&server.url("/api/download/models/5"), dir.path())
            .await;

        assert!(result.success());
        assert_eq!(result.filename.as_deref(), Some("real.safetensors"));
        assert_eq!(runner.call_count(), 0);
    }

    #[tokio::test]
    async fn test_present_file_short_circuits() {
        let dir = tempfile::TempDir::new().unwrap();
        std::fs::write(dir.path().join("have.bin"), b"data").unwrap();
        let runner = missing_binary();

        let result = strategy(runner.clone(), Authorizer::disabled())
            .fetch("http://127.0.0.1:9/have.bin", dir.path())
            .await;

        assert!(matches!(result.outcome, FetchOutcome::AlreadyPresent));
        assert_eq!(runner.call_count(), 0);
    }
}
