//! Secondary transport: streamed HTTP over a pooled client.
//!
//! The body is streamed into a dot-prefixed `*.part` file in the destination
//! directory and renamed into place only once at least one byte arrived.
//! The final name comes from `Content-Disposition` when the response has
//! one, otherwise from the name the caller passed in.

use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use futures::future::BoxFuture;
use futures::StreamExt;
use reqwest::header::{AUTHORIZATION, CONTENT_DISPOSITION};
use reqwest::Client;
use tokio::io::AsyncWriteExt;

use super::auth::Authorizer;
use super::error::FetchError;
use super::filename;
use super::state::{is_materialized, Transferred};
use super::strategy::Transport;

/// Connection establishment timeout. Transfers themselves are unbounded.
const CONNECT_TIMEOUT: Duration = Duration::from_secs(30);

const USER_AGENT: &str = concat!("forgeup/", env!("CARGO_PKG_VERSION"));

/// Streaming HTTP downloader sharing one connection pool per run.
pub struct HttpStreamTransport {
    client: Client,
    auth: Arc<Authorizer>,
}

impl HttpStreamTransport {
    /// Create a transport with a fresh pooled client.
    pub fn new(auth: Arc<Authorizer>) -> Result<Self, FetchError> {
        let client = Client::builder()
            .user_agent(USER_AGENT)
            .connect_timeout(CONNECT_TIMEOUT)
            .build()
            .map_err(|e| FetchError::http("<client>", e))?;
        Ok(Self { client, auth })
    }

    async fn stream_to_disk(
        &self,
        url: &str,
        dest_dir: &Path,
        fallback_name: &str,
    ) -> Result<Transferred, FetchError> {
        let mut request = self.client.get(url);
        if let Some(bearer) = self.auth.bearer_for(url) {
            request = request.header(AUTHORIZATION, bearer);
        }

        let response = request
            .send()
            .await
            .and_then(|r| r.error_for_status())
            .map_err(|e| FetchError::http(url, e))?;

        let filename = response
            .headers()
            .get(CONTENT_DISPOSITION)
            .and_then(|v| v.to_str().ok())
            .and_then(filename::from_content_disposition)
            .unwrap_or_else(|| fallback_name.to_string());

        let dest = dest_dir.join(&filename);
        if is_materialized(&dest) {
            tracing::info!(path = %dest.display(), "Resolved destination already present");
            return Ok(Transferred {
                filename,
                bytes: 0,
                already_present: true,
            });
        }

        let temp = tempfile::Builder::new()
            .prefix(".")
            .suffix(".part")
            .tempfile_in(dest_dir)
            .map_err(|e| FetchError::io(dest_dir, e))?;
        let (file, temp_path) = temp.into_parts();
        let mut file = tokio::fs::File::from_std(file);

        let mut bytes: u64 = 0;
        let mut body = response.bytes_stream();
        while let Some(chunk) = body.next().await {
            let chunk = chunk.map_err(|e| FetchError::http(url, e))?;
            file.write_all(&chunk)
                .await
                .map_err(|e| FetchError::io(&*temp_path, e))?;
            bytes += chunk.len() as u64;
        }
        file.flush()
            .await
            .map_err(|e| FetchError::io(&*temp_path, e))?;
        drop(file);

        // Dropping the temp path deletes the partial file.
        if bytes == 0 {
            return Err(FetchError::EmptyContent {
                url: url.to_string(),
            });
        }

        temp_path
            .persist(&dest)
            .map_err(|e| FetchError::io(&dest, e.error))?;

        Ok(Transferred {
            filename,
            bytes,
            already_present: false,
        })
    }
}

impl Transport for HttpStreamTransport {
    fn name(&self) -> &'static str {
        "http"
    }

    fn fetch<'a>(
        &'a self,
        url: &'a str,
        dest_dir: &'a Path,
        filename: &'a str,
    ) -> BoxFuture<'a, Result<Transferred, FetchError>> {
        Box::pin(self.stream_to_disk(url, dest_dir, filename))
    }
}
