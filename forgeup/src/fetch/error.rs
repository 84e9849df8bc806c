//! Error types for asset fetching.

use std::io;
use std::path::PathBuf;

use thiserror::Error;

/// Errors that can occur while fetching one asset.
#[derive(Debug, Error)]
pub enum FetchError {
    /// The external downloader was missing, failed, or exited non-zero.
    #[error("{program} failed: {reason}")]
    Transport { program: String, reason: String },

    /// The transfer finished but produced nothing usable.
    #[error("no content received from {url}")]
    EmptyContent { url: String },

    /// The HTTP request failed or returned an error status.
    #[error("HTTP request to {url} failed: {reason}")]
    Http { url: String, reason: String },

    /// A local filesystem operation failed.
    #[error("I/O error at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
}

impl FetchError {
    pub(crate) fn io(path: impl Into<PathBuf>, source: io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }

    pub(crate) fn http(url: &str, err: impl std::fmt::Display) -> Self {
        Self::Http {
            url: url.to_string(),
            reason: err.to_string(),
        }
    }
}
