//! Error types for repository cloning.

use std::io;
use std::path::PathBuf;

use thiserror::Error;

/// Errors that can occur while materializing one component.
#[derive(Debug, Error)]
pub enum CloneError {
    /// The component name is not a single path component.
    #[error("invalid component name {0:?}")]
    InvalidName(String),

    /// The manifest lists no mirrors for the component.
    #[error("no mirrors listed for {0}")]
    NoMirrors(String),

    /// Every mirror exhausted its attempts.
    #[error("all {mirrors} mirror(s) failed for {name}: {last_error}")]
    Exhausted {
        name: String,
        mirrors: usize,
        last_error: String,
    },

    /// Preparing the parent directory failed.
    #[error("I/O error at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
}
