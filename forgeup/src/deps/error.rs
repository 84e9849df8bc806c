//! Error types for dependency installation.

use std::io;
use std::path::PathBuf;

use thiserror::Error;

/// Errors that can occur while installing dependencies.
#[derive(Debug, Error)]
pub enum InstallError {
    /// The installed version of the protected package could not be queried.
    #[error("failed to query installed {package}: {reason}")]
    ConstraintSnapshot { package: String, reason: String },

    /// The constraints file could not be written.
    #[error("failed to write constraints file {path}: {source}")]
    ConstraintsFile {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    /// Scanning for dependency manifests failed.
    #[error("failed to scan {path} for requirements: {source}")]
    Discovery {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    /// The installer ran and failed, or could not be started.
    #[error("install of {target} failed: {reason}")]
    Command { target: String, reason: String },

    /// A package name that must not be passed to the installer.
    #[error("refusing to install {0:?}")]
    InvalidPackage(String),
}
