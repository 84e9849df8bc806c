//! CLI error types.

use std::io;

use forgeup::config::ConfigError;
use forgeup::fetch::FetchError;
use forgeup::manifest::ManifestError;
use thiserror::Error;

/// Exit code for configuration and manifest errors.
pub const EXIT_USAGE: i32 = 2;

/// Exit code for runtime failures.
pub const EXIT_FAILURE: i32 = 1;

/// Errors that stop a command before or while it runs.
#[derive(Debug, Error)]
pub enum CliError {
    #[error("configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error(transparent)]
    Manifest(#[from] ManifestError),

    #[error("failed to set up downloads: {0}")]
    Transport(#[from] FetchError),

    #[error("failed to start async runtime: {0}")]
    Runtime(#[source] io::Error),

    #[error("failed to set signal handler: {0}")]
    Signal(String),
}

impl CliError {
    /// Process exit code for this error.
    pub fn exit_code(&self) -> i32 {
        match self {
            CliError::Config(_) | CliError::Manifest(_) => EXIT_USAGE,
            CliError::Transport(_) | CliError::Runtime(_) | CliError::Signal(_) => EXIT_FAILURE,
        }
    }
}
