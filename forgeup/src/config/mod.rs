//! Run configuration.
//!
//! One [`ForgeConfig`] is built at process start (see [`ForgeConfig::from_env`])
//! and passed into every component. No component reads the environment on
//! its own.
//!
//! # Example
//!
//! ```ignore
//! use forgeup::config::ForgeConfig;
//!
//! let config = ForgeConfig::from_env()?
//!     .with_base_dir("/srv/comfyui".into());
//! println!("models land in {}", config.models_dir().display());
//! ```

mod env;

use std::path::{Path, PathBuf};
use std::time::Duration;

use thiserror::Error;

use crate::retry::RetryPolicy;

pub use env::*;

/// Default server tree root.
pub const DEFAULT_BASE_DIR: &str = "/mnt/netdrive/comfyui";

/// Default target interpreter.
pub const DEFAULT_PYTHON: &str = "/mnt/netdrive/python_env/bin/python";

/// Default scratch directory for installers and downloads.
pub const DEFAULT_TEMP_DIR: &str = "/mnt/netdrive/tmp";

/// Default protected (pinned) package.
pub const DEFAULT_PROTECTED_PACKAGE: &str = "torch";

/// Default companions of the protected package, left unconstrained.
pub const DEFAULT_PROTECTED_COMPANIONS: &[&str] = &["torchvision", "torchaudio"];

/// Default concurrent transfers.
pub const DEFAULT_FETCH_CONCURRENCY: usize = 8;

/// Default concurrent clones.
pub const DEFAULT_CLONE_CONCURRENCY: usize = 6;

/// Default concurrent manifest installs.
pub const DEFAULT_INSTALL_CONCURRENCY: usize = 3;

/// Default attempts per asset.
pub const DEFAULT_FETCH_ATTEMPTS: u32 = 2;

/// Default attempts per mirror.
pub const DEFAULT_CLONE_ATTEMPTS: u32 = 3;

/// Default attempts per manifest install.
pub const DEFAULT_INSTALL_ATTEMPTS: u32 = 2;

/// Default relaunch bound for the supervisor.
pub const DEFAULT_MAX_RESTARTS: u32 = 3;

/// Default primary transport binary.
pub const DEFAULT_DOWNLOADER: &str = "aria2c";

/// Default server entry script, relative to the base dir.
pub const DEFAULT_SERVER_ENTRY: &str = "main.py";

/// Default hosts that require the bearer token.
pub const DEFAULT_AUTH_HOSTS: &[&str] = &["civitai.com"];

const FETCH_RETRY_DELAY: Duration = Duration::from_secs(2);
const CLONE_RETRY_DELAY: Duration = Duration::from_secs(2);
const INSTALL_RETRY_DELAY: Duration = Duration::from_secs(3);
const RESTART_DELAY: Duration = Duration::from_secs(2);
const TERMINATE_GRACE: Duration = Duration::from_secs(10);

/// Errors raised while building the configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// A variable holds a value that does not parse.
    #[error("invalid value for {key}: {value:?} ({reason})")]
    InvalidValue {
        key: String,
        value: String,
        reason: String,
    },
}

/// Concurrency and retry settings of one stage.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StageConfig {
    /// Maximum jobs in flight.
    pub concurrency: usize,
    /// Per-item retry policy.
    pub retry: RetryPolicy,
}

impl StageConfig {
    /// Create a stage config with a fixed retry policy.
    pub fn new(concurrency: usize, attempts: u32, delay: Duration) -> Self {
        Self {
            concurrency: concurrency.max(1),
            retry: RetryPolicy::fixed(attempts, delay),
        }
    }
}

/// The package whose installed version must survive every install.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProtectedPackage {
    /// Package to pin (e.g. `torch`).
    pub name: String,
    /// Related packages intentionally left unconstrained so they can
    /// resolve against the pinned version.
    pub companions: Vec<String>,
}

impl Default for ProtectedPackage {
    fn default() -> Self {
        Self {
            name: DEFAULT_PROTECTED_PACKAGE.to_string(),
            companions: DEFAULT_PROTECTED_COMPANIONS
                .iter()
                .map(|s| s.to_string())
                .collect(),
        }
    }
}

/// Bearer-token settings for gated hosts.
#[derive(Clone, PartialEq, Eq)]
pub struct AuthConfig {
    /// Token sent as `Authorization: Bearer <token>`.
    pub token: Option<String>,
    /// Hosts (and their subdomains) that require the token.
    pub hosts: Vec<String>,
}

impl Default for AuthConfig {
    fn default() -> Self {
        Self {
            token: None,
            hosts: DEFAULT_AUTH_HOSTS.iter().map(|s| s.to_string()).collect(),
        }
    }
}

impl std::fmt::Debug for AuthConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AuthConfig")
            .field("token", &self.token.as_ref().map(|_| "<redacted>"))
            .field("hosts", &self.hosts)
            .finish()
    }
}

/// Supervisor settings.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SupervisorSettings {
    /// Launch attempts and the pause between them. One launch plus at most
    /// `max_attempts - 1` relaunches after remediation or spawn failure.
    pub relaunch: RetryPolicy,
    /// How long a terminated child may take to exit before it is killed.
    pub terminate_grace: Duration,
    /// Entry script, relative to the server directory.
    pub server_entry: String,
    /// Extra module names appended to the built-in allow-list.
    pub extra_modules: Vec<String>,
}

impl SupervisorSettings {
    /// Policy allowing `max_restarts` relaunches after the first launch.
    pub fn relaunch_policy(max_restarts: u32, delay: Duration) -> RetryPolicy {
        RetryPolicy::fixed(max_restarts.saturating_add(1), delay)
    }

    /// Relaunches allowed after the first launch.
    pub fn max_restarts(&self) -> u32 {
        self.relaunch.max_attempts().saturating_sub(1)
    }
}

impl Default for SupervisorSettings {
    fn default() -> Self {
        Self {
            relaunch: SupervisorSettings::relaunch_policy(DEFAULT_MAX_RESTARTS, RESTART_DELAY),
            terminate_grace: TERMINATE_GRACE,
            server_entry: DEFAULT_SERVER_ENTRY.to_string(),
            extra_modules: Vec::new(),
        }
    }
}

/// Complete configuration for one provisioning run.
#[derive(Debug, Clone)]
pub struct ForgeConfig {
    /// Server tree root; holds `models/` and `custom_nodes/`.
    pub base_dir: PathBuf,
    /// Interpreter of the shared environment.
    pub python: PathBuf,
    /// Scratch directory exported as `TMPDIR` to subprocesses.
    pub temp_dir: PathBuf,
    /// Pinned package.
    pub protected: ProtectedPackage,
    /// Asset download stage.
    pub fetch: StageConfig,
    /// Repository clone stage.
    pub clone: StageConfig,
    /// Dependency install stage.
    pub install: StageConfig,
    /// Process supervisor.
    pub supervisor: SupervisorSettings,
    /// Gated host authentication.
    pub auth: AuthConfig,
    /// Primary transport binary.
    pub downloader: String,
    /// Directory for the log file, if file logging is enabled.
    pub log_dir: Option<PathBuf>,
}

impl Default for ForgeConfig {
    fn default() -> Self {
        Self {
            base_dir: PathBuf::from(DEFAULT_BASE_DIR),
            python: PathBuf::from(DEFAULT_PYTHON),
            temp_dir: PathBuf::from(DEFAULT_TEMP_DIR),
            protected: ProtectedPackage::default(),
            fetch: StageConfig::new(
                DEFAULT_FETCH_CONCURRENCY,
                DEFAULT_FETCH_ATTEMPTS,
                FETCH_RETRY_DELAY,
            ),
            clone: StageConfig::new(
                DEFAULT_CLONE_CONCURRENCY,
                DEFAULT_CLONE_ATTEMPTS,
                CLONE_RETRY_DELAY,
            ),
            install: StageConfig::new(
                DEFAULT_INSTALL_CONCURRENCY,
                DEFAULT_INSTALL_ATTEMPTS,
                INSTALL_RETRY_DELAY,
            ),
            supervisor: SupervisorSettings::default(),
            auth: AuthConfig::default(),
            downloader: DEFAULT_DOWNLOADER.to_string(),
            log_dir: None,
        }
    }
}

impl ForgeConfig {
    /// Directory holding model categories.
    pub fn models_dir(&self) -> PathBuf {
        self.base_dir.join("models")
    }

    /// Directory holding component checkouts.
    pub fn custom_nodes_dir(&self) -> PathBuf {
        self.base_dir.join("custom_nodes")
    }

    /// Working directory of the supervised server.
    pub fn server_dir(&self) -> &Path {
        &self.base_dir
    }

    /// Set the server tree root.
    pub fn with_base_dir(mut self, base_dir: PathBuf) -> Self {
        self.base_dir = base_dir;
        self
    }

    /// Set the target interpreter.
    pub fn with_python(mut self, python: PathBuf) -> Self {
        self.python = python;
        self
    }

    /// Set the scratch directory.
    pub fn with_temp_dir(mut self, temp_dir: PathBuf) -> Self {
        self.temp_dir = temp_dir;
        self
    }

    /// Set the log directory.
    pub fn with_log_dir(mut self, log_dir: PathBuf) -> Self {
        self.log_dir = Some(log_dir);
        self
    }

    /// Set the bearer token for gated hosts.
    pub fn with_auth_token(mut self, token: impl Into<String>) -> Self {
        self.auth.token = Some(token.into());
        self
    }

    /// Set the supervisor relaunch bound.
    pub fn with_max_restarts(mut self, max_restarts: u32) -> Self {
        self.supervisor.relaunch =
            SupervisorSettings::relaunch_policy(max_restarts, self.supervisor.relaunch.delay());
        self
    }

    /// Set every retry delay (fetch, clone, install, relaunch) at once.
    ///
    /// Mostly useful in tests, where zero delays keep runs fast.
    pub fn with_retry_delay(mut self, delay: Duration) -> Self {
        let policies = [
            &mut self.fetch.retry,
            &mut self.clone.retry,
            &mut self.install.retry,
            &mut self.supervisor.relaunch,
        ];
        for policy in policies {
            *policy = RetryPolicy::fixed(policy.max_attempts(), delay);
        }
        self
    }
}
