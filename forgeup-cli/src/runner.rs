//! Shared setup for every command.

use std::future::Future;
use std::sync::Arc;

use forgeup::config::ForgeConfig;
use forgeup::exec::TokioCommandRunner;
use forgeup::logging::{init_logging, WorkerGuard};
use forgeup::provision::Provisioner;
use tokio::runtime::Runtime;
use tokio_util::sync::CancellationToken;

use crate::error::CliError;
use crate::GlobalArgs;

/// Resolved configuration, logging and async runtime of one invocation.
pub struct CliRunner {
    config: ForgeConfig,
    runtime: Runtime,
    _log_guard: Option<WorkerGuard>,
}

impl CliRunner {
    /// Build the configuration from the environment and `args`, then start
    /// logging and the runtime.
    pub fn new(args: &GlobalArgs) -> Result<Self, CliError> {
        let config = resolve_config(ForgeConfig::from_env()?, args);
        let log_guard = init_logging(args.verbose, config.log_dir.as_deref());

        let runtime = tokio::runtime::Builder::new_multi_thread()
            .enable_all()
            .build()
            .map_err(CliError::Runtime)?;

        Ok(Self {
            config,
            runtime,
            _log_guard: log_guard,
        })
    }

    pub fn config(&self) -> &ForgeConfig {
        &self.config
    }

    /// Log the resolved settings of a command.
    pub fn log_startup(&self, command: &str) {
        tracing::info!(
            command,
            version = forgeup::VERSION,
            base_dir = %self.config.base_dir.display(),
            python = %self.config.python.display(),
            temp_dir = %self.config.temp_dir.display(),
            "forgeup starting"
        );
    }

    /// Build a provisioner running real subprocesses.
    pub fn provisioner(&self) -> Result<Provisioner, CliError> {
        let runner = Arc::new(TokioCommandRunner::new());
        Ok(Provisioner::new(self.config.clone(), runner)?)
    }

    /// Token cancelled on the first Ctrl+C.
    pub fn cancel_on_interrupt(&self) -> Result<CancellationToken, CliError> {
        let token = CancellationToken::new();
        let trigger = token.clone();
        ctrlc::set_handler(move || {
            if !trigger.is_cancelled() {
                eprintln!();
                eprintln!("Received interrupt, stopping server...");
            }
            trigger.cancel();
        })
        .map_err(|e| CliError::Signal(e.to_string()))?;
        Ok(token)
    }

    /// Run a future to completion on this invocation's runtime.
    pub fn block_on<F: Future>(&self, future: F) -> F::Output {
        self.runtime.block_on(future)
    }
}

/// Apply command-line overrides on top of the environment configuration.
pub fn resolve_config(config: ForgeConfig, args: &GlobalArgs) -> ForgeConfig {
    let mut config = config;
    if let Some(base_dir) = &args.base_dir {
        config = config.with_base_dir(base_dir.clone());
    }
    if let Some(python) = &args.python {
        config = config.with_python(python.clone());
    }
    if let Some(log_dir) = &args.log_dir {
        config = config.with_log_dir(log_dir.clone());
    }
    config
}
