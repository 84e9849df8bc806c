//! Environment-sourced configuration.

use std::path::PathBuf;
use std::str::FromStr;

use super::{ConfigError, ForgeConfig, StageConfig, SupervisorSettings};
use crate::retry::RetryPolicy;

pub const ENV_BASE_DIR: &str = "FORGEUP_BASE_DIR";
pub const ENV_PYTHON: &str = "FORGEUP_PYTHON";
pub const ENV_TEMP_DIR: &str = "FORGEUP_TMPDIR";
pub const ENV_PROTECTED_PACKAGE: &str = "FORGEUP_PROTECTED_PACKAGE";
pub const ENV_PROTECTED_COMPANIONS: &str = "FORGEUP_PROTECTED_COMPANIONS";
pub const ENV_FETCH_CONCURRENCY: &str = "FORGEUP_FETCH_CONCURRENCY";
pub const ENV_CLONE_CONCURRENCY: &str = "FORGEUP_CLONE_CONCURRENCY";
pub const ENV_INSTALL_CONCURRENCY: &str = "FORGEUP_INSTALL_CONCURRENCY";
pub const ENV_FETCH_ATTEMPTS: &str = "FORGEUP_FETCH_ATTEMPTS";
pub const ENV_CLONE_ATTEMPTS: &str = "FORGEUP_CLONE_ATTEMPTS";
pub const ENV_INSTALL_ATTEMPTS: &str = "FORGEUP_INSTALL_ATTEMPTS";
pub const ENV_MAX_RESTARTS: &str = "FORGEUP_MAX_RESTARTS";
pub const ENV_AUTH_TOKEN: &str = "FORGEUP_AUTH_TOKEN";
pub const ENV_AUTH_HOSTS: &str = "FORGEUP_AUTH_HOSTS";
pub const ENV_DOWNLOADER: &str = "FORGEUP_DOWNLOADER";
pub const ENV_SERVER_ENTRY: &str = "FORGEUP_SERVER_ENTRY";
pub const ENV_EXTRA_MODULES: &str = "FORGEUP_EXTRA_MODULES";
pub const ENV_LOG_DIR: &str = "FORGEUP_LOG_DIR";

impl ForgeConfig {
    /// Build the configuration from the process environment.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build the configuration from an arbitrary variable lookup.
    ///
    /// Unset and empty variables fall back to defaults; values that are set
    /// but do not parse are errors.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());
        let mut config = ForgeConfig::default();

        if let Some(dir) = get(ENV_BASE_DIR) {
            config.base_dir = PathBuf::from(dir);
        }
        if let Some(python) = get(ENV_PYTHON) {
            config.python = PathBuf::from(python);
        }
        if let Some(tmp) = get(ENV_TEMP_DIR).or_else(|| get("TMPDIR")) {
            config.temp_dir = PathBuf::from(tmp);
        }
        if let Some(name) = get(ENV_PROTECTED_PACKAGE) {
            config.protected.name = name.trim().to_string();
        }
        if let Some(list) = get(ENV_PROTECTED_COMPANIONS) {
            config.protected.companions = split_list(&list);
        }

        apply_stage(
            &mut config.fetch,
            parse_var(&get, ENV_FETCH_CONCURRENCY)?,
            parse_var(&get, ENV_FETCH_ATTEMPTS)?,
        );
        apply_stage(
            &mut config.clone,
            parse_var(&get, ENV_CLONE_CONCURRENCY)?,
            parse_var(&get, ENV_CLONE_ATTEMPTS)?,
        );
        apply_stage(
            &mut config.install,
            parse_var(&get, ENV_INSTALL_CONCURRENCY)?,
            parse_var(&get, ENV_INSTALL_ATTEMPTS)?,
        );
        if let Some(max) = parse_var(&get, ENV_MAX_RESTARTS)? {
            config.supervisor.relaunch =
                SupervisorSettings::relaunch_policy(max, config.supervisor.relaunch.delay());
        }

        config.auth.token = get(ENV_AUTH_TOKEN).map(|t| t.trim().to_string());
        if let Some(hosts) = get(ENV_AUTH_HOSTS) {
            config.auth.hosts = split_list(&hosts);
        }
        if let Some(downloader) = get(ENV_DOWNLOADER) {
            config.downloader = downloader;
        }
        if let Some(entry) = get(ENV_SERVER_ENTRY) {
            config.supervisor.server_entry = entry;
        }
        if let Some(modules) = get(ENV_EXTRA_MODULES) {
            config.supervisor.extra_modules = split_list(&modules);
        }
        config.log_dir = get(ENV_LOG_DIR).map(PathBuf::from);

        Ok(config)
    }
}

fn apply_stage(stage: &mut StageConfig, concurrency: Option<usize>, attempts: Option<u32>) {
    if let Some(concurrency) = concurrency {
        stage.concurrency = concurrency.max(1);
    }
    if let Some(attempts) = attempts {
        stage.retry = RetryPolicy::fixed(attempts, stage.retry.delay());
    }
}

fn parse_var<T, G>(get: &G, key: &str) -> Result<Option<T>, ConfigError>
where
    T: FromStr,
    T::Err: std::fmt::Display,
    G: Fn(&str) -> Option<String>,
{
    match get(key) {
        None => Ok(None),
        Some(raw) => raw
            .trim()
            .parse::<T>()
            .map(Some)
            .map_err(|e| ConfigError::InvalidValue {
                key: key.to_string(),
                value: raw.clone(),
                reason: e.to_string(),
            }),
    }
}

fn split_list(raw: &str) -> Vec<String> {
    raw.split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
        .collect()
}
