//! Shallow clones with mirror fallback and partial-tree cleanup.

use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Instant;

use futures::future::join_all;

use super::error::CloneError;
use crate::config::StageConfig;
use crate::exec::{CommandRunner, CommandSpec};
use crate::limiter::StageLimiter;
use crate::manifest::Manifest;
use crate::report::{BatchReport, JobOutcome, Stage};
use crate::retry::{retry_until, RetryPolicy};
use crate::telemetry::ProvisionMetrics;

const GIT: &str = "git";

/// Clones component repositories into a base directory.
pub struct RepositoryMaterializer {
    runner: Arc<dyn CommandRunner>,
    limiter: StageLimiter,
    retry: RetryPolicy,
    metrics: Arc<ProvisionMetrics>,
}

impl RepositoryMaterializer {
    /// Create a materializer with the clone stage settings.
    pub fn new(
        runner: Arc<dyn CommandRunner>,
        stage: &StageConfig,
        metrics: Arc<ProvisionMetrics>,
    ) -> Self {
        Self {
            runner,
            limiter: StageLimiter::new(stage.concurrency, Stage::Clone.name()),
            retry: stage.retry.clone(),
            metrics,
        }
    }

    /// Ensure `<base_dir>/<name>` exists, cloning from the first working mirror.
    ///
    /// Returns true when the tree is present afterwards.
    pub async fn materialize(&self, name: &str, mirrors: &[String], base_dir: &Path) -> bool {
        self.materialize_one(name, mirrors, base_dir).await.is_ok()
    }

    /// Materialize every component of the manifest under the clone limiter.
    pub async fn materialize_all(&self, manifest: &Manifest, base_dir: &Path) -> BatchReport {
        let started = Instant::now();

        let mut seen = HashSet::new();
        let entries: Vec<_> = manifest
            .entries()
            .iter()
            .filter(|(name, _)| {
                let first = seen.insert(name.as_str());
                if !first {
                    tracing::debug!(component = %name, "Duplicate component entry ignored");
                }
                first
            })
            .collect();

        tracing::info!(
            stage = self.limiter.label(),
            components = entries.len(),
            concurrency = self.limiter.permits(),
            dest = %base_dir.display(),
            "Materializing components"
        );

        let mut report = BatchReport::new(Stage::Clone, entries.len());
        let results = join_all(entries.iter().map(|(name, mirrors)| async move {
            let outcome = self.materialize_one(name, mirrors, base_dir).await;
            (name.as_str(), outcome)
        }))
        .await;

        for (name, outcome) in &results {
            report.record(*name, outcome);
        }
        report.elapsed = started.elapsed();

        tracing::info!(stage = "clone", "{}", report);
        report
    }

    async fn materialize_one(
        &self,
        name: &str,
        mirrors: &[String],
        base_dir: &Path,
    ) -> JobOutcome<String, CloneError> {
        let dest = match component_dir(name, base_dir) {
            Ok(dest) => dest,
            Err(e) => return self.fail(name, e),
        };

        if dest.exists() {
            tracing::info!(stage = "clone", item = %name, status = "skip", "Already present");
            self.metrics.item_skipped(Stage::Clone);
            return JobOutcome::Skipped;
        }
        if mirrors.is_empty() {
            return self.fail(name, CloneError::NoMirrors(name.to_string()));
        }

        let _permit = self.limiter.acquire().await;
        self.metrics.item_started(Stage::Clone);

        if let Err(source) = tokio::fs::create_dir_all(base_dir).await {
            return self.fail(
                name,
                CloneError::Io {
                    path: base_dir.to_path_buf(),
                    source,
                },
            );
        }

        let mut last_error = String::new();
        for (index, mirror) in mirrors.iter().enumerate() {
            let outcome = retry_until(
                &self.retry,
                |attempt| self.clone_once(name, mirror, &dest, attempt),
                Result::is_ok,
            )
            .await;

            match outcome.value {
                Ok(()) => {
                    tracing::info!(
                        stage = "clone",
                        item = %name,
                        status = "success",
                        mirror = %mirror,
                        attempts = outcome.attempts,
                        "Cloned"
                    );
                    self.metrics.item_succeeded(Stage::Clone);
                    return JobOutcome::Success(mirror.clone());
                }
                Err(reason) => {
                    if index + 1 < mirrors.len() {
                        tracing::warn!(
                            stage = "clone",
                            item = %name,
                            mirror = %mirror,
                            error = %reason,
                            "Mirror exhausted, trying next"
                        );
                    }
                    last_error = reason;
                }
            }
        }

        self.fail(
            name,
            CloneError::Exhausted {
                name: name.to_string(),
                mirrors: mirrors.len(),
                last_error,
            },
        )
    }

    /// One clone attempt. A failed attempt leaves no tree behind.
    async fn clone_once(
        &self,
        name: &str,
        mirror: &str,
        dest: &Path,
        attempt: u32,
    ) -> Result<(), String> {
        tracing::debug!(stage = "clone", item = %name, mirror = %mirror, attempt, "Cloning");

        let spec = CommandSpec::new(GIT)
            .args(["clone", "--depth=1", "--single-branch"])
            .arg(mirror)
            .arg(dest.as_os_str())
            .env("GIT_TERMINAL_PROMPT", "0");

        let result = match self.runner.run(&spec).await {
            Ok(output) if output.success() => Ok(()),
            Ok(output) => Err(output.failure_summary()),
            Err(e) => Err(format!("failed to run {}: {}", GIT, e)),
        };

        if result.is_err() && dest.exists() {
            if let Err(e) = tokio::fs::remove_dir_all(dest).await {
                tracing::warn!(path = %dest.display(), error = %e, "Failed to remove partial clone");
            }
        }
        result
    }

    fn fail(&self, name: &str, error: CloneError) -> JobOutcome<String, CloneError> {
        tracing::error!(stage = "clone", item = %name, status = "failure", error = %error, "Clone failed");
        self.metrics.item_failed(Stage::Clone);
        JobOutcome::Failure(error)
    }
}

fn component_dir(name: &str, base_dir: &Path) -> Result<PathBuf, CloneError> {
    let trimmed = name.trim();
    let valid = !trimmed.is_empty()
        && trimmed != "."
        && trimmed != ".."
        && !trimmed.contains(['/', '\\']);
    if valid {
        Ok(base_dir.join(trimmed))
    } else {
        Err(CloneError::InvalidName(name.to_string()))
    }
}
