//! Bounded-concurrency asset fetching.

use std::collections::HashSet;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Instant;

use futures::future::join_all;

use super::auth::Authorizer;
use super::error::FetchError;
use super::external::ExternalDownloader;
use super::http::HttpStreamTransport;
use super::state::{is_materialized, FetchOutcome, WorkItem, WorkStatus};
use super::strategy::FallbackTransport;
use crate::config::{ForgeConfig, StageConfig};
use crate::exec::CommandRunner;
use crate::limiter::StageLimiter;
use crate::manifest::Manifest;
use crate::report::{BatchReport, JobOutcome, Stage};
use crate::retry::{retry_until, RetryPolicy};
use crate::telemetry::ProvisionMetrics;

/// Fetches every asset of a manifest into `models/<category>/`.
pub struct FetchEngine {
    transport: FallbackTransport,
    limiter: StageLimiter,
    retry: RetryPolicy,
    models_dir: PathBuf,
    metrics: Arc<ProvisionMetrics>,
}

impl FetchEngine {
    /// Create an engine around an existing transport.
    pub fn new(
        transport: FallbackTransport,
        models_dir: PathBuf,
        stage: &StageConfig,
        metrics: Arc<ProvisionMetrics>,
    ) -> Self {
        Self {
            transport,
            limiter: StageLimiter::new(stage.concurrency, Stage::Fetch.name()),
            retry: stage.retry.clone(),
            models_dir,
            metrics,
        }
    }

    /// Create an engine with the configured downloader and HTTP fallback.
    pub fn from_config(
        config: &ForgeConfig,
        runner: Arc<dyn CommandRunner>,
        metrics: Arc<ProvisionMetrics>,
    ) -> Result<Self, FetchError> {
        let auth = Arc::new(Authorizer::new(config.auth.clone()));
        let secondary = Arc::new(HttpStreamTransport::new(Arc::clone(&auth))?);
        let primary = Arc::new(ExternalDownloader::new(&config.downloader, runner));
        let transport = FallbackTransport::new(primary, secondary, auth);
        Ok(Self::new(
            transport,
            config.models_dir(),
            &config.fetch,
            metrics,
        ))
    }

    /// Expand a manifest into work items, one per distinct (category, url).
    pub fn plan(&self, manifest: &Manifest) -> Vec<WorkItem> {
        let mut seen = HashSet::new();
        let mut items = Vec::with_capacity(manifest.locator_count());
        for (category, urls) in manifest.entries() {
            for url in urls {
                if !seen.insert((category.as_str(), url.as_str())) {
                    tracing::debug!(category = %category, url = %url, "Duplicate asset entry ignored");
                    continue;
                }
                items.push(WorkItem::new(category, url, &self.models_dir));
            }
        }
        items
    }

    /// Fetch every asset; failures never abort siblings.
    pub async fn run_all(&self, manifest: &Manifest) -> BatchReport {
        let started = Instant::now();
        let items = self.plan(manifest);
        let mut report = BatchReport::new(Stage::Fetch, items.len());

        tracing::info!(
            stage = self.limiter.label(),
            items = items.len(),
            concurrency = self.limiter.permits(),
            "Fetching assets"
        );

        let results = join_all(items.into_iter().map(|item| self.run_item(item))).await;

        for (item, outcome) in &results {
            if let JobOutcome::Success(bytes) = outcome {
                report.add_bytes(*bytes);
            }
            report.record(item.label(), outcome);
        }
        report.elapsed = started.elapsed();

        tracing::info!(stage = "fetch", "{}", report);
        report
    }

    async fn run_item(&self, mut item: WorkItem) -> (WorkItem, JobOutcome<u64, FetchError>) {
        if let Some(dest) = item.known_destination() {
            if is_materialized(&dest) {
                tracing::info!(stage = "fetch", item = %item.label(), status = "skip", "Already present");
                item.status = WorkStatus::Skipped;
                self.metrics.item_skipped(Stage::Fetch);
                return (item, JobOutcome::Skipped);
            }
        }

        let _permit = self.limiter.acquire().await;
        item.status = WorkStatus::Running;
        self.metrics.item_started(Stage::Fetch);

        let outcome = retry_until(
            &self.retry,
            |attempt| {
                tracing::debug!(stage = "fetch", item = %item.label(), attempt, "Fetching");
                self.transport.fetch(&item.url, &item.dest_dir)
            },
            |result| result.success(),
        )
        .await;
        item.attempts = outcome.attempts;

        let result = outcome.value;
        let filename = result.filename.unwrap_or_default();
        match result.outcome {
            FetchOutcome::Downloaded { via } => {
                tracing::info!(
                    stage = "fetch",
                    item = %item.label(),
                    status = "success",
                    file = %filename,
                    bytes = result.bytes,
                    via,
                    attempts = item.attempts,
                    "Downloaded"
                );
                item.status = WorkStatus::Success;
                self.metrics.item_succeeded(Stage::Fetch);
                self.metrics.bytes_written(Stage::Fetch, result.bytes);
                (item, JobOutcome::Success(result.bytes))
            }
            FetchOutcome::AlreadyPresent => {
                tracing::info!(
                    stage = "fetch",
                    item = %item.label(),
                    status = "skip",
                    file = %filename,
                    "Already present"
                );
                item.status = WorkStatus::Skipped;
                self.metrics.item_skipped(Stage::Fetch);
                (item, JobOutcome::Skipped)
            }
            FetchOutcome::Failed(error) => {
                tracing::error!(
                    stage = "fetch",
                    item = %item.label(),
                    status = "failure",
                    attempts = item.attempts,
                    error = %error,
                    "Fetch failed"
                );
                item.status = WorkStatus::Failed;
                self.metrics.item_failed(Stage::Fetch);
                (item, JobOutcome::Failure(error))
            }
        }
    }
}
