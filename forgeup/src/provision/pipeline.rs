//! The provisioner and its run reports.

use std::sync::Arc;

use tokio_util::sync::CancellationToken;

use crate::config::ForgeConfig;
use crate::deps::DependencyInstaller;
use crate::exec::CommandRunner;
use crate::fetch::{FetchEngine, FetchError};
use crate::manifest::Manifest;
use crate::repo::RepositoryMaterializer;
use crate::report::BatchReport;
use crate::supervisor::{ProcessSupervisor, Remediator, SupervisorReport};
use crate::telemetry::ProvisionMetrics;

/// Results of materializing and installing components.
#[derive(Debug, Clone)]
pub struct ComponentsReport {
    pub clone: BatchReport,
    pub install: BatchReport,
}

impl ComponentsReport {
    pub fn is_complete(&self) -> bool {
        self.clone.is_complete() && self.install.is_complete()
    }
}

/// Results of a full `up` run.
#[derive(Debug)]
pub struct UpReport {
    pub fetch: BatchReport,
    pub components: ComponentsReport,
    pub launch: SupervisorReport,
}

impl UpReport {
    /// Exit code of the run; decided by the supervisor alone.
    pub fn exit_code(&self) -> i32 {
        self.launch.exit_code()
    }
}

/// Runs the provisioning stages against one server tree.
///
/// Only one provisioner should work on a tree at a time. Nothing locks the
/// tree across processes: every "already present" check is advisory, and two
/// overlapping runs can both find an asset or component missing and both
/// fetch or clone it.
pub struct Provisioner {
    config: ForgeConfig,
    metrics: Arc<ProvisionMetrics>,
    fetcher: FetchEngine,
    materializer: RepositoryMaterializer,
    installer: Arc<DependencyInstaller>,
    echo: bool,
}

impl Provisioner {
    /// Build every stage from `config`, running tools through `runner`.
    pub fn new(config: ForgeConfig, runner: Arc<dyn CommandRunner>) -> Result<Self, FetchError> {
        let metrics = Arc::new(ProvisionMetrics::new());
        let fetcher = FetchEngine::from_config(&config, Arc::clone(&runner), Arc::clone(&metrics))?;
        let materializer =
            RepositoryMaterializer::new(Arc::clone(&runner), &config.clone, Arc::clone(&metrics));
        let installer = Arc::new(DependencyInstaller::new(
            runner,
            &config,
            Arc::clone(&metrics),
        ));

        Ok(Self {
            config,
            metrics,
            fetcher,
            materializer,
            installer,
            echo: true,
        })
    }

    /// Echo server output to stdout when launching (on by default).
    pub fn with_echo(mut self, echo: bool) -> Self {
        self.echo = echo;
        self
    }

    pub fn config(&self) -> &ForgeConfig {
        &self.config
    }

    /// Shared counters of every stage.
    pub fn metrics(&self) -> &Arc<ProvisionMetrics> {
        &self.metrics
    }

    /// Download every asset into `models/<category>/`.
    pub async fn fetch_assets(&self, assets: &Manifest) -> BatchReport {
        let report = self.fetcher.run_all(assets).await;
        tracing::info!(summary = %report, "Asset fetch finished");
        report
    }

    /// Clone every component, then install all dependency manifests found.
    ///
    /// Installation covers whatever trees exist afterwards, so a component
    /// whose clone failed simply has nothing to install.
    pub async fn provision_components(&self, components: &Manifest) -> ComponentsReport {
        let nodes_dir = self.config.custom_nodes_dir();
        let clone = self.materializer.materialize_all(components, &nodes_dir).await;
        tracing::info!(summary = %clone, "Component clone finished");

        let install = self.install_dependencies().await;
        ComponentsReport { clone, install }
    }

    /// Install dependency manifests of the components already present.
    pub async fn install_dependencies(&self) -> BatchReport {
        let report = self
            .installer
            .install_all(&self.config.custom_nodes_dir())
            .await;
        tracing::info!(summary = %report, "Dependency install finished");
        report
    }

    /// Supervisor wired to this provisioner's installer.
    pub fn supervisor(&self) -> ProcessSupervisor {
        let remediator: Arc<dyn Remediator> = self.installer.clone();
        ProcessSupervisor::from_config(&self.config, remediator, Arc::clone(&self.metrics))
            .with_echo(self.echo)
    }

    /// Launch and supervise the server until it exits or `cancel` fires.
    pub async fn launch(&self, args: &[String], cancel: CancellationToken) -> SupervisorReport {
        self.supervisor().run(args, cancel).await
    }

    /// Full pipeline: fetch and components concurrently, then launch.
    pub async fn up(
        &self,
        assets: &Manifest,
        components: &Manifest,
        args: &[String],
        cancel: CancellationToken,
    ) -> UpReport {
        let (fetch, components) =
            tokio::join!(self.fetch_assets(assets), self.provision_components(components));

        if fetch.has_failures() || !components.is_complete() {
            tracing::warn!(
                fetch_failed = fetch.failed(),
                clone_failed = components.clone.failed(),
                install_failed = components.install.failed(),
                "Launching with incomplete provisioning"
            );
        }

        let launch = self.launch(args, cancel).await;

        UpReport {
            fetch,
            components,
            launch,
        }
    }
}
